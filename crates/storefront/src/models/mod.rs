//! Domain models for the storefront.
//!
//! These types are what repositories return and services operate on. Wire
//! formats use camelCase field names.

pub mod catalog;
pub mod order;
pub mod user;

pub use catalog::{Category, Product};
pub use order::{NewOrder, NewOrderItem, Order, OrderItem, Pagination};
pub use user::{ResetToken, User};
