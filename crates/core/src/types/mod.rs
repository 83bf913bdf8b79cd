//! Core types for Printshelf.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod category;
pub mod email;
pub mod id;
pub mod order_number;
pub mod price;
pub mod status;

pub use category::{CategoryDepthError, CategoryLevel, validate_parent};
pub use email::{Email, EmailError};
pub use id::*;
pub use order_number::OrderNumber;
pub use price::{Price, PriceError};
pub use status::*;
