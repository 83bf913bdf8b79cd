//! Printshelf Core - Shared types library.
//!
//! This crate provides common types used across all Printshelf components:
//! - `storefront` - Public storefront API, checkout, downloads and order admin
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money, emails, order numbers, statuses and their
//!   transition rules, and the two-level category hierarchy

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
