//! Database operations for storefront `PostgreSQL`.
//!
//! # Database: `printshelf`
//!
//! ## Tables
//!
//! - `categories` - Two-level collection/category tree
//! - `products` - Printables with download/view counters
//! - `users` - Customers, including guest users created at checkout
//! - `orders` / `order_items` - Placed orders with snapshotted line items
//! - `password_reset_tokens` - Hashed reset tokens with expiry
//!
//! # Repository seams
//!
//! Services depend on the [`CatalogStore`], [`UserStore`], [`OrderStore`] and
//! [`ResetTokenStore`] traits rather than on `PgPool`, so they can run against
//! in-memory implementations in tests. The `Pg*` types here are the production
//! implementations.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p printshelf-cli -- migrate
//! ```

pub mod catalog;
pub mod orders;
pub mod reset_tokens;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use printshelf_core::{
    CategoryId, Email, OrderId, OrderNumber, OrderStatus, PaymentStatus, ProductId, UserId,
};

use crate::models::{Category, NewOrder, Order, Product, ResetToken, User};

pub use catalog::{CachedCatalog, PgCatalogStore};
pub use orders::PgOrderStore;
pub use reset_tokens::PgResetTokenStore;
pub use users::PgUserStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate order number).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to [`RepositoryError::Conflict`].
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

/// Read access to products and categories, plus the product counters.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Look up a product by ID.
    async fn product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Look up a product by slug.
    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError>;

    /// Look up a category or collection by ID.
    async fn category(&self, id: &CategoryId) -> Result<Option<Category>, RepositoryError>;

    /// Look up a category or collection by slug.
    async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>, RepositoryError>;

    /// Atomically add `by` to a product's download counter.
    ///
    /// Returns [`RepositoryError::NotFound`] if the product does not exist.
    async fn increment_downloads(&self, id: &ProductId, by: u32) -> Result<(), RepositoryError>;

    /// Atomically add one to a product's view counter.
    async fn increment_views(&self, id: &ProductId) -> Result<(), RepositoryError>;
}

/// Customer records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Get a user by email.
    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Return the user for `email`, creating a guest user if none exists.
    ///
    /// Must be safe under concurrent calls for the same new email: exactly one
    /// record is created and every caller receives it.
    async fn find_or_create_guest(
        &self,
        email: &Email,
        name: &str,
    ) -> Result<User, RepositoryError>;

    /// Replace a user's password hash and mark the email verified.
    async fn set_password(&self, id: &UserId, password_hash: &str)
    -> Result<(), RepositoryError>;
}

/// Durable order storage.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist an order and all of its items atomically.
    ///
    /// Returns [`RepositoryError::Conflict`] if the order number is taken; in
    /// that case nothing is written.
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    /// Get an order with its items by internal ID.
    async fn get(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Get an order with its items by order number.
    async fn get_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError>;

    /// List orders newest first, optionally restricted to one status.
    ///
    /// Returns the page of orders and the total matching count.
    async fn list(
        &self,
        status: Option<OrderStatus>,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<Order>, u64), RepositoryError>;

    /// Set both statuses if the order still has the `expected` statuses.
    ///
    /// Returns `None` when the order is missing or was changed concurrently.
    async fn update_status(
        &self,
        id: &OrderId,
        expected: (OrderStatus, PaymentStatus),
        next: (OrderStatus, PaymentStatus),
    ) -> Result<Option<Order>, RepositoryError>;

    /// Delete an order and its items. Returns `false` if it did not exist.
    async fn delete(&self, id: &OrderId) -> Result<bool, RepositoryError>;
}

/// Keyed store for password-reset tokens with expiry.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Store a token record under its hash, replacing any previous record.
    async fn put(&self, token_hash: &str, token: &ResetToken) -> Result<(), RepositoryError>;

    /// Atomically remove a token record and return it, expired or not.
    ///
    /// Of several concurrent calls for one hash at most one gets the record.
    async fn take(&self, token_hash: &str) -> Result<Option<ResetToken>, RepositoryError>;

    /// Remove a token record. Removing a missing token is not an error.
    async fn delete(&self, token_hash: &str) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
