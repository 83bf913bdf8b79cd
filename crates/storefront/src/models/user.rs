//! User domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use printshelf_core::{Email, UserId};

/// A storefront user.
///
/// Checkout creates *guest* users automatically; they have no usable password
/// until they complete a password reset.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name, if known.
    pub name: Option<String>,
    /// Whether the email has been verified.
    pub email_verified: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

/// A pending password-reset grant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResetToken {
    /// Account the token resets.
    pub email: Email,
    /// After this instant the token is void.
    pub expires_at: DateTime<Utc>,
}

impl ResetToken {
    /// Whether the token has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
