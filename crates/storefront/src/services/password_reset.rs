//! Password reset for customer accounts.
//!
//! Guest users created at checkout have no usable password; a reset is how
//! they claim their account. Tokens are 256-bit random values sent by email.
//! Only their SHA-256 hash is stored, so a database leak does not leak live
//! tokens.

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use printshelf_core::Email;

use crate::db::{RepositoryError, ResetTokenStore, UserStore};
use crate::models::ResetToken;
use crate::services::email::Notifier;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length (argon2 input bound).
const MAX_PASSWORD_LENGTH: usize = 256;

/// Errors from the password reset flow.
#[derive(Debug, Error)]
pub enum ResetError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] printshelf_core::EmailError),

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Token unknown, used or expired.
    #[error("reset link is invalid or has expired")]
    InvalidToken,

    /// The reset email could not be sent.
    #[error("could not send reset email")]
    Delivery(String),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Password reset service.
#[derive(Clone)]
pub struct PasswordResetService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn ResetTokenStore>,
    notifier: Arc<dyn Notifier>,
    base_url: String,
    ttl: Duration,
}

impl PasswordResetService {
    /// Create a new password reset service.
    ///
    /// Reset links point at `{base_url}/reset-password?token=...` and stay
    /// valid for `ttl`.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn ResetTokenStore>,
        notifier: Arc<dyn Notifier>,
        base_url: &str,
        ttl: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            notifier,
            base_url: base_url.trim_end_matches('/').to_string(),
            ttl,
        }
    }

    /// Issue a reset token and email it.
    ///
    /// Unknown emails succeed without sending anything, so the endpoint does
    /// not reveal which addresses have accounts.
    ///
    /// # Errors
    ///
    /// Returns `ResetError::InvalidEmail` for malformed input and
    /// `ResetError::Delivery` if the email cannot be sent, in which case the
    /// token is revoked.
    #[tracing::instrument(skip_all)]
    pub async fn request_reset(&self, email: &str) -> Result<(), ResetError> {
        let email = Email::parse(email)?;
        let Some(user) = self.users.get_by_email(&email).await? else {
            tracing::info!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_token();
        let token_hash = hash_token(&token);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(1));

        self.tokens
            .put(
                &token_hash,
                &ResetToken {
                    email: user.email.clone(),
                    expires_at,
                },
            )
            .await?;

        let reset_url = format!("{}/reset-password?token={token}", self.base_url);
        let outcome = self.notifier.password_reset(&user.email, &reset_url).await;
        if !outcome.success {
            if let Err(e) = self.tokens.delete(&token_hash).await {
                tracing::warn!(error = %e, "Failed to revoke undelivered reset token");
            }
            let reason = outcome.error.unwrap_or_default();
            tracing::error!(user_id = %user.id, error = %reason, "Password reset email failed");
            return Err(ResetError::Delivery(reason));
        }

        tracing::info!(user_id = %user.id, "Password reset email sent");
        Ok(())
    }

    /// Redeem a token and set a new password.
    ///
    /// # Errors
    ///
    /// Returns `ResetError::WeakPassword` for passwords outside 8..=256
    /// characters and `ResetError::InvalidToken` for unknown or expired tokens.
    #[tracing::instrument(skip_all)]
    pub async fn confirm_reset(&self, token: &str, new_password: &str) -> Result<(), ResetError> {
        validate_password(new_password)?;

        // Taking the record consumes it, so a token redeems at most once
        let token_hash = hash_token(token.trim());
        let record = self
            .tokens
            .take(&token_hash)
            .await?
            .filter(|record| !record.is_expired(Utc::now()))
            .ok_or(ResetError::InvalidToken)?;

        let user = self
            .users
            .get_by_email(&record.email)
            .await?
            .ok_or(ResetError::InvalidToken)?;

        let password_hash = hash_password(new_password)?;
        self.users.set_password(&user.id, &password_hash).await?;

        tracing::info!(user_id = %user.id, "Password reset completed");
        Ok(())
    }
}

/// 32 random bytes, base64url without padding.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex-encoded SHA-256 of a token.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn validate_password(password: &str) -> Result<(), ResetError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(ResetError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(ResetError::WeakPassword(format!(
            "Password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, ResetError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ResetError::PasswordHash)
}
