//! Password-reset token storage.
//!
//! Only SHA-256 hashes of tokens are stored; the raw token exists solely in
//! the email sent to the user.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{RepositoryError, ResetTokenStore};
use crate::models::ResetToken;

/// `PostgreSQL` reset token store.
#[derive(Debug, Clone)]
pub struct PgResetTokenStore {
    pool: PgPool,
}

impl PgResetTokenStore {
    /// Create a new reset token store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetTokenStore for PgResetTokenStore {
    async fn put(&self, token_hash: &str, token: &ResetToken) -> Result<(), RepositoryError> {
        // Expired rows are never read again; sweep them on the write path.
        sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            INSERT INTO password_reset_tokens (token_hash, email, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (token_hash) DO UPDATE
            SET email = EXCLUDED.email, expires_at = EXCLUDED.expires_at
            ",
        )
        .bind(token_hash)
        .bind(&token.email)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take(&self, token_hash: &str) -> Result<Option<ResetToken>, RepositoryError> {
        let token = sqlx::query_as::<_, ResetToken>(
            r"
            DELETE FROM password_reset_tokens
            WHERE token_hash = $1
            RETURNING email, expires_at
            ",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn delete(&self, token_hash: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM password_reset_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
