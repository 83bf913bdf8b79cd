//! User repository for database operations.

use async_trait::async_trait;
use sqlx::PgPool;

use printshelf_core::{Email, UserId};

use super::{RepositoryError, UserStore};
use crate::models::User;

/// Password hash stored for guest users.
///
/// Not a valid PHC string, so no password can ever verify against it.
pub const GUEST_PASSWORD_SENTINEL: &str = "!guest";

/// `PostgreSQL` user repository.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, name, email_verified, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_or_create_guest(
        &self,
        email: &Email,
        name: &str,
    ) -> Result<User, RepositoryError> {
        // ON CONFLICT makes concurrent first checkouts for one email converge on
        // a single row; the loser of the race falls through to the SELECT.
        let inserted = sqlx::query_as::<_, User>(
            r"
            INSERT INTO users (id, email, name, password_hash, email_verified)
            VALUES ($1, $2, $3, $4, FALSE)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, name, email_verified, created_at
            ",
        )
        .bind(UserId::generate())
        .bind(email)
        .bind(name)
        .bind(GUEST_PASSWORD_SENTINEL)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(user) = inserted {
            tracing::info!(user_id = %user.id, "Created guest user");
            return Ok(user);
        }

        self.get_by_email(email).await?.ok_or_else(|| {
            RepositoryError::DataCorruption(format!("user for {email} vanished after conflict"))
        })
    }

    async fn set_password(
        &self,
        id: &UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET password_hash = $2, email_verified = TRUE, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}
