//! Refresh-token sessions
//!
//! Every issued refresh token has one row here, keyed by the SHA-256 hash of
//! the token. Rotation claims (deletes) the old row and inserts a new one; logout
//! deletes the row. The raw token is never stored.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::Session;

#[derive(Debug, thiserror::Error)]
pub enum SessionRepositoryError {
    #[error("Session not found")]
    NotFound,

    #[error("Session expired")]
    Expired,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Hex-encoded SHA-256 of a raw token
    pub fn hash_token(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    /// Expiry for a session created now that lives `days` days
    pub fn expiry_after(days: i64) -> DateTime<Utc> {
        Utc::now() + Duration::days(days)
    }

    /// Record a freshly issued refresh token
    pub async fn create(
        &self,
        user_id: Uuid,
        raw_token: &str,
        lifetime_days: i64,
    ) -> Result<Session, SessionRepositoryError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, expires_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(Self::hash_token(raw_token))
        .bind(Self::expiry_after(lifetime_days))
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Consume a refresh session in one statement. The row is deleted as it is
    /// read, so two requests presenting the same token cannot both claim it.
    /// An already expired row is still removed and reported as `Expired`.
    pub async fn claim(&self, raw_token: &str) -> Result<Session, SessionRepositoryError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            DELETE FROM sessions
            WHERE token_hash = $1
            RETURNING id, user_id, token_hash, expires_at, created_at
            "#,
        )
        .bind(Self::hash_token(raw_token))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(SessionRepositoryError::NotFound)?;

        if session.expires_at <= Utc::now() {
            return Err(SessionRepositoryError::Expired);
        }

        Ok(session)
    }

    pub async fn delete_by_token(&self, raw_token: &str) -> Result<bool, SessionRepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(Self::hash_token(raw_token))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop expired rows; run periodically from the server's sweeper task
    pub async fn cleanup_expired(&self) -> Result<u64, SessionRepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
