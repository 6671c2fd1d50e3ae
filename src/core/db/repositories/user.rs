//! User repository for database operations
//!
//! Users are created with bcrypt password hashes; the cost factor comes from
//! the environment's configuration.

use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{User, UserRole};

/// User repository error types
#[derive(Debug, thiserror::Error)]
pub enum UserRepositoryError {
    #[error("User not found")]
    NotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Password hashing failed: {0}")]
    HashingError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// User repository for database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
    bcrypt_cost: u32,
}

impl UserRepository {
    pub fn new(pool: PgPool, bcrypt_cost: u32) -> Self {
        Self { pool, bcrypt_cost }
    }

    /// Hash a password using bcrypt with automatic salt generation
    pub fn hash_password(password: &str, cost: u32) -> Result<String, UserRepositoryError> {
        bcrypt::hash(password, cost).map_err(|e| UserRepositoryError::HashingError(e.to_string()))
    }

    /// Verify a password against a bcrypt hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool, UserRepositoryError> {
        bcrypt::verify(password, hash).map_err(|e| UserRepositoryError::HashingError(e.to_string()))
    }

    /// Create a new user with a plain text password (will be hashed)
    pub async fn create(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: UserRole,
    ) -> Result<User, UserRepositoryError> {
        if self.find_by_email(email).await?.is_some() {
            return Err(UserRepositoryError::EmailAlreadyExists);
        }

        let password_hash = Self::hash_password(password, self.bcrypt_cost)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, password_hash, name, role, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(&password_hash)
        .bind(name)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent registration for the same address
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                UserRepositoryError::EmailAlreadyExists
            }
            other => other.into(),
        })?;

        Ok(user)
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserRepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, name, role, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserRepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, name, role, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Authenticate a user by email and password
    /// Returns the user if credentials are valid, None otherwise
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, UserRepositoryError> {
        let user = match self.find_by_email(email).await? {
            Some(u) => u,
            None => return Ok(None),
        };

        let is_valid = Self::verify_password(password, &user.password_hash)?;

        if is_valid { Ok(Some(user)) } else { Ok(None) }
    }

    /// Count total users
    pub async fn count(&self) -> Result<i64, UserRepositoryError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimum bcrypt cost keeps the hashing tests fast
    const TEST_COST: u32 = 4;

    #[test]
    fn test_hash_password_produces_valid_bcrypt_hash() {
        let hash = UserRepository::hash_password("my_secure_password123!", TEST_COST).unwrap();

        assert!(hash.starts_with("$2b$04$"));
        assert_eq!(hash.len(), 60);
    }

    #[test]
    fn test_hash_password_uses_configured_cost() {
        let hash = UserRepository::hash_password("pw", 5).unwrap();
        assert!(hash.starts_with("$2b$05$"));
    }

    #[test]
    fn test_hash_password_produces_different_hashes_for_same_password() {
        let hash1 = UserRepository::hash_password("same_password", TEST_COST).unwrap();
        let hash2 = UserRepository::hash_password("same_password", TEST_COST).unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_verify_password() {
        let hash = UserRepository::hash_password("correct_password", TEST_COST).unwrap();

        assert!(UserRepository::verify_password("correct_password", &hash).unwrap());
        assert!(!UserRepository::verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_unicode() {
        let password = "пароль_密码_🔐";
        let hash = UserRepository::hash_password(password, TEST_COST).unwrap();

        assert!(UserRepository::verify_password(password, &hash).unwrap());
    }

    #[test]
    fn test_verify_password_invalid_hash_format() {
        let result = UserRepository::verify_password("password", "not_a_valid_hash");
        assert!(matches!(result, Err(UserRepositoryError::HashingError(_))));
    }

    #[test]
    fn test_invalid_cost_is_hashing_error() {
        let result = UserRepository::hash_password("password", 99);
        assert!(matches!(result, Err(UserRepositoryError::HashingError(_))));
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_create_and_authenticate() {
        let pool = PgPool::connect("postgres://localhost:5432/inkpost_test")
            .await
            .unwrap();
        let repo = UserRepository::new(pool, TEST_COST);
        let email = format!("{}@example.com", Uuid::new_v4());

        let user = repo
            .create(&email, "Password123", "Tester", UserRole::Author)
            .await
            .unwrap();
        assert_eq!(user.role(), UserRole::Author);

        let found = repo.authenticate(&email, "Password123").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(repo.authenticate(&email, "nope").await.unwrap().is_none());

        let duplicate = repo
            .create(&email, "Password123", "Tester", UserRole::Author)
            .await;
        assert!(matches!(duplicate, Err(UserRepositoryError::EmailAlreadyExists)));
    }
}
