//! Authentication service
//!
//! Business logic for registration, login, logout, and token refresh.
//! Coordinates between the user repository, the session repository, and the
//! JWT service.

use uuid::Uuid;

use crate::core::auth::jwt::{JwtError, JwtService, TokenPair, TokenSubject};
use crate::core::db::models::{User, UserResponse, UserRole};
use crate::core::db::repositories::{
    SessionRepository, SessionRepositoryError, UserRepository, UserRepositoryError,
};

/// Width of the `users.email` column
const MAX_EMAIL_LENGTH: usize = 255;

/// Authentication service error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("Authentication required")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Session not found or expired")]
    SessionNotFound,

    #[error("Password too short (minimum 8 characters)")]
    PasswordTooShort,

    #[error("Password too weak")]
    PasswordTooWeak,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Name must be between 1 and 100 characters")]
    InvalidName,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<UserRepositoryError> for AuthError {
    fn from(err: UserRepositoryError) -> Self {
        match err {
            UserRepositoryError::NotFound => AuthError::UserNotFound,
            UserRepositoryError::EmailAlreadyExists => AuthError::EmailAlreadyExists,
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

impl From<SessionRepositoryError> for AuthError {
    fn from(err: SessionRepositoryError) -> Self {
        match err {
            SessionRepositoryError::NotFound => AuthError::SessionNotFound,
            SessionRepositoryError::Expired => AuthError::TokenExpired,
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::InvalidToken | JwtError::InvalidTokenType => AuthError::InvalidToken,
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

/// Registration request data
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Login request data
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// User data and freshly issued tokens
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub tokens: TokenPair,
}

/// Caller identity taken from a verified access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    session_repo: SessionRepository,
    jwt_service: JwtService,
}

impl AuthService {
    pub fn new(
        user_repo: UserRepository,
        session_repo: SessionRepository,
        jwt_service: JwtService,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            jwt_service,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt_service
    }

    /// Validate email format: something@something.something, at most 255 characters
    fn validate_email(email: &str) -> Result<(), AuthError> {
        if email.chars().count() > MAX_EMAIL_LENGTH {
            return Err(AuthError::InvalidEmail);
        }

        let Some((local, domain)) = email.split_once('@') else {
            return Err(AuthError::InvalidEmail);
        };

        if local.is_empty() || domain.contains('@') || !domain.contains('.') {
            return Err(AuthError::InvalidEmail);
        }

        if domain.split('.').any(|part| part.is_empty()) {
            return Err(AuthError::InvalidEmail);
        }

        Ok(())
    }

    fn validate_name(name: &str) -> Result<(), AuthError> {
        let len = name.trim().chars().count();
        if len == 0 || len > 100 {
            return Err(AuthError::InvalidName);
        }
        Ok(())
    }

    /// Minimum 8 characters with an uppercase letter, a lowercase letter and a digit
    fn validate_password(password: &str) -> Result<(), AuthError> {
        if password.chars().count() < 8 {
            return Err(AuthError::PasswordTooShort);
        }

        let has_uppercase = password.chars().any(|c| c.is_uppercase());
        let has_lowercase = password.chars().any(|c| c.is_lowercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());

        if !has_uppercase || !has_lowercase || !has_digit {
            return Err(AuthError::PasswordTooWeak);
        }

        Ok(())
    }

    /// Issue a token pair for a user and record the refresh session
    async fn start_session(&self, user: &User) -> Result<TokenPair, AuthError> {
        let tokens = self.jwt_service.generate_token_pair(TokenSubject {
            user_id: user.id,
            email: &user.email,
            role: user.role().as_str(),
        })?;

        self.session_repo
            .create(
                user.id,
                &tokens.refresh_token,
                self.jwt_service.refresh_token_expiration_days(),
            )
            .await?;

        Ok(tokens)
    }

    /// Register a new user. The first account on a fresh install becomes admin.
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        let email = request.email.trim().to_lowercase();
        Self::validate_email(&email)?;
        Self::validate_name(&request.name)?;
        Self::validate_password(&request.password)?;

        let role = if self.user_repo.count().await? == 0 {
            UserRole::Admin
        } else {
            UserRole::Author
        };

        let user = self
            .user_repo
            .create(&email, &request.password, request.name.trim(), role)
            .await?;

        let tokens = self.start_session(&user).await?;

        Ok(AuthResponse {
            user: user.into(),
            tokens,
        })
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        let email = request.email.trim().to_lowercase();
        let user = self
            .user_repo
            .authenticate(&email, &request.password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let tokens = self.start_session(&user).await?;

        Ok(AuthResponse {
            user: user.into(),
            tokens,
        })
    }

    /// Invalidate a refresh token. Unknown tokens are not an error.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let removed = self.session_repo.delete_by_token(refresh_token).await?;
        tracing::debug!("Logout removed session: {}", removed);
        Ok(())
    }

    /// Rotate a refresh token: the presented session is claimed (deleted) and
    /// a new token pair with a new session replaces it. A token that was
    /// already rotated or logged out yields `SessionNotFound`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        let claims = self.jwt_service.validate_refresh_token(refresh_token)?;
        let session = self.session_repo.claim(refresh_token).await?;

        let user_id = claims.user_id()?;
        if session.user_id != user_id {
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let tokens = self.start_session(&user).await?;

        Ok(AuthResponse {
            user: user.into(),
            tokens,
        })
    }

    pub async fn get_current_user(&self, user_id: Uuid) -> Result<UserResponse, AuthError> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(user.into())
    }

    /// Verify an access token and return the caller it identifies
    pub fn authenticate_access_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.jwt_service.validate_access_token(token)?;
        Ok(AuthUser {
            id: claims.user_id()?,
            role: claims.role.parse().unwrap_or_default(),
        })
    }
}
