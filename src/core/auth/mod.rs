//! Authentication module for Inkpost
//!
//! - JWT access/refresh token generation and validation
//! - Client-side token inspection (no signature check)
//! - User registration and login
//! - Refresh-token sessions with rotation
//! - REST API endpoints for auth operations

pub mod inspect;

#[cfg(feature = "ssr")]
pub mod api;
#[cfg(feature = "ssr")]
pub mod jwt;
#[cfg(feature = "ssr")]
pub mod service;

#[cfg(feature = "ssr")]
pub use api::{AuthApiState, auth_api_router, optional_user, require_user};
#[cfg(feature = "ssr")]
pub use jwt::{Claims, JwtConfig, JwtError, JwtService, TokenPair, TokenSubject, TokenType};
#[cfg(feature = "ssr")]
pub use service::{AuthError, AuthResponse, AuthService, AuthUser, LoginRequest, RegisterRequest};
