//! Database module for Inkpost
//!
//! Connectivity, models, and repositories for persistent storage using
//! PostgreSQL and SQLx.

pub mod models;
pub mod pool;
pub mod repositories;

pub use models::*;
pub use pool::{DbConfig, DbError, create_pool, create_pool_with_migrations, health_check};
pub use repositories::{
    PostRepository, PostRepositoryError, SessionRepository, SessionRepositoryError,
    UserRepository, UserRepositoryError,
};

pub use sqlx::PgPool;
