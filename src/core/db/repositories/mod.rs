//! Database repositories for Inkpost
//!
//! Repositories encapsulate data access and give the services a typed API
//! over the PostgreSQL tables.

pub mod post;
pub mod session;
pub mod user;

pub use post::{PostRepository, PostRepositoryError};
pub use session::{SessionRepository, SessionRepositoryError};
pub use user::{UserRepository, UserRepositoryError};
