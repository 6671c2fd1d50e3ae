//! Blog posts
//!
//! HTTP endpoints for creating, listing, editing and deleting posts.

pub mod api;

pub use api::{PostApiError, PostApiState, post_api_router};
