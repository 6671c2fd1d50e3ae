//! Diagnostics
//!
//! A client that exercises a running server: health, access token validity,
//! token refresh and post creation. Used by the `inkpost-diagnose` binary.

pub mod client;
pub mod store;

pub use client::{CheckOutcome, DEFAULT_TIMEOUT, DiagnosticsClient, DiagnosticsReport};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};

#[derive(Debug, thiserror::Error)]
pub enum DiagnosticsError {
    #[error("Token store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token store serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
