//! Client-side token inspection
//!
//! Reads the payload segment of a JWT without verifying its signature. This is
//! a sanity check for clients deciding whether a stored access token is worth
//! sending; the server still validates every token it receives.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Claims read from an unverified token. Every field is optional because the
/// payload has not been checked against any schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnverifiedClaims {
    pub sub: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub token_type: Option<String>,
    pub iat: Option<i64>,
    pub exp: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("Token must have three dot-separated segments")]
    Malformed,

    #[error("Token payload is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Token payload is not a JSON object: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Local verdict on a stored token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TokenStatus {
    Missing,
    Malformed,
    MissingExpiry,
    Expired { exp: i64 },
    Valid { exp: i64, expires_in: i64 },
}

impl TokenStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenStatus::Valid { .. })
    }
}

/// Decode the payload segment of a JWT without checking the signature
pub fn decode_unverified(token: &str) -> Result<UnverifiedClaims, InspectError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(InspectError::Malformed);
    };

    if header.is_empty() || payload.is_empty() {
        return Err(InspectError::Malformed);
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Classify a token against the current Unix time in seconds
pub fn token_status(token: Option<&str>, now: i64) -> TokenStatus {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return TokenStatus::Missing;
    };

    let claims = match decode_unverified(token) {
        Ok(claims) => claims,
        Err(_) => return TokenStatus::Malformed,
    };

    match claims.exp {
        None => TokenStatus::MissingExpiry,
        Some(exp) if exp > now => TokenStatus::Valid {
            exp,
            expires_in: exp - now,
        },
        Some(exp) => TokenStatus::Expired { exp },
    }
}

/// A token counts as valid only when present and its `exp` is in the future
pub fn is_token_valid(token: Option<&str>, now: i64) -> bool {
    token_status(token, now).is_valid()
}
