//! Access token persistence in the browser
//!
//! The admin keeps its access token in localStorage under `accessToken`; the
//! refresh token never leaves its HTTP-only cookie.

/// localStorage key holding the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

#[cfg(feature = "hydrate")]
fn storage() -> Result<web_sys::Storage, String> {
    web_sys::window()
        .ok_or("No window available")?
        .local_storage()
        .map_err(|_| "Failed to get localStorage")?
        .ok_or_else(|| "localStorage not available".to_string())
}

/// Stored access token, if any
#[cfg(feature = "hydrate")]
pub fn get_access_token() -> Option<String> {
    storage()
        .ok()?
        .get_item(ACCESS_TOKEN_KEY)
        .ok()?
        .filter(|token| !token.is_empty())
}

#[cfg(feature = "hydrate")]
pub fn clear_access_token() -> Result<(), String> {
    storage()?
        .remove_item(ACCESS_TOKEN_KEY)
        .map_err(|_| "Failed to remove access token".to_string())
}

/// Whether the stored token is present and not yet expired. An unusable token
/// is removed so the next request goes through a refresh instead.
#[cfg(feature = "hydrate")]
pub fn has_valid_access_token() -> bool {
    let now = (js_sys::Date::now() / 1000.0) as i64;
    let token = get_access_token();
    let valid = crate::core::auth::inspect::is_token_valid(token.as_deref(), now);

    if !valid && token.is_some() {
        if let Err(e) = clear_access_token() {
            leptos::logging::warn!("Could not clear stale access token: {}", e);
        }
    }
    valid
}

/// Server render has no storage; nobody is signed in there
#[cfg(not(feature = "hydrate"))]
pub fn has_valid_access_token() -> bool {
    false
}
