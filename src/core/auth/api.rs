//! Auth API endpoints
//!
//! - POST /auth/register - Register a new user
//! - POST /auth/login - Login and get tokens
//! - POST /auth/refresh-token - Rotate the refresh token and mint a new access token
//! - POST /auth/logout - Invalidate the refresh token
//! - GET /auth/me - Get current user info
//!
//! The access token travels in the JSON body; the refresh token lives in an
//! HTTP-only `refreshToken` cookie scoped to `/auth`.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::auth::{AuthError, AuthResponse, AuthService, AuthUser, LoginRequest, RegisterRequest};
use crate::core::db::models::UserResponse;
use crate::core::http::{ApiError, ApiSuccess};

/// Name of the refresh token cookie
pub const REFRESH_COOKIE: &str = "refreshToken";

const REFRESH_COOKIE_PATH: &str = "/auth";

/// Auth API state containing the auth service
#[derive(Clone)]
pub struct AuthApiState {
    pub auth_service: AuthService,
    /// Mark the refresh cookie `Secure` (production)
    pub secure_cookies: bool,
}

impl AuthError {
    /// HTTP status and machine-readable code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            AuthError::EmailAlreadyExists => (StatusCode::CONFLICT, "EMAIL_EXISTS"),
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "MISSING_TOKEN"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            AuthError::SessionNotFound => (StatusCode::UNAUTHORIZED, "SESSION_NOT_FOUND"),
            AuthError::PasswordTooShort => (StatusCode::BAD_REQUEST, "PASSWORD_TOO_SHORT"),
            AuthError::PasswordTooWeak => (StatusCode::BAD_REQUEST, "PASSWORD_TOO_WEAK"),
            AuthError::InvalidEmail => (StatusCode::BAD_REQUEST, "INVALID_EMAIL"),
            AuthError::InvalidName => (StatusCode::BAD_REQUEST, "INVALID_NAME"),
            AuthError::InternalError(msg) => {
                tracing::error!("Auth internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        ApiError::new(self.to_string(), code).into_response_with(status)
    }
}

/// Payload returned by login, register and refresh
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub access_token: String,
    pub access_expires_at: i64,
    pub user: UserResponse,
}

impl From<&AuthResponse> for SessionData {
    fn from(resp: &AuthResponse) -> Self {
        Self {
            access_token: resp.tokens.access_token.clone(),
            access_expires_at: resp.tokens.access_expires_at,
            user: resp.user.clone(),
        }
    }
}

/// Optional JSON body for clients that cannot hold cookies
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    refresh_token: Option<String>,
}

/// Response for logout
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh-token", post(refresh_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/me", get(me_handler))
        .with_state(state)
}

fn refresh_cookie(state: &AuthApiState, resp: &AuthResponse) -> Cookie<'static> {
    let max_age = state.auth_service.jwt().refresh_token_expiration_days();

    Cookie::build((REFRESH_COOKIE, resp.tokens.refresh_token.clone()))
        .http_only(true)
        .secure(state.secure_cookies)
        .same_site(SameSite::Strict)
        .path(REFRESH_COOKIE_PATH)
        .max_age(time::Duration::days(max_age))
        .build()
}

fn removal_cookie() -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE).path(REFRESH_COOKIE_PATH).build()
}

/// POST /auth/register
async fn register_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<ApiSuccess<SessionData>>), AuthError> {
    tracing::info!("Registration attempt for email: {}", request.email);

    let response = state.auth_service.register(request).await?;

    tracing::info!("User registered: {} ({})", response.user.email, response.user.role);

    let jar = jar.add(refresh_cookie(&state, &response));
    Ok((
        StatusCode::CREATED,
        jar,
        ApiSuccess::new(SessionData::from(&response)),
    ))
}

/// POST /auth/login
async fn login_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<ApiSuccess<SessionData>>), AuthError> {
    tracing::info!("Login attempt for email: {}", request.email);

    let response = state.auth_service.login(request).await?;

    tracing::info!("User logged in: {}", response.user.email);

    let jar = jar.add(refresh_cookie(&state, &response));
    Ok((jar, ApiSuccess::new(SessionData::from(&response))))
}

/// Refresh token from the cookie, falling back to a JSON body
fn presented_refresh_token(jar: &CookieJar, body: &Bytes) -> Option<String> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        return Some(cookie.value().to_string());
    }

    if body.is_empty() {
        return None;
    }

    serde_json::from_slice::<RefreshBody>(body)
        .ok()
        .and_then(|b| b.refresh_token)
        .filter(|t| !t.is_empty())
}

/// POST /auth/refresh-token
/// A failed refresh also clears the cookie so the client starts over at login.
async fn refresh_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
    body: Bytes,
) -> Response {
    let Some(token) = presented_refresh_token(&jar, &body) else {
        return AuthError::MissingToken.into_response();
    };

    match state.auth_service.refresh(&token).await {
        Ok(response) => {
            tracing::debug!("Rotated refresh token for user {}", response.user.id);
            let jar = jar.add(refresh_cookie(&state, &response));
            (jar, ApiSuccess::new(SessionData::from(&response))).into_response()
        }
        Err(err) => {
            tracing::info!("Token refresh rejected: {}", err);
            (jar.remove(removal_cookie()), err).into_response()
        }
    }
}

/// POST /auth/logout
async fn logout_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<ApiSuccess<LogoutResponse>>), AuthError> {
    if let Some(token) = presented_refresh_token(&jar, &body) {
        state.auth_service.logout(&token).await?;
    }

    Ok((
        jar.remove(removal_cookie()),
        ApiSuccess::new(LogoutResponse {
            message: "Logged out successfully".to_string(),
        }),
    ))
}

/// GET /auth/me
async fn me_handler(
    State(state): State<Arc<AuthApiState>>,
    headers: HeaderMap,
) -> Result<Json<ApiSuccess<UserResponse>>, AuthError> {
    let caller = require_user(&state.auth_service, &headers)?;
    let user = state.auth_service.get_current_user(caller.id).await?;

    Ok(ApiSuccess::new(user))
}

/// Extract Bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidToken)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}

/// Authenticate the caller of a protected route
pub fn require_user(auth: &AuthService, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
    let token = extract_bearer_token(headers)?;
    auth.authenticate_access_token(token)
}

/// Authenticate the caller when a bearer token is present
pub fn optional_user(auth: &AuthService, headers: &HeaderMap) -> Option<AuthUser> {
    let token = extract_bearer_token(headers).ok()?;
    auth.authenticate_access_token(token).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::jwt::{JwtConfig, JwtService};
    use crate::core::db::repositories::{SessionRepository, UserRepository};
    use axum::{body::Body, http::HeaderValue, http::Request};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    fn create_test_app() -> Router {
        // Lazy pool: requests rejected before any query never touch the database
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost:5432/inkpost_test")
            .unwrap();
        let jwt = JwtService::new(JwtConfig::new("access", "refresh"));
        let auth_service = AuthService::new(
            UserRepository::new(pool.clone(), 4),
            SessionRepository::new(pool),
            jwt,
        );

        auth_api_router(AuthApiState {
            auth_service,
            secure_cookies: false,
        })
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_extract_bearer_token_valid() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer my_token_123"),
        );

        assert_eq!(extract_bearer_token(&headers).unwrap(), "my_token_123");
    }

    #[test]
    fn test_extract_bearer_token_missing_header() {
        let headers = HeaderMap::new();
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn test_extract_bearer_token_invalid_format() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic base64credentials"),
        );

        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_extract_bearer_token_empty_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));

        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn test_presented_refresh_token_prefers_cookie() {
        let jar = CookieJar::new().add(Cookie::new(REFRESH_COOKIE, "from-cookie"));
        let body = Bytes::from_static(br#"{"refreshToken":"from-body"}"#);

        assert_eq!(
            presented_refresh_token(&jar, &body).as_deref(),
            Some("from-cookie")
        );
        assert_eq!(
            presented_refresh_token(&CookieJar::new(), &body).as_deref(),
            Some("from-body")
        );
        assert_eq!(presented_refresh_token(&CookieJar::new(), &Bytes::new()), None);
        assert_eq!(
            presented_refresh_token(&CookieJar::new(), &Bytes::from_static(b"not json")),
            None
        );
    }

    #[test]
    fn test_auth_error_status_codes() {
        assert_eq!(
            AuthError::InvalidCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::EmailAlreadyExists.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthError::PasswordTooWeak.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::InternalError("db".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .uri("/auth/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "MISSING_TOKEN");
    }

    #[tokio::test]
    async fn test_refresh_without_token() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/refresh-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_with_forged_token_clears_cookie() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/refresh-token")
                    .header(header::COOKIE, "refreshToken=forged.token.value")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(set_cookie.starts_with("refreshToken="));
        assert!(set_cookie.contains("Max-Age=0"));

        let body = json_body(response).await;
        assert_eq!(body["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_logout_without_token_succeeds() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/logout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["message"], "Logged out successfully");
    }

    /// `refreshToken` value from a response's `Set-Cookie` headers
    fn refresh_cookie_from(response: &Response) -> Option<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| Cookie::parse(v.to_string()).ok())
            .find(|c| c.name() == REFRESH_COOKIE)
            .map(|c| c.value().to_string())
    }

    fn post_with_cookie(uri: &str, refresh_token: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::COOKIE, format!("{}={}", REFRESH_COOKIE, refresh_token))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_refresh_token_lifecycle() {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost:5432/inkpost_test".to_string());
        let pool = crate::core::db::create_pool_with_migrations(&crate::core::db::DbConfig {
            database_url,
            ..Default::default()
        })
        .await
        .unwrap();

        let app = auth_api_router(AuthApiState {
            auth_service: AuthService::new(
                UserRepository::new(pool.clone(), 4),
                SessionRepository::new(pool),
                JwtService::new(JwtConfig::new("access", "refresh")),
            ),
            secure_cookies: false,
        });

        // Register sets the refresh cookie and returns an access token
        let email = format!("{}@example.com", uuid::Uuid::new_v4());
        let register_body = serde_json::json!({
            "email": email,
            "password": "Password123",
            "name": "Lifecycle",
        });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(register_body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let first_refresh = refresh_cookie_from(&response).unwrap();
        let body = json_body(response).await;
        assert!(body["data"]["accessToken"].is_string());

        // Refresh rotates the cookie and returns a new access token
        let response = app
            .clone()
            .oneshot(post_with_cookie("/auth/refresh-token", &first_refresh))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let second_refresh = refresh_cookie_from(&response).unwrap();
        assert_ne!(second_refresh, first_refresh);
        let body = json_body(response).await;
        let access_token = body["data"]["accessToken"].as_str().unwrap().to_string();

        // The rotated-out token cannot be replayed
        let response = app
            .clone()
            .oneshot(post_with_cookie("/auth/refresh-token", &first_refresh))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "SESSION_NOT_FOUND");

        // The new access token identifies the user
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/me")
                    .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["email"], email);

        // Logout removes the session, so the current token stops working too
        let response = app
            .clone()
            .oneshot(post_with_cookie("/auth/logout", &second_refresh))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post_with_cookie("/auth/refresh-token", &second_refresh))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "SESSION_NOT_FOUND");
    }
}
