//! Diagnostics HTTP client
//!
//! Each check talks to a running server and reports a [`CheckOutcome`].
//! Network and parse failures end up in the outcome instead of being
//! returned as errors, so a full run always produces a report.

use chrono::Utc;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::multipart::Form;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::DiagnosticsError;
use super::store::TokenStore;
use crate::core::auth::inspect::token_status;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const REFRESH_COOKIE: &str = "refreshToken";

/// Result of one diagnostic check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckOutcome {
    pub fn passed(status: Option<u16>, data: Value) -> Self {
        Self {
            success: true,
            status,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(status: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status,
            data: None,
            error: Some(error.into()),
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Outcomes of a full diagnostics run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub health: CheckOutcome,
    pub token: CheckOutcome,
    /// Only attempted when the token check failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<CheckOutcome>,
    pub post_creation: CheckOutcome,
}

impl DiagnosticsReport {
    pub fn all_passed(&self) -> bool {
        self.health.success
            && (self.token.success || self.refresh.as_ref().is_some_and(|r| r.success))
            && self.post_creation.success
    }
}

/// Pull the access token out of either `{ accessToken }` or
/// `{ data: { accessToken } }`
pub fn extract_access_token(body: &Value) -> Option<&str> {
    body.get("accessToken")
        .or_else(|| body.get("data").and_then(|data| data.get("accessToken")))
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
}

/// Human-readable failure message from an error body
fn error_message(body: &Value, status: reqwest::StatusCode) -> String {
    body.get("error")
        .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(Value::as_str)))
        .or_else(|| body.get("message").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed with status {}", status))
}

/// Value of `refreshToken` in a `Set-Cookie` header, if that is the cookie it sets
fn refresh_cookie_value(set_cookie: &str) -> Option<&str> {
    let pair = set_cookie.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    (name.trim() == REFRESH_COOKIE).then(|| value.trim())
}

pub struct DiagnosticsClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    refresh_token: Mutex<Option<String>>,
}

impl DiagnosticsClient {
    pub fn new(base_url: &str, store: Arc<dyn TokenStore>) -> Result<Self, DiagnosticsError> {
        Self::with_timeout(base_url, store, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        store: Arc<dyn TokenStore>,
        timeout: Duration,
    ) -> Result<Self, DiagnosticsError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            refresh_token: Mutex::new(None),
        })
    }

    /// Refresh token to present as the `refreshToken` cookie, taking
    /// precedence over one held by the store
    pub fn with_refresh_token(self, token: impl Into<String>) -> Self {
        *self.refresh_slot() = Some(token.into());
        self
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn current_refresh_token(&self) -> Option<String> {
        self.refresh_slot().clone().or_else(|| self.store.get_refresh())
    }

    fn refresh_slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.refresh_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn discard_access_token(&self) {
        if let Err(e) = self.store.remove() {
            tracing::warn!("Failed to remove stored token: {}", e);
        }
    }

    /// Turn a response into an outcome carrying the parsed body
    async fn outcome(response: reqwest::Response) -> (CheckOutcome, Value) {
        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                let outcome = CheckOutcome::failed(Some(status.as_u16()), e.to_string());
                return (outcome, Value::Null);
            }
        };
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        let outcome = if status.is_success() {
            CheckOutcome::passed(Some(status.as_u16()), body.clone())
        } else {
            CheckOutcome::failed(Some(status.as_u16()), error_message(&body, status))
                .with_data(body.clone())
        };
        (outcome, body)
    }

    /// GET /health
    pub async fn check_health(&self) -> CheckOutcome {
        match self.http.get(self.url("/health")).send().await {
            Ok(response) => Self::outcome(response).await.0,
            Err(e) => CheckOutcome::failed(None, format!("Health check failed: {}", e)),
        }
    }

    /// Check the stored access token locally, then ask the server about it.
    /// A token that fails either check is removed from the store.
    pub async fn check_token(&self) -> CheckOutcome {
        let token = self.store.get();
        let status = token_status(token.as_deref(), Utc::now().timestamp());
        let local = serde_json::to_value(&status).unwrap_or(Value::Null);

        let Some(token) = token.filter(|_| status.is_valid()) else {
            if self.store.get().is_some() {
                self.discard_access_token();
            }
            return CheckOutcome::failed(None, "No valid access token").with_data(local);
        };

        let response = match self
            .http
            .get(self.url("/auth/me"))
            .bearer_auth(&token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return CheckOutcome::failed(None, format!("Token check failed: {}", e))
                    .with_data(local);
            }
        };

        let (outcome, body) = Self::outcome(response).await;
        if outcome.status == Some(401) {
            self.discard_access_token();
        }

        let data = json!({ "local": local, "server": body });
        CheckOutcome { data: Some(data), ..outcome }
    }

    /// POST /auth/refresh-token. A new access token replaces the stored one;
    /// on any failure the stored token is removed.
    pub async fn refresh_token(&self) -> CheckOutcome {
        let mut request = self.http.post(self.url("/auth/refresh-token"));
        let body = match self.current_refresh_token() {
            Some(refresh) => {
                request = request.header(COOKIE, format!("{}={}", REFRESH_COOKIE, refresh));
                json!({ "refreshToken": refresh })
            }
            None => json!({}),
        };

        let response = match request.json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                self.discard_access_token();
                return CheckOutcome::failed(None, format!("Token refresh failed: {}", e));
            }
        };

        let rotated = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(refresh_cookie_value)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let (outcome, body) = Self::outcome(response).await;
        if !outcome.success {
            self.discard_access_token();
            return outcome;
        }

        let Some(access_token) = extract_access_token(&body) else {
            self.discard_access_token();
            return CheckOutcome::failed(outcome.status, "Response did not contain an access token");
        };

        if let Err(e) = self.store.set(access_token) {
            return CheckOutcome::failed(outcome.status, format!("Failed to store token: {}", e));
        }
        // The server deleted the presented session; keep its replacement
        if let Some(rotated) = rotated {
            *self.refresh_slot() = Some(rotated.clone());
            if let Err(e) = self.store.set_refresh(&rotated) {
                return CheckOutcome::failed(
                    outcome.status,
                    format!("Failed to store rotated refresh token: {}", e),
                );
            }
        }

        tracing::info!("Access token refreshed");
        outcome
    }

    /// POST /posts with a small draft
    pub async fn test_post_creation(&self) -> CheckOutcome {
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let delta = json!({ "ops": [{ "insert": "Created by inkpost-diagnose\n" }] });

        let form = Form::new()
            .text("title", format!("Diagnostics post {}", stamp))
            .text("excerpt", "Sample post created by the diagnostics tool")
            .text("contentHtml", "<p>Created by inkpost-diagnose</p>")
            .text("contentDelta", delta.to_string())
            .text("published", "false")
            .text("category", "diagnostics");

        let mut request = self.http.post(self.url("/posts")).multipart(form);
        if let Some(token) = self.store.get() {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => Self::outcome(response).await.0,
            Err(e) => CheckOutcome::failed(None, format!("Post creation failed: {}", e)),
        }
    }

    /// Health, token, refresh when the token is unusable, then post creation
    pub async fn run_all(&self) -> DiagnosticsReport {
        let health = self.check_health().await;
        let token = self.check_token().await;
        let refresh = if token.success {
            None
        } else {
            Some(self.refresh_token().await)
        };
        let post_creation = self.test_post_creation().await;

        DiagnosticsReport {
            health,
            token,
            refresh,
            post_creation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::{FileTokenStore, MemoryTokenStore};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Unsigned token carrying only an `exp` claim
    fn token_expiring_at(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": "u1", "exp": exp }).to_string());
        format!("{header}.{payload}.signature")
    }

    fn fresh_token() -> String {
        token_expiring_at(Utc::now().timestamp() + 600)
    }

    fn client(server: &MockServer, store: Arc<MemoryTokenStore>) -> DiagnosticsClient {
        DiagnosticsClient::new(&server.uri(), store).unwrap()
    }

    #[test]
    fn test_extract_access_token_shapes() {
        assert_eq!(extract_access_token(&json!({ "accessToken": "a" })), Some("a"));
        assert_eq!(
            extract_access_token(&json!({ "success": true, "data": { "accessToken": "b" } })),
            Some("b")
        );
        assert_eq!(extract_access_token(&json!({ "data": {} })), None);
        assert_eq!(extract_access_token(&json!({ "accessToken": "" })), None);
    }

    #[test]
    fn test_refresh_cookie_value() {
        assert_eq!(
            refresh_cookie_value("refreshToken=abc; HttpOnly; Path=/auth"),
            Some("abc")
        );
        assert_eq!(refresh_cookie_value("other=abc; Path=/"), None);
    }

    #[test]
    fn test_outcome_serialization_skips_empty_fields() {
        let json = serde_json::to_value(CheckOutcome::failed(None, "boom")).unwrap();
        assert_eq!(json, json!({ "success": false, "error": "boom" }));
    }

    #[tokio::test]
    async fn test_check_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "status": "ok", "database": "up" })),
            )
            .mount(&server)
            .await;

        let outcome = client(&server, Arc::new(MemoryTokenStore::new()))
            .check_health()
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.status, Some(200));
        assert_eq!(outcome.data.unwrap()["status"], "ok");
    }

    #[tokio::test]
    async fn test_check_health_unreachable() {
        let client = DiagnosticsClient::with_timeout(
            "http://127.0.0.1:1",
            Arc::new(MemoryTokenStore::new()),
            Duration::from_secs(2),
        )
        .unwrap();

        let outcome = client.check_health().await;
        assert!(!outcome.success);
        assert_eq!(outcome.status, None);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_check_token_removes_expired_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token(token_expiring_at(1_000)));
        let outcome = client(&server, store.clone()).check_token().await;

        assert!(!outcome.success);
        assert_eq!(outcome.data.unwrap()["status"], "expired");
        assert_eq!(store.get(), None);
    }

    #[tokio::test]
    async fn test_check_token_removes_malformed_token() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::with_token("not-a-jwt"));

        let outcome = client(&server, store.clone()).check_token().await;

        assert!(!outcome.success);
        assert_eq!(store.get(), None);
    }

    #[tokio::test]
    async fn test_check_token_missing() {
        let server = MockServer::start().await;
        let outcome = client(&server, Arc::new(MemoryTokenStore::new()))
            .check_token()
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.data.unwrap()["status"], "missing");
    }

    #[tokio::test]
    async fn test_check_token_valid() {
        let server = MockServer::start().await;
        let token = fresh_token();
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "email": "ada@example.com" }
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token(token.clone()));
        let outcome = client(&server, store.clone()).check_token().await;

        assert!(outcome.success);
        let data = outcome.data.unwrap();
        assert_eq!(data["local"]["status"], "valid");
        assert_eq!(data["server"]["data"]["email"], "ada@example.com");
        assert_eq!(store.get(), Some(token));
    }

    #[tokio::test]
    async fn test_check_token_rejected_by_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "success": false,
                "error": "Invalid token",
                "code": "INVALID_TOKEN"
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token(fresh_token()));
        let outcome = client(&server, store.clone()).check_token().await;

        assert!(!outcome.success);
        assert_eq!(outcome.status, Some(401));
        assert_eq!(outcome.error.as_deref(), Some("Invalid token"));
        assert_eq!(store.get(), None);
    }

    #[tokio::test]
    async fn test_refresh_token_wrapped_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh-token"))
            .and(header("cookie", "refreshToken=old-refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "refreshToken=new-refresh; HttpOnly; Path=/auth")
                    .set_body_json(json!({
                        "success": true,
                        "data": { "accessToken": "new-access" }
                    })),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token("stale"));
        let client = client(&server, store.clone()).with_refresh_token("old-refresh");
        let outcome = client.refresh_token().await;

        assert!(outcome.success);
        assert_eq!(store.get().as_deref(), Some("new-access"));
        assert_eq!(client.current_refresh_token().as_deref(), Some("new-refresh"));
        assert_eq!(store.get_refresh().as_deref(), Some("new-refresh"));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_survives_to_next_run() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh-token"))
            .and(header("cookie", "refreshToken=first"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "refreshToken=second; HttpOnly; Path=/auth")
                    .set_body_json(json!({ "data": { "accessToken": "access-1" } })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh-token"))
            .and(header("cookie", "refreshToken=second"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": { "accessToken": "access-2" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token_file = dir.path().join("token.json");

        let first_run = DiagnosticsClient::new(
            &server.uri(),
            Arc::new(FileTokenStore::new(&token_file)),
        )
        .unwrap()
        .with_refresh_token("first");
        assert!(first_run.refresh_token().await.success);

        // A new process only has the file to go on
        let store = Arc::new(FileTokenStore::new(&token_file));
        let second_run = DiagnosticsClient::new(&server.uri(), store.clone()).unwrap();
        assert_eq!(second_run.current_refresh_token().as_deref(), Some("second"));
        assert!(second_run.refresh_token().await.success);
        assert_eq!(store.get().as_deref(), Some("access-2"));
    }

    #[tokio::test]
    async fn test_refresh_token_flat_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "flat-access" })),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let outcome = client(&server, store.clone()).refresh_token().await;

        assert!(outcome.success);
        assert_eq!(store.get().as_deref(), Some("flat-access"));
    }

    #[tokio::test]
    async fn test_refresh_token_failure_removes_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh-token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "success": false,
                "error": "Session not found or expired",
                "code": "SESSION_NOT_FOUND"
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token("stale"));
        let outcome = client(&server, store.clone()).refresh_token().await;

        assert!(!outcome.success);
        assert_eq!(outcome.status, Some(401));
        assert_eq!(store.get(), None);
    }

    #[tokio::test]
    async fn test_refresh_token_without_token_in_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token("stale"));
        let outcome = client(&server, store.clone()).refresh_token().await;

        assert!(!outcome.success);
        assert_eq!(store.get(), None);
    }

    #[tokio::test]
    async fn test_post_creation_sends_bearer_and_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/posts"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "success": true,
                "data": { "slug": "diagnostics-post" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token(fresh_token()));
        let outcome = client(&server, store).test_post_creation().await;

        assert!(outcome.success);
        assert_eq!(outcome.status, Some(201));

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        for field in ["title", "excerpt", "contentHtml", "contentDelta", "published", "category"] {
            assert!(body.contains(&format!("name=\"{field}\"")), "missing {field}");
        }
    }

    #[tokio::test]
    async fn test_run_all_refreshes_when_token_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": { "accessToken": "renewed" } })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/posts"))
            .and(header("authorization", "Bearer renewed"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "success": true })))
            .mount(&server)
            .await;

        let report = client(&server, Arc::new(MemoryTokenStore::new()))
            .run_all()
            .await;

        assert!(report.health.success);
        assert!(!report.token.success);
        assert!(report.refresh.as_ref().unwrap().success);
        assert!(report.post_creation.success);
        assert!(report.all_passed());
    }
}
