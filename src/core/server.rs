//! HTTP API assembly
//!
//! Wires repositories and services into the auth, post and health routers and
//! applies the shared layers: request tracing, CORS for the admin origin, and
//! the per-address rate limit.

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::core::auth::{AuthApiState, AuthService, JwtService, auth_api_router};
use crate::core::config::Config;
use crate::core::db::repositories::{PostRepository, SessionRepository, UserRepository};
use crate::core::health::{HealthState, health_router};
use crate::core::posts::{PostApiState, post_api_router};
use crate::core::rate_limit::{RateLimiter, rate_limit_middleware};
use crate::core::uploads::{CloudinaryClient, UploadError};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("CORS_ORIGIN is not a valid header value: {0}")]
    InvalidCorsOrigin(String),

    #[error("Failed to set up image uploads: {0}")]
    Uploads(#[from] UploadError),
}

/// Everything the API routers are built from
pub struct ApiContext {
    pub config: Config,
    pub pool: PgPool,
    pub started_at: Instant,
}

/// Build the CORS layer allowing credentialed requests from one origin
pub fn cors_layer(origin: &str) -> Result<CorsLayer, ServerError> {
    let origin = HeaderValue::from_str(origin)
        .map_err(|_| ServerError::InvalidCorsOrigin(origin.to_string()))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(600)))
}

/// Build the API router. Returns the limiter too so the caller can purge it.
pub fn api_router(ctx: ApiContext) -> Result<(Router, Option<Arc<RateLimiter>>), ServerError> {
    let ApiContext {
        config,
        pool,
        started_at,
    } = ctx;

    let jwt_service = JwtService::new(config.jwt.clone());
    let auth_service = AuthService::new(
        UserRepository::new(pool.clone(), config.bcrypt_rounds),
        SessionRepository::new(pool.clone()),
        jwt_service,
    );

    let uploader = CloudinaryClient::from_config(&config.cloudinary)?;
    if uploader.is_none() {
        tracing::warn!("Cloudinary is not configured; posts with images will be rejected");
    }

    let auth_api = auth_api_router(AuthApiState {
        auth_service: auth_service.clone(),
        secure_cookies: config.environment.is_production(),
    });

    let post_api = post_api_router(PostApiState {
        post_repo: PostRepository::new(pool.clone()),
        auth_service,
        uploader,
    });

    let health = health_router(HealthState {
        pool,
        environment: config.environment,
        started_at,
    });

    let mut router = Router::new().merge(auth_api).merge(post_api).merge(health);

    let limiter = RateLimiter::from_config(&config.rate_limit).map(Arc::new);
    match &limiter {
        Some(limiter) => {
            tracing::info!(
                "Rate limit: {} requests per {}s (trust proxy: {})",
                config.rate_limit.max_requests,
                config.rate_limit.window_secs,
                config.rate_limit.trust_proxy
            );
            router = router.layer(middleware::from_fn_with_state(
                limiter.clone(),
                rate_limit_middleware,
            ));
        }
        None => tracing::info!("Rate limiting disabled"),
    }

    let router = router
        .layer(cors_layer(&config.cors_origin)?)
        .layer(TraceLayer::new_for_http());

    Ok((router, limiter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Environment;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    fn test_context(config: Config) -> ApiContext {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy("postgres://127.0.0.1:1/inkpost_test")
            .unwrap();
        ApiContext {
            config,
            pool,
            started_at: Instant::now(),
        }
    }

    #[test]
    fn test_cors_layer_rejects_bad_origin() {
        assert!(cors_layer("http://localhost:5173").is_ok());
        assert!(matches!(
            cors_layer("bad\norigin"),
            Err(ServerError::InvalidCorsOrigin(_))
        ));
    }

    #[tokio::test]
    async fn test_rate_limiter_follows_environment() {
        let (_, limiter) =
            api_router(test_context(Config::for_environment(Environment::Test))).unwrap();
        assert!(limiter.is_none());

        let (_, limiter) =
            api_router(test_context(Config::for_environment(Environment::Development))).unwrap();
        assert_eq!(limiter.unwrap().max_requests(), 1000);
    }

    #[tokio::test]
    async fn test_preflight_allows_configured_origin() {
        let (app, _) =
            api_router(test_context(Config::for_environment(Environment::Test))).unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/posts")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:5173"
        );
        assert_eq!(response.headers()["access-control-allow-credentials"], "true");
    }

    #[tokio::test]
    async fn test_health_is_mounted() {
        let (app, _) =
            api_router(test_context(Config::for_environment(Environment::Test))).unwrap();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
