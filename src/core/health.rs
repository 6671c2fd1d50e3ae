//! Liveness endpoint
//!
//! `GET /health` always answers 200 so load balancers keep routing while the
//! database is briefly unavailable; the body reports what is degraded.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

use crate::core::config::Environment;
use crate::core::db;

#[derive(Clone)]
pub struct HealthState {
    pub pool: PgPool,
    pub environment: Environment,
    pub started_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: ServiceStatus,
    pub environment: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub database: ComponentStatus,
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> Json<HealthResponse> {
    let database = match db::health_check(&state.pool).await {
        Ok(()) => ComponentStatus::Up,
        Err(e) => {
            tracing::warn!("Database health check failed: {}", e);
            ComponentStatus::Down
        }
    };

    let status = match database {
        ComponentStatus::Up => ServiceStatus::Ok,
        ComponentStatus::Down => ServiceStatus::Degraded,
    };

    Json(HealthResponse {
        status,
        environment: state.environment.as_str(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        database,
    })
}
