//! Service self-health and integration health endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sluice_core::TenantId;
use sluice_integrations::{IntegrationError, ServiceHealth};
use tracing::{debug, error, instrument};

use crate::{error::ApiError, state::AppState};

/// Self-health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall verdict.
    pub status: HealthStatus,
    /// When the check ran.
    pub timestamp: DateTime<Utc>,
    /// Per-component results.
    pub checks: HealthChecks,
    /// Service version.
    pub version: String,
}

/// Overall service health.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All components up.
    Healthy,
    /// A critical component is down.
    Unhealthy,
}

/// Component check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Database connectivity.
    pub database: ComponentHealth,
}

/// One component's check outcome.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Component verdict.
    pub status: ComponentStatus,
    /// Failure detail, when down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Check round-trip time.
    pub response_time_ms: u64,
}

/// Component-level verdict.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component responded.
    Up,
    /// Component failed the check.
    Down,
}

/// Primary health endpoint: checks database connectivity.
///
/// Returns 503 with the same structured body when unhealthy, so
/// orchestrators and humans read one shape.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    debug!("performing health check");

    let timestamp = DateTime::<Utc>::from(state.clock.now_system());
    let started = state.clock.now();
    let db_result = state.store.ping().await;
    let elapsed = state.clock.now().saturating_duration_since(started);

    let database = match db_result {
        Ok(()) => ComponentHealth {
            status: ComponentStatus::Up,
            message: None,
            response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        },
        Err(e) => {
            error!(error = %e, "database health check failed");
            ComponentHealth {
                status: ComponentStatus::Down,
                message: Some(e.to_string()),
                response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            }
        },
    };

    let (status, http_status) = match database.status {
        ComponentStatus::Up => (HealthStatus::Healthy, StatusCode::OK),
        ComponentStatus::Down => (HealthStatus::Unhealthy, StatusCode::SERVICE_UNAVAILABLE),
    };

    let body = HealthResponse {
        status,
        timestamp,
        checks: HealthChecks { database },
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (http_status, Json(body)).into_response()
}

/// Liveness endpoint with no external dependencies.
pub async fn liveness_check() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive" }))).into_response()
}

/// Tenant scoping for integration health probes.
#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    /// Tenant the probe is recorded against.
    pub tenant_id: String,
}

/// Probes one integrated service.
#[instrument(name = "integration_health", skip(state, query), fields(tenant_id = %query.tenant_id))]
pub async fn integration_health(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<ServiceHealth>, ApiError> {
    let tenant_id = TenantId::new(query.tenant_id);
    let health = state
        .health_monitor
        .check_service(&tenant_id, &service)
        .await
        .map_err(map_probe_error)?;
    Ok(Json(health))
}

/// Probes every integrated service.
#[instrument(name = "integrations_health", skip(state, query), fields(tenant_id = %query.tenant_id))]
pub async fn integrations_health(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Vec<ServiceHealth>>, ApiError> {
    let tenant_id = TenantId::new(query.tenant_id);
    let results = state.health_monitor.check_all(&tenant_id).await.map_err(map_probe_error)?;
    Ok(Json(results))
}

fn map_probe_error(e: IntegrationError) -> ApiError {
    match e {
        IntegrationError::UnknownService(name) => {
            ApiError::NotFound(format!("service {name}"))
        },
        other => ApiError::internal(other.to_string()),
    }
}
