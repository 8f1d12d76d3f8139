//! Active health probing of integrated services.
//!
//! Probes each service's `/health` endpoint through the resilient client,
//! so probe outcomes feed the same circuit breakers as webhook delivery,
//! and persists per-tenant snapshots for the status API.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sluice_core::{CircuitState, Clock, IntegrationHealth, TenantId, WebhookSource};
use tracing::{debug, warn};

use crate::{
    circuit::CircuitBreakerManager,
    error::{IntegrationError, Result},
    services::ServiceRegistry,
    storage::StatusStore,
};

/// Outcome of one health probe, shaped for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    /// Service that was probed.
    pub service: String,
    /// Probe verdict.
    pub status: IntegrationHealth,
    /// Breaker state for the service at probe time.
    pub circuit_state: CircuitState,
    /// Round-trip time of a successful probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<i32>,
    /// Error message of a failed probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the probe ran.
    pub checked_at: DateTime<Utc>,
}

/// Probes integrated services and records per-tenant status snapshots.
pub struct HealthMonitor {
    services: Arc<ServiceRegistry>,
    store: Arc<dyn StatusStore>,
    breaker: Arc<CircuitBreakerManager>,
    clock: Arc<dyn Clock>,
}

impl HealthMonitor {
    /// Creates a monitor over the service registry.
    pub fn new(
        services: Arc<ServiceRegistry>,
        store: Arc<dyn StatusStore>,
        breaker: Arc<CircuitBreakerManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { services, store, breaker, clock }
    }

    /// Probes one service on behalf of a tenant and records the outcome.
    ///
    /// An unknown service name is the caller's error; probe failures are
    /// not — they come back as a `Down` snapshot.
    pub async fn check_service(&self, tenant_id: &TenantId, service: &str) -> Result<ServiceHealth> {
        let client = self
            .services
            .client(service)
            .ok_or_else(|| IntegrationError::unknown_service(service))?;

        let started = self.clock.now();
        let checked_at = DateTime::<Utc>::from(self.clock.now_system());
        let probe = client.get("/health").await;
        let elapsed = self.clock.now().saturating_duration_since(started);
        let response_time_ms =
            i32::try_from(elapsed.as_millis()).unwrap_or(i32::MAX);

        match probe {
            Ok(_) => {
                let circuit_state = self.breaker.state(service).await;
                self.store
                    .record_probe_success(
                        tenant_id.clone(),
                        service.to_string(),
                        checked_at,
                        response_time_ms,
                        circuit_state,
                    )
                    .await?;
                debug!(service, response_time_ms, "health probe succeeded");
                Ok(ServiceHealth {
                    service: service.to_string(),
                    status: IntegrationHealth::Healthy,
                    circuit_state,
                    response_time_ms: Some(response_time_ms),
                    last_error: None,
                    checked_at,
                })
            },
            Err(e) => {
                warn!(service, error = %e, "health probe failed");
                self.store
                    .record_probe_failure(
                        tenant_id.clone(),
                        service.to_string(),
                        checked_at,
                        e.to_string(),
                    )
                    .await?;
                // The failure snapshot is recorded with an open breaker;
                // the response reports the same state.
                Ok(ServiceHealth {
                    service: service.to_string(),
                    status: IntegrationHealth::Down,
                    circuit_state: CircuitState::Open,
                    response_time_ms: None,
                    last_error: Some(e.to_string()),
                    checked_at,
                })
            },
        }
    }

    /// Probes every integrated service for one tenant.
    pub async fn check_all(&self, tenant_id: &TenantId) -> Result<Vec<ServiceHealth>> {
        let mut results = Vec::with_capacity(WebhookSource::ALL.len());
        for source in WebhookSource::ALL {
            results.push(self.check_service(tenant_id, source.as_str()).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sluice_core::TestClock;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::{
        circuit::CircuitConfig,
        client::ClientConfig,
        services::IntegrationEndpoints,
        storage::mock::MockStore,
    };

    async fn monitor(server: &MockServer, store: Arc<MockStore>) -> HealthMonitor {
        let clock = Arc::new(TestClock::new());
        let breaker =
            Arc::new(CircuitBreakerManager::new(CircuitConfig::default(), clock.clone()));
        let endpoints = IntegrationEndpoints {
            user_service_url: server.uri(),
            payment_service_url: server.uri(),
            communication_service_url: server.uri(),
        };
        let config = ClientConfig { timeout: Duration::from_secs(2), ..Default::default() };
        let services = Arc::new(
            ServiceRegistry::new(&endpoints, &config, breaker.clone()).expect("registry builds"),
        );
        HealthMonitor::new(services, store, breaker, clock)
    }

    #[tokio::test]
    async fn healthy_probe_records_success_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let store = Arc::new(MockStore::new());
        let monitor = monitor(&server, store.clone()).await;
        let tenant = TenantId::new("tenant_acme");

        let health = monitor.check_service(&tenant, "user_service").await.unwrap();
        assert_eq!(health.status, IntegrationHealth::Healthy);
        assert_eq!(health.circuit_state, CircuitState::Closed);
        assert!(health.response_time_ms.is_some());

        let snapshot = store.status(&tenant, "user_service").await.unwrap();
        assert_eq!(snapshot.status, IntegrationHealth::Healthy);
        assert_eq!(snapshot.success_count, 1);
        assert_eq!(snapshot.error_count, 0);
    }

    #[tokio::test]
    async fn failing_probe_records_down_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = Arc::new(MockStore::new());
        let monitor = monitor(&server, store.clone()).await;
        let tenant = TenantId::new("tenant_acme");

        let health = monitor.check_service(&tenant, "payment_service").await.unwrap();
        assert_eq!(health.status, IntegrationHealth::Down);
        // One failure is below the breaker threshold, but the reported
        // state matches the stored snapshot.
        assert_eq!(health.circuit_state, CircuitState::Open);
        assert!(health.last_error.unwrap().contains("503"));

        let snapshot = store.status(&tenant, "payment_service").await.unwrap();
        assert_eq!(snapshot.status, IntegrationHealth::Down);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.circuit_breaker_state, CircuitState::Open);
    }

    #[tokio::test]
    async fn unknown_service_is_rejected() {
        let server = MockServer::start().await;
        let store = Arc::new(MockStore::new());
        let monitor = monitor(&server, store).await;

        let err = monitor
            .check_service(&TenantId::new("tenant_acme"), "ledger_service")
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::UnknownService(_)));
    }

    #[tokio::test]
    async fn check_all_probes_every_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = Arc::new(MockStore::new());
        let monitor = monitor(&server, store.clone()).await;
        let tenant = TenantId::new("tenant_acme");

        let results = monitor.check_all(&tenant).await.unwrap();
        assert_eq!(results.len(), 3);
        for service in ["user_service", "payment_service", "communication_service"] {
            assert!(store.status(&tenant, service).await.is_some());
        }
    }
}
