//! Repository for per-tenant integration health snapshots.
//!
//! One row per `(tenant, service)` pair, maintained by upsert so the
//! counters increment in SQL rather than read-modify-write in Rust.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{CircuitState, IntegrationStatus, TenantId},
};

/// Data access for the `integration_status` table.
pub struct IntegrationStatusRepository {
    pool: PgPool,
}

impl IntegrationStatusRepository {
    /// Creates the repository over a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records a successful probe: status healthy, success count bumped,
    /// and the breaker's actual state captured.
    pub async fn record_success(
        &self,
        tenant_id: &TenantId,
        service_name: &str,
        checked_at: DateTime<Utc>,
        response_time_ms: i32,
        circuit_state: CircuitState,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO integration_status
                (tenant_id, service_name, status, last_check, response_time_ms,
                 error_count, success_count, circuit_breaker_state, last_error)
            VALUES ($1, $2, 'healthy', $3, $4, 0, 1, $5, NULL)
            ON CONFLICT (tenant_id, service_name) DO UPDATE SET
                status = 'healthy',
                last_check = EXCLUDED.last_check,
                response_time_ms = EXCLUDED.response_time_ms,
                success_count = integration_status.success_count + 1,
                circuit_breaker_state = EXCLUDED.circuit_breaker_state,
                last_error = NULL
            "#,
        )
        .bind(tenant_id.clone())
        .bind(service_name)
        .bind(checked_at)
        .bind(response_time_ms)
        .bind(circuit_state)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records a failed probe: status down, error count bumped, and the
    /// breaker recorded as open.
    pub async fn record_failure(
        &self,
        tenant_id: &TenantId,
        service_name: &str,
        checked_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO integration_status
                (tenant_id, service_name, status, last_check, response_time_ms,
                 error_count, success_count, circuit_breaker_state, last_error)
            VALUES ($1, $2, 'down', $3, NULL, 1, 0, 'open', $4)
            ON CONFLICT (tenant_id, service_name) DO UPDATE SET
                status = 'down',
                last_check = EXCLUDED.last_check,
                response_time_ms = NULL,
                error_count = integration_status.error_count + 1,
                circuit_breaker_state = 'open',
                last_error = EXCLUDED.last_error
            "#,
        )
        .bind(tenant_id.clone())
        .bind(service_name)
        .bind(checked_at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetches the snapshot for one `(tenant, service)` pair.
    pub async fn find(
        &self,
        tenant_id: &TenantId,
        service_name: &str,
    ) -> Result<Option<IntegrationStatus>> {
        let status = sqlx::query_as::<_, IntegrationStatus>(
            "SELECT * FROM integration_status WHERE tenant_id = $1 AND service_name = $2",
        )
        .bind(tenant_id.clone())
        .bind(service_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }

    /// Lists all snapshots for a tenant.
    pub async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<IntegrationStatus>> {
        let statuses = sqlx::query_as::<_, IntegrationStatus>(
            "SELECT * FROM integration_status WHERE tenant_id = $1 ORDER BY service_name",
        )
        .bind(tenant_id.clone())
        .fetch_all(&self.pool)
        .await?;
        Ok(statuses)
    }
}
