//! PostgreSQL persistence layer.
//!
//! Repository-per-table structure over a shared connection pool. All
//! queries use the runtime sqlx API; schema creation lives in the binary's
//! migration step.

pub mod integration_status;
pub mod tenants;
pub mod webhook_events;

use std::sync::Arc;

use sqlx::PgPool;

use crate::error::Result;

/// Aggregate of all repositories sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    pool: PgPool,
    /// Webhook event lifecycle operations.
    pub webhook_events: Arc<webhook_events::WebhookEventRepository>,
    /// Tenant lookups.
    pub tenants: Arc<tenants::TenantRepository>,
    /// Integration health snapshots.
    pub integration_status: Arc<integration_status::IntegrationStatusRepository>,
}

impl Storage {
    /// Creates the repository aggregate over a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            webhook_events: Arc::new(webhook_events::WebhookEventRepository::new(pool.clone())),
            tenants: Arc::new(tenants::TenantRepository::new(pool.clone())),
            integration_status: Arc::new(integration_status::IntegrationStatusRepository::new(
                pool.clone(),
            )),
            pool,
        }
    }

    /// Verifies database connectivity with a lightweight query.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
