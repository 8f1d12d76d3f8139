//! Repository for tenant records.
//!
//! Tenants are provisioned by the surrounding platform; Sluice only reads
//! them to authorize ingestion.

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Tenant, TenantId},
};

/// Data access for the `tenants` table.
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    /// Creates the repository over a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetches a tenant by id.
    pub async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT id, name, domain, plan, is_active, created_at FROM tenants WHERE id = $1",
        )
        .bind(id.clone())
        .fetch_optional(&self.pool)
        .await?;
        Ok(tenant)
    }

    /// Whether a tenant exists and accepts webhook traffic.
    pub async fn is_active(&self, id: &TenantId) -> Result<bool> {
        let active = sqlx::query_scalar::<_, bool>(
            "SELECT is_active FROM tenants WHERE id = $1",
        )
        .bind(id.clone())
        .fetch_optional(&self.pool)
        .await?;
        Ok(active.unwrap_or(false))
    }
}
