//! Repository for webhook event records.
//!
//! Lifecycle transitions are expressed as conditional updates so workers
//! never race: claiming flips `pending -> processing` atomically, and a
//! batch claim uses `FOR UPDATE SKIP LOCKED` so concurrent pollers divide
//! work without blocking each other.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use tracing::debug;

use crate::{
    error::Result,
    models::{EventId, EventStatus, TenantId, WebhookEvent},
};

/// Filters for listing events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Restrict to a lifecycle state.
    pub status: Option<EventStatus>,
    /// Restrict to a source service name.
    pub source: Option<String>,
    /// Page size, capped by the caller.
    pub limit: i64,
    /// Page offset.
    pub offset: i64,
}

/// Data access for the `webhook_events` table.
pub struct WebhookEventRepository {
    pool: PgPool,
}

impl WebhookEventRepository {
    /// Creates the repository over a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new event.
    ///
    /// The deterministic id makes duplicate deliveries a conflict; those
    /// are ignored and reported as `false` so ingestion stays idempotent
    /// without mutating the existing record.
    pub async fn insert(&self, event: &WebhookEvent) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events
                (id, tenant_id, source, event_type, event_id, data, metadata,
                 status, retry_count, max_retries, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(&event.tenant_id)
        .bind(&event.source)
        .bind(&event.event_type)
        .bind(&event.event_id)
        .bind(&event.data)
        .bind(&event.metadata)
        .bind(event.status)
        .bind(event.retry_count)
        .bind(event.max_retries)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically claims one pending event for processing.
    ///
    /// Returns `false` if the event is missing, already claimed, or in a
    /// terminal state.
    pub async fn claim_for_processing(&self, id: EventId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE webhook_events SET status = 'processing' \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Claims up to `batch_size` pending events, oldest first.
    ///
    /// Uses SKIP LOCKED so concurrent workers never contend on the same
    /// rows. Returned events are already in `processing` state.
    pub async fn claim_pending_batch(&self, batch_size: i64) -> Result<Vec<WebhookEvent>> {
        let events = sqlx::query_as::<_, WebhookEvent>(
            r#"
            UPDATE webhook_events SET status = 'processing'
            WHERE id IN (
                SELECT id FROM webhook_events
                WHERE status = 'pending'
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await?;

        debug!(claimed = events.len(), "claimed pending webhook events");
        Ok(events)
    }

    /// Marks an event completed and stamps `processed_at`.
    pub async fn mark_completed(&self, id: EventId, processed_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_events \
             SET status = 'completed', processed_at = $2, error_message = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(processed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks an event failed with the delivery error and updated count.
    pub async fn mark_failed(
        &self,
        id: EventId,
        error_message: &str,
        retry_count: i32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_events \
             SET status = 'failed', error_message = $2, retry_count = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error_message)
        .bind(retry_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns a failed event to the pending state for another attempt.
    ///
    /// Operator-driven: increments `retry_count` and clears the error.
    /// Returns the refreshed record, or `None` when the event is not in
    /// the failed state.
    pub async fn reset_for_retry(&self, id: EventId) -> Result<Option<WebhookEvent>> {
        let event = sqlx::query_as::<_, WebhookEvent>(
            r#"
            UPDATE webhook_events
            SET status = 'pending', error_message = NULL, retry_count = retry_count + 1
            WHERE id = $1 AND status = 'failed'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    /// Fetches one event by id.
    pub async fn find_by_id(&self, id: EventId) -> Result<Option<WebhookEvent>> {
        let event =
            sqlx::query_as::<_, WebhookEvent>("SELECT * FROM webhook_events WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(event)
    }

    /// Lists a tenant's events with optional status/source filters,
    /// newest first.
    pub async fn list(&self, tenant_id: &TenantId, filter: &EventFilter) -> Result<Vec<WebhookEvent>> {
        let mut query =
            QueryBuilder::<sqlx::Postgres>::new("SELECT * FROM webhook_events WHERE tenant_id = ");
        query.push_bind(tenant_id.clone());

        if let Some(status) = filter.status {
            query.push(" AND status = ");
            query.push_bind(status);
        }
        if let Some(source) = &filter.source {
            query.push(" AND source = ");
            query.push_bind(source.clone());
        }

        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(filter.limit.max(1));
        query.push(" OFFSET ");
        query.push_bind(filter.offset.max(0));

        let events = query.build_query_as::<WebhookEvent>().fetch_all(&self.pool).await?;
        Ok(events)
    }

    /// Counts a tenant's events.
    pub async fn count_by_tenant(&self, tenant_id: &TenantId) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM webhook_events WHERE tenant_id = $1")
                .bind(tenant_id.clone())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
