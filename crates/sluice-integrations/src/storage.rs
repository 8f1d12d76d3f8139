//! Storage abstraction for dispatch and health monitoring.
//!
//! Trait-based seams over the persistence layer so dispatcher, engine,
//! and health monitor logic is testable without a database. Production
//! wraps the concrete `sluice_core::storage::Storage`; tests use the
//! in-memory mock below.

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use sluice_core::{
    error::CoreError,
    models::{CircuitState, EventId, IntegrationStatus, TenantId, WebhookEvent},
};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, CoreError>> + Send + 'a>>;

/// Event lifecycle operations the dispatcher and engine require.
pub trait DispatchStore: Send + Sync + 'static {
    /// Atomically claims one pending event. `false` when the event is
    /// missing, already claimed, or terminal.
    fn claim_for_processing(&self, id: EventId) -> StoreFuture<'_, bool>;

    /// Claims up to `batch_size` pending events, oldest first. Returned
    /// events are already marked processing.
    fn claim_pending_batch(&self, batch_size: usize) -> StoreFuture<'_, Vec<WebhookEvent>>;

    /// Fetches one event.
    fn find_event(&self, id: EventId) -> StoreFuture<'_, Option<WebhookEvent>>;

    /// Marks an event completed.
    fn mark_completed(&self, id: EventId, processed_at: DateTime<Utc>) -> StoreFuture<'_, ()>;

    /// Marks an event failed with the delivery error.
    fn mark_failed(
        &self,
        id: EventId,
        error_message: String,
        retry_count: i32,
    ) -> StoreFuture<'_, ()>;
}

/// Integration status snapshot operations the health monitor requires.
pub trait StatusStore: Send + Sync + 'static {
    /// Upserts a healthy snapshot for `(tenant, service)`.
    fn record_probe_success(
        &self,
        tenant_id: TenantId,
        service: String,
        checked_at: DateTime<Utc>,
        response_time_ms: i32,
        circuit_state: CircuitState,
    ) -> StoreFuture<'_, ()>;

    /// Upserts a down snapshot for `(tenant, service)`.
    fn record_probe_failure(
        &self,
        tenant_id: TenantId,
        service: String,
        checked_at: DateTime<Utc>,
        error: String,
    ) -> StoreFuture<'_, ()>;

    /// Fetches the snapshot for one `(tenant, service)` pair.
    fn find_status(
        &self,
        tenant_id: TenantId,
        service: String,
    ) -> StoreFuture<'_, Option<IntegrationStatus>>;
}

/// Production store backed by PostgreSQL repositories.
pub struct PostgresDispatchStore {
    storage: Arc<sluice_core::storage::Storage>,
}

impl PostgresDispatchStore {
    /// Wraps the repository aggregate.
    pub fn new(storage: Arc<sluice_core::storage::Storage>) -> Self {
        Self { storage }
    }
}

impl DispatchStore for PostgresDispatchStore {
    fn claim_for_processing(&self, id: EventId) -> StoreFuture<'_, bool> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_events.claim_for_processing(id).await })
    }

    fn claim_pending_batch(&self, batch_size: usize) -> StoreFuture<'_, Vec<WebhookEvent>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage
                .webhook_events
                .claim_pending_batch(i64::try_from(batch_size).unwrap_or(i64::MAX))
                .await
        })
    }

    fn find_event(&self, id: EventId) -> StoreFuture<'_, Option<WebhookEvent>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_events.find_by_id(id).await })
    }

    fn mark_completed(&self, id: EventId, processed_at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_events.mark_completed(id, processed_at).await })
    }

    fn mark_failed(
        &self,
        id: EventId,
        error_message: String,
        retry_count: i32,
    ) -> StoreFuture<'_, ()> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.webhook_events.mark_failed(id, &error_message, retry_count).await
        })
    }
}

impl StatusStore for PostgresDispatchStore {
    fn record_probe_success(
        &self,
        tenant_id: TenantId,
        service: String,
        checked_at: DateTime<Utc>,
        response_time_ms: i32,
        circuit_state: CircuitState,
    ) -> StoreFuture<'_, ()> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage
                .integration_status
                .record_success(&tenant_id, &service, checked_at, response_time_ms, circuit_state)
                .await
        })
    }

    fn record_probe_failure(
        &self,
        tenant_id: TenantId,
        service: String,
        checked_at: DateTime<Utc>,
        error: String,
    ) -> StoreFuture<'_, ()> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.integration_status.record_failure(&tenant_id, &service, checked_at, &error).await
        })
    }

    fn find_status(
        &self,
        tenant_id: TenantId,
        service: String,
    ) -> StoreFuture<'_, Option<IntegrationStatus>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.integration_status.find(&tenant_id, &service).await })
    }
}

pub mod mock {
    //! In-memory store for dispatcher, engine, and health monitor tests.

    use std::collections::HashMap;

    use sluice_core::models::{EventStatus, IntegrationHealth};
    use tokio::sync::RwLock;

    use super::*;

    /// Deterministic in-memory implementation of both store traits.
    ///
    /// Supports injecting a claim error to exercise the fatal persistence
    /// path.
    #[derive(Default)]
    pub struct MockStore {
        events: RwLock<HashMap<EventId, WebhookEvent>>,
        pending: RwLock<Vec<EventId>>,
        statuses: RwLock<HashMap<(String, String), IntegrationStatus>>,
        claim_error: RwLock<Option<String>>,
    }

    impl MockStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds an event; pending events also join the claimable set.
        pub async fn insert_event(&self, event: WebhookEvent) {
            if event.status == EventStatus::Pending {
                self.pending.write().await.push(event.id);
            }
            self.events.write().await.insert(event.id, event);
        }

        /// Fails the next claim with the given message.
        pub async fn inject_claim_error(&self, message: impl Into<String>) {
            *self.claim_error.write().await = Some(message.into());
        }

        /// Returns a snapshot of one event for assertions.
        pub async fn event(&self, id: EventId) -> Option<WebhookEvent> {
            self.events.read().await.get(&id).cloned()
        }

        /// Returns the stored snapshot for `(tenant, service)`.
        pub async fn status(&self, tenant_id: &TenantId, service: &str) -> Option<IntegrationStatus> {
            self.statuses.read().await.get(&(tenant_id.0.clone(), service.to_string())).cloned()
        }
    }

    impl DispatchStore for MockStore {
        fn claim_for_processing(&self, id: EventId) -> StoreFuture<'_, bool> {
            Box::pin(async move {
                if let Some(message) = self.claim_error.write().await.take() {
                    return Err(CoreError::database(message));
                }
                let mut events = self.events.write().await;
                match events.get_mut(&id) {
                    Some(event) if event.status == EventStatus::Pending => {
                        event.status = EventStatus::Processing;
                        self.pending.write().await.retain(|p| *p != id);
                        Ok(true)
                    },
                    _ => Ok(false),
                }
            })
        }

        fn claim_pending_batch(&self, batch_size: usize) -> StoreFuture<'_, Vec<WebhookEvent>> {
            Box::pin(async move {
                if let Some(message) = self.claim_error.write().await.take() {
                    return Err(CoreError::database(message));
                }
                let mut pending = self.pending.write().await;
                let take = batch_size.min(pending.len());
                let ids: Vec<EventId> = pending.drain(..take).collect();
                drop(pending);

                let mut events = self.events.write().await;
                let mut claimed = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(event) = events.get_mut(&id) {
                        event.status = EventStatus::Processing;
                        claimed.push(event.clone());
                    }
                }
                Ok(claimed)
            })
        }

        fn find_event(&self, id: EventId) -> StoreFuture<'_, Option<WebhookEvent>> {
            Box::pin(async move { Ok(self.events.read().await.get(&id).cloned()) })
        }

        fn mark_completed(&self, id: EventId, processed_at: DateTime<Utc>) -> StoreFuture<'_, ()> {
            Box::pin(async move {
                if let Some(event) = self.events.write().await.get_mut(&id) {
                    event.status = EventStatus::Completed;
                    event.processed_at = Some(processed_at);
                    event.error_message = None;
                }
                Ok(())
            })
        }

        fn mark_failed(
            &self,
            id: EventId,
            error_message: String,
            retry_count: i32,
        ) -> StoreFuture<'_, ()> {
            Box::pin(async move {
                if let Some(event) = self.events.write().await.get_mut(&id) {
                    event.status = EventStatus::Failed;
                    event.error_message = Some(error_message);
                    event.retry_count = retry_count;
                }
                Ok(())
            })
        }
    }

    impl StatusStore for MockStore {
        fn record_probe_success(
            &self,
            tenant_id: TenantId,
            service: String,
            checked_at: DateTime<Utc>,
            response_time_ms: i32,
            circuit_state: CircuitState,
        ) -> StoreFuture<'_, ()> {
            Box::pin(async move {
                let mut statuses = self.statuses.write().await;
                let key = (tenant_id.0.clone(), service.clone());
                let entry = statuses.entry(key).or_insert_with(|| IntegrationStatus {
                    id: 0,
                    tenant_id,
                    service_name: service,
                    status: IntegrationHealth::Healthy,
                    last_check: checked_at,
                    response_time_ms: None,
                    error_count: 0,
                    success_count: 0,
                    circuit_breaker_state: CircuitState::Closed,
                    last_error: None,
                });
                entry.status = IntegrationHealth::Healthy;
                entry.last_check = checked_at;
                entry.response_time_ms = Some(response_time_ms);
                entry.success_count += 1;
                entry.circuit_breaker_state = circuit_state;
                entry.last_error = None;
                Ok(())
            })
        }

        fn record_probe_failure(
            &self,
            tenant_id: TenantId,
            service: String,
            checked_at: DateTime<Utc>,
            error: String,
        ) -> StoreFuture<'_, ()> {
            Box::pin(async move {
                let mut statuses = self.statuses.write().await;
                let key = (tenant_id.0.clone(), service.clone());
                let entry = statuses.entry(key).or_insert_with(|| IntegrationStatus {
                    id: 0,
                    tenant_id,
                    service_name: service,
                    status: IntegrationHealth::Down,
                    last_check: checked_at,
                    response_time_ms: None,
                    error_count: 0,
                    success_count: 0,
                    circuit_breaker_state: CircuitState::Open,
                    last_error: None,
                });
                entry.status = IntegrationHealth::Down;
                entry.last_check = checked_at;
                entry.response_time_ms = None;
                entry.error_count += 1;
                entry.circuit_breaker_state = CircuitState::Open;
                entry.last_error = Some(error);
                Ok(())
            })
        }

        fn find_status(
            &self,
            tenant_id: TenantId,
            service: String,
        ) -> StoreFuture<'_, Option<IntegrationStatus>> {
            Box::pin(async move {
                Ok(self.statuses.read().await.get(&(tenant_id.0, service)).cloned())
            })
        }
    }
}
