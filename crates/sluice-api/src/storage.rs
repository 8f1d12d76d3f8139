//! Persistence seam for HTTP handlers.
//!
//! Boxed-future trait over the operations handlers need, so routing and
//! handler logic is testable without a database. Production wraps the
//! concrete repositories; tests use the in-memory mock below.

use std::{future::Future, pin::Pin, sync::Arc};

use sluice_core::{
    error::CoreError,
    models::{EventId, Tenant, TenantId, WebhookEvent},
    storage::{webhook_events::EventFilter, Storage},
};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, CoreError>> + Send + 'a>>;

/// Persistence operations the HTTP handlers require.
pub trait ApiStore: Send + Sync + 'static {
    /// Fetches a tenant by id.
    fn find_tenant(&self, id: TenantId) -> StoreFuture<'_, Option<Tenant>>;

    /// Inserts a pending event. `false` when the id already exists.
    fn insert_event(&self, event: WebhookEvent) -> StoreFuture<'_, bool>;

    /// Fetches one event.
    fn find_event(&self, id: EventId) -> StoreFuture<'_, Option<WebhookEvent>>;

    /// Lists a tenant's events, newest first.
    fn list_events(
        &self,
        tenant_id: TenantId,
        filter: EventFilter,
    ) -> StoreFuture<'_, Vec<WebhookEvent>>;

    /// Resets a failed event to pending for another delivery attempt.
    /// `None` when the event is missing or not failed.
    fn reset_event_for_retry(&self, id: EventId) -> StoreFuture<'_, Option<WebhookEvent>>;

    /// Round-trips the underlying database.
    fn ping(&self) -> StoreFuture<'_, ()>;
}

/// Production store backed by the PostgreSQL repositories.
pub struct PostgresApiStore {
    storage: Arc<Storage>,
}

impl PostgresApiStore {
    /// Wraps the repository aggregate.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl ApiStore for PostgresApiStore {
    fn find_tenant(&self, id: TenantId) -> StoreFuture<'_, Option<Tenant>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.tenants.find_by_id(&id).await })
    }

    fn insert_event(&self, event: WebhookEvent) -> StoreFuture<'_, bool> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_events.insert(&event).await })
    }

    fn find_event(&self, id: EventId) -> StoreFuture<'_, Option<WebhookEvent>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_events.find_by_id(id).await })
    }

    fn list_events(
        &self,
        tenant_id: TenantId,
        filter: EventFilter,
    ) -> StoreFuture<'_, Vec<WebhookEvent>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_events.list(&tenant_id, &filter).await })
    }

    fn reset_event_for_retry(&self, id: EventId) -> StoreFuture<'_, Option<WebhookEvent>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_events.reset_for_retry(id).await })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.health_check().await })
    }
}

pub mod mock {
    //! In-memory store for handler and router tests.

    use std::collections::HashMap;

    use sluice_core::models::EventStatus;
    use tokio::sync::RwLock;

    use super::*;

    /// Deterministic in-memory implementation of [`ApiStore`].
    #[derive(Default)]
    pub struct MockApiStore {
        tenants: RwLock<HashMap<String, Tenant>>,
        events: RwLock<HashMap<EventId, WebhookEvent>>,
    }

    impl MockApiStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a tenant.
        pub async fn insert_tenant(&self, tenant: Tenant) {
            self.tenants.write().await.insert(tenant.id.0.clone(), tenant);
        }

        /// Seeds an event in whatever state it carries.
        pub async fn seed_event(&self, event: WebhookEvent) {
            self.events.write().await.insert(event.id, event);
        }

        /// Returns a snapshot of one event for assertions.
        pub async fn event(&self, id: EventId) -> Option<WebhookEvent> {
            self.events.read().await.get(&id).cloned()
        }

        /// Number of stored events.
        pub async fn event_count(&self) -> usize {
            self.events.read().await.len()
        }
    }

    impl ApiStore for MockApiStore {
        fn find_tenant(&self, id: TenantId) -> StoreFuture<'_, Option<Tenant>> {
            Box::pin(async move { Ok(self.tenants.read().await.get(&id.0).cloned()) })
        }

        fn insert_event(&self, event: WebhookEvent) -> StoreFuture<'_, bool> {
            Box::pin(async move {
                let mut events = self.events.write().await;
                if events.contains_key(&event.id) {
                    return Ok(false);
                }
                events.insert(event.id, event);
                Ok(true)
            })
        }

        fn find_event(&self, id: EventId) -> StoreFuture<'_, Option<WebhookEvent>> {
            Box::pin(async move { Ok(self.events.read().await.get(&id).cloned()) })
        }

        fn list_events(
            &self,
            tenant_id: TenantId,
            filter: EventFilter,
        ) -> StoreFuture<'_, Vec<WebhookEvent>> {
            Box::pin(async move {
                let events = self.events.read().await;
                let mut matched: Vec<WebhookEvent> = events
                    .values()
                    .filter(|e| e.tenant_id == tenant_id)
                    .filter(|e| filter.status.map_or(true, |s| e.status == s))
                    .filter(|e| filter.source.as_deref().map_or(true, |s| e.source == s))
                    .cloned()
                    .collect();
                matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

                let offset = usize::try_from(filter.offset).unwrap_or(0);
                let limit = usize::try_from(filter.limit).unwrap_or(usize::MAX);
                Ok(matched.into_iter().skip(offset).take(limit).collect())
            })
        }

        fn reset_event_for_retry(&self, id: EventId) -> StoreFuture<'_, Option<WebhookEvent>> {
            Box::pin(async move {
                let mut events = self.events.write().await;
                match events.get_mut(&id) {
                    Some(event) if event.status == EventStatus::Failed => {
                        event.status = EventStatus::Pending;
                        event.retry_count += 1;
                        event.error_message = None;
                        Ok(Some(event.clone()))
                    },
                    _ => Ok(None),
                }
            })
        }

        fn ping(&self) -> StoreFuture<'_, ()> {
            Box::pin(async move { Ok(()) })
        }
    }
}
