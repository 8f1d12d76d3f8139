//! Webhook event dispatch pipeline.
//!
//! Claim, route, deliver with a bounded retry budget, record the terminal
//! state. Delivery failures are absorbed into the event record; only
//! persistence failures propagate to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sluice_core::{Clock, EventId, WebhookEvent};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    error::{IntegrationError, Result},
    handlers::HandlerRegistry,
    retry::RetryPolicy,
    storage::DispatchStore,
};

/// Delivers claimed events to external services via the handler registry.
pub struct WebhookDispatcher {
    store: Arc<dyn DispatchStore>,
    registry: Arc<HandlerRegistry>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl WebhookDispatcher {
    /// Creates a dispatcher over the given store and routing table.
    pub fn new(
        store: Arc<dyn DispatchStore>,
        registry: Arc<HandlerRegistry>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, registry, retry, clock }
    }

    /// Claims and processes one event end to end.
    ///
    /// A lost claim (another worker got there first, or the event is
    /// already terminal) is a quiet no-op. Store errors are fatal and
    /// surface to the caller; delivery errors do not — they are recorded
    /// on the event itself.
    pub async fn process_event(&self, event_id: EventId) -> Result<()> {
        if !self.store.claim_for_processing(event_id).await? {
            debug!(event_id = %event_id, "event not claimable, skipping");
            return Ok(());
        }

        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or_else(|| IntegrationError::storage(format!("claimed event {event_id} not found")))?;

        self.deliver_claimed(event).await
    }

    /// Processes an event that is already in the processing state.
    ///
    /// Used by workers for batch-claimed events, where the claim update
    /// already happened in the store.
    pub async fn deliver_claimed(&self, event: WebhookEvent) -> Result<()> {
        let span = info_span!(
            "dispatch_event",
            event_id = %event.id,
            tenant_id = %event.tenant_id,
            source = %event.source,
            event_type = %event.event_type,
        );

        async {
            let Some(handler) = self.registry.route(&event.source, &event.event_type) else {
                let err = IntegrationError::unroutable(&event.source, &event.event_type);
                warn!(error = %err, "event is unroutable, failing without delivery");
                self.store
                    .mark_failed(event.id, err.to_string(), event.retry_count + 1)
                    .await?;
                return Ok(());
            };

            let mut attempt = 1u32;
            loop {
                match handler(event.clone()).await {
                    Ok(()) => {
                        let processed_at = DateTime::<Utc>::from(self.clock.now_system());
                        self.store.mark_completed(event.id, processed_at).await?;
                        info!(attempt, "webhook event delivered");
                        return Ok(());
                    },
                    Err(e) if e.is_retryable() && self.retry.should_retry(attempt) => {
                        let delay = self.retry.delay_for(attempt);
                        warn!(
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %e,
                            "delivery failed, backing off before retry"
                        );
                        self.clock.sleep(delay).await;
                        attempt += 1;
                    },
                    Err(e) => {
                        error!(attempt, error = %e, "delivery failed permanently");
                        self.store
                            .mark_failed(event.id, e.to_string(), event.retry_count + 1)
                            .await?;
                        return Ok(());
                    },
                }
            }
        }
        .instrument(span)
        .await
    }
}
