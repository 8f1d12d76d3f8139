//! Shared application state for HTTP handlers.

use std::{collections::HashMap, sync::Arc, time::Duration};

use sluice_core::{Clock, WebhookSource};
use sluice_integrations::{DispatchQueue, HealthMonitor};

use crate::{config::Config, storage::ApiStore};

/// State injected into every handler.
///
/// Everything is either `Arc`-shared or cheaply cloneable; axum clones
/// the state per request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence seam.
    pub store: Arc<dyn ApiStore>,
    /// Producer side of the dispatch queue.
    pub queue: DispatchQueue,
    /// Integration health probing.
    pub health_monitor: Arc<HealthMonitor>,
    /// Time source for timestamps and latency measurement.
    pub clock: Arc<dyn Clock>,
    /// Operator bearer token; operator routes reject when unset.
    pub admin_token: Option<Arc<str>>,
    /// Per-source webhook signing secrets, keyed by service name.
    pub webhook_secrets: Arc<HashMap<String, String>>,
    /// Inbound request timeout applied by the router.
    pub request_timeout: Duration,
}

impl AppState {
    /// Assembles the state from wired components and configuration.
    pub fn new(
        store: Arc<dyn ApiStore>,
        queue: DispatchQueue,
        health_monitor: Arc<HealthMonitor>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let mut webhook_secrets = HashMap::new();
        for source in WebhookSource::ALL {
            if let Some(secret) = config.webhook_secret(source) {
                webhook_secrets.insert(source.as_str().to_string(), secret.to_string());
            }
        }

        Self {
            store,
            queue,
            health_monitor,
            clock,
            admin_token: config.admin_token.as_deref().map(Arc::from),
            webhook_secrets: Arc::new(webhook_secrets),
            request_timeout: Duration::from_secs(config.request_timeout),
        }
    }

    /// Signing secret for a source's webhooks, if one is configured.
    pub fn webhook_secret(&self, source: WebhookSource) -> Option<&str> {
        self.webhook_secrets.get(source.as_str()).map(String::as_str)
    }
}
