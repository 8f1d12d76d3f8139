//! Routing table from `(source, event_type)` to delivery handlers.
//!
//! Dispatch is a map lookup, not a chain of source conditionals: adding a
//! new event type means registering one more entry, and an event with no
//! entry is non-retryable by definition.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use sluice_core::WebhookEvent;

use crate::{error::Result, services::ServiceRegistry};

/// Boxed future returned by a handler invocation.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// A registered delivery handler.
pub type Handler = Arc<dyn Fn(WebhookEvent) -> HandlerFuture + Send + Sync>;

/// Immutable routing table built at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(String, String), Handler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one `(source, event_type)` pair.
    ///
    /// Later registrations replace earlier ones for the same key.
    pub fn register(&mut self, source: &str, event_type: &str, handler: Handler) {
        self.handlers.insert((source.to_string(), event_type.to_string()), handler);
    }

    /// Registers an async closure as a handler.
    pub fn register_fn<F, Fut>(&mut self, source: &str, event_type: &str, f: F)
    where
        F: Fn(WebhookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register(source, event_type, Arc::new(move |event| Box::pin(f(event))));
    }

    /// Looks up the handler for an event's routing key.
    pub fn route(&self, source: &str, event_type: &str) -> Option<Handler> {
        self.handlers.get(&(source.to_string(), event_type.to_string())).cloned()
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Builds the production routing table over the service registry.
    pub fn with_default_routes(services: &ServiceRegistry) -> Self {
        let mut registry = Self::new();

        let user = services.user.clone();
        registry.register_fn("user_service", "user.created", move |event| {
            let user = user.clone();
            async move { user.create_user(&event.data).await.map(|_| ()) }
        });

        let user = services.user.clone();
        registry.register_fn("user_service", "user.updated", move |event| {
            let user = user.clone();
            async move { user.update_user(&event.data).await.map(|_| ()) }
        });

        let user = services.user.clone();
        registry.register_fn("user_service", "user.deleted", move |event| {
            let user = user.clone();
            async move { user.delete_user(&event.data).await.map(|_| ()) }
        });

        let payment = services.payment.clone();
        registry.register_fn("payment_service", "subscription.created", move |event| {
            let payment = payment.clone();
            async move { payment.create_subscription(&event.data).await.map(|_| ()) }
        });

        let payment = services.payment.clone();
        registry.register_fn("payment_service", "payment.failed", move |event| {
            let payment = payment.clone();
            async move { payment.process_payment(&event.data).await.map(|_| ()) }
        });

        let communication = services.communication.clone();
        registry.register_fn("communication_service", "message.delivered", move |event| {
            let communication = communication.clone();
            async move { communication.delivery_status(&event.data).await.map(|_| ()) }
        });

        let communication = services.communication.clone();
        registry.register_fn("communication_service", "message.bounced", move |event| {
            let communication = communication.clone();
            async move { communication.delivery_status(&event.data).await.map(|_| ()) }
        });

        registry
    }
}
