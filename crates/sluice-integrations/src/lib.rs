//! Integration reliability layer for Sluice.
//!
//! Connects ingested webhook events to external services:
//!
//! ```text
//!   DispatchQueue ──> DispatchEngine workers ──> WebhookDispatcher
//!                                                     │
//!                                    HandlerRegistry ─┤ (source, event_type)
//!                                                     ▼
//!                                   ServiceRegistry typed clients
//!                                                     │
//!                                   CircuitBreakerManager + reqwest
//! ```
//!
//! Every outbound call passes through a per-service circuit breaker, and
//! the dispatcher bounds in-process retries with exponential backoff. The
//! health monitor reuses the same clients to probe services and persist
//! per-tenant status snapshots.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit;
pub mod client;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod health;
pub mod retry;
pub mod services;
pub mod storage;

pub use circuit::{CircuitBreakerManager, CircuitConfig};
pub use client::{ClientConfig, ServiceClient};
pub use dispatcher::WebhookDispatcher;
pub use engine::{DispatchConfig, DispatchEngine, DispatchQueue, EngineStats};
pub use error::{IntegrationError, Result};
pub use handlers::HandlerRegistry;
pub use health::{HealthMonitor, ServiceHealth};
pub use retry::RetryPolicy;
pub use services::{IntegrationEndpoints, ServiceRegistry};
pub use storage::{DispatchStore, PostgresDispatchStore, StatusStore};

/// Default number of dispatch workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;
/// Default bounded queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
/// Default events claimed per idle poll.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Default outbound request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
