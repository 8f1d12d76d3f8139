//! Core domain types for the Sluice webhook ingestion service.
//!
//! Provides strongly-typed domain primitives, error handling, time
//! abstraction, and PostgreSQL repositories. All other crates depend on
//! these foundational types for type safety and consistency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    CircuitState, EventId, EventStatus, IntegrationHealth, IntegrationStatus, Tenant, TenantId,
    WebhookEvent, WebhookSource,
};
pub use time::{Clock, RealClock, TestClock};
