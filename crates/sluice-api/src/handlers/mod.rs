//! HTTP request handlers.
//!
//! Grouped by surface:
//! - `ingest` — public webhook ingestion.
//! - `events` — operator event listing, inspection, and retry.
//! - `health` — service self-health and integration health probes.

pub mod events;
pub mod health;
pub mod ingest;

pub use events::{get_event, list_events, retry_event};
pub use health::{health_check, integration_health, integrations_health, liveness_check};
pub use ingest::ingest_webhook;
