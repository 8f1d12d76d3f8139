//! Domain models for webhook ingestion and integration health tracking.
//!
//! Events flow through a strict lifecycle: `pending -> processing ->
//! completed | failed`. Event identity is deterministic, derived from the
//! upstream `(source, event_id)` pair, so duplicate deliveries from an
//! external service collapse onto a single record.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default advisory retry budget for ingested events.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Unique identifier for a webhook event.
///
/// Derived deterministically from the source service and the upstream
/// event id, so the same upstream event always maps to the same record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, PartialOrd, Ord,
)]
#[sqlx(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Derives the event id from the upstream `(source, event_id)` pair.
    ///
    /// Uses UUIDv5 over a fixed namespace, so derivation is stable across
    /// processes and restarts.
    pub fn from_source(source: &str, source_event_id: &str) -> Self {
        let name = format!("sluice:{source}:{source_event_id}");
        Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a tenant.
///
/// Tenants are provisioned by the surrounding platform with opaque string
/// ids, carried through webhook payloads and headers unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    /// Creates a tenant id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Persisted and waiting for a dispatch worker.
    Pending,
    /// Claimed by a worker; delivery in progress.
    Processing,
    /// Handler succeeded; `processed_at` is set.
    Completed,
    /// Handler failed or was unroutable; `error_message` is set.
    Failed,
}

impl EventStatus {
    /// Returns the canonical database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the event has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for EventStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for EventStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for EventStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let text = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        text.parse().map_err(Into::into)
    }
}

/// Circuit breaker state for an external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests fail fast without reaching the service.
    Open,
    /// One trial request is permitted to test recovery.
    HalfOpen,
}

impl CircuitState {
    /// Returns the canonical database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "closed" => Ok(Self::Closed),
            "open" => Ok(Self::Open),
            "half_open" => Ok(Self::HalfOpen),
            other => Err(format!("unknown circuit state: {other}")),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for CircuitState {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for CircuitState {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for CircuitState {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let text = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        text.parse().map_err(Into::into)
    }
}

/// Observed health of an external integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationHealth {
    /// Last probe succeeded.
    Healthy,
    /// Probes succeed but with degraded behavior.
    Degraded,
    /// Last probe failed.
    Down,
}

impl IntegrationHealth {
    /// Returns the canonical database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for IntegrationHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationHealth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "down" => Ok(Self::Down),
            other => Err(format!("unknown integration health: {other}")),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for IntegrationHealth {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for IntegrationHealth {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for IntegrationHealth {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let text = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        text.parse().map_err(Into::into)
    }
}

/// External services that push webhooks into Sluice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookSource {
    /// HR / identity provider.
    UserService,
    /// Billing and subscription provider.
    PaymentService,
    /// Email and notification provider.
    CommunicationService,
}

impl WebhookSource {
    /// All known sources, in registration order.
    pub const ALL: [Self; 3] = [Self::UserService, Self::PaymentService, Self::CommunicationService];

    /// Canonical service name used in records and breaker keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserService => "user_service",
            Self::PaymentService => "payment_service",
            Self::CommunicationService => "communication_service",
        }
    }

    /// Parses the hyphenated URL path segment, e.g. `user-service`.
    pub fn from_path_slug(slug: &str) -> Option<Self> {
        match slug {
            "user-service" => Some(Self::UserService),
            "payment-service" => Some(Self::PaymentService),
            "communication-service" => Some(Self::CommunicationService),
            _ => None,
        }
    }
}

impl fmt::Display for WebhookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_service" => Ok(Self::UserService),
            "payment_service" => Ok(Self::PaymentService),
            "communication_service" => Ok(Self::CommunicationService),
            other => Err(format!("unknown webhook source: {other}")),
        }
    }
}

/// A webhook event received from an external service.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookEvent {
    /// Deterministic id derived from `(source, event_id)`.
    pub id: EventId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Originating service name, e.g. `user_service`.
    pub source: String,
    /// Event type within the source, e.g. `user.created`.
    pub event_type: String,
    /// Upstream event identifier as sent by the source.
    pub event_id: String,
    /// Event payload.
    pub data: serde_json::Value,
    /// Optional source-supplied metadata.
    pub metadata: Option<serde_json::Value>,
    /// Current lifecycle state.
    pub status: EventStatus,
    /// Number of failed deliveries plus operator retries.
    pub retry_count: i32,
    /// Advisory retry budget; not enforced automatically.
    pub max_retries: i32,
    /// Set when the event completes.
    pub processed_at: Option<DateTime<Utc>>,
    /// Set when the event fails.
    pub error_message: Option<String>,
    /// Ingestion timestamp.
    pub created_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// Builds a fresh pending event from ingested webhook fields.
    pub fn new(
        tenant_id: TenantId,
        source: WebhookSource,
        event_type: impl Into<String>,
        source_event_id: impl Into<String>,
        data: serde_json::Value,
        metadata: Option<serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let event_type = event_type.into();
        let source_event_id = source_event_id.into();
        Self {
            id: EventId::from_source(source.as_str(), &source_event_id),
            tenant_id,
            source: source.as_str().to_string(),
            event_type,
            event_id: source_event_id,
            data,
            metadata,
            status: EventStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            processed_at: None,
            error_message: None,
            created_at,
        }
    }
}

/// A tenant of the surrounding platform.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    /// Platform-assigned tenant id.
    pub id: TenantId,
    /// Display name.
    pub name: String,
    /// Primary domain.
    pub domain: String,
    /// Subscription plan name.
    pub plan: String,
    /// Inactive tenants reject all webhook traffic.
    pub is_active: bool,
    /// Provisioning timestamp.
    pub created_at: DateTime<Utc>,
}

/// Persisted health snapshot for one `(tenant, service)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IntegrationStatus {
    /// Row id.
    pub id: i64,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// External service name.
    pub service_name: String,
    /// Health as of the last probe.
    pub status: IntegrationHealth,
    /// Timestamp of the last probe.
    pub last_check: DateTime<Utc>,
    /// Probe round-trip time, when the probe succeeded.
    pub response_time_ms: Option<i32>,
    /// Cumulative failed probe count.
    pub error_count: i32,
    /// Cumulative successful probe count.
    pub success_count: i32,
    /// Breaker state recorded at probe time.
    pub circuit_breaker_state: CircuitState,
    /// Message from the most recent failed probe.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_is_deterministic_for_same_source_pair() {
        let a = EventId::from_source("user_service", "evt_42");
        let b = EventId::from_source("user_service", "evt_42");
        assert_eq!(a, b);
    }

    #[test]
    fn event_id_differs_across_sources() {
        let a = EventId::from_source("user_service", "evt_42");
        let b = EventId::from_source("payment_service", "evt_42");
        assert_ne!(a, b);
    }

    #[test]
    fn event_status_round_trips_through_text() {
        for status in
            [EventStatus::Pending, EventStatus::Processing, EventStatus::Completed, EventStatus::Failed]
        {
            assert_eq!(status.as_str().parse::<EventStatus>(), Ok(status));
        }
    }

    #[test]
    fn terminal_states_are_completed_and_failed() {
        assert!(EventStatus::Completed.is_terminal());
        assert!(EventStatus::Failed.is_terminal());
        assert!(!EventStatus::Pending.is_terminal());
        assert!(!EventStatus::Processing.is_terminal());
    }

    #[test]
    fn source_slug_parsing_matches_routes() {
        assert_eq!(WebhookSource::from_path_slug("user-service"), Some(WebhookSource::UserService));
        assert_eq!(
            WebhookSource::from_path_slug("payment-service"),
            Some(WebhookSource::PaymentService)
        );
        assert_eq!(WebhookSource::from_path_slug("billing"), None);
    }

    #[test]
    fn new_event_starts_pending_with_derived_id() {
        let event = WebhookEvent::new(
            TenantId::new("tenant_acme"),
            WebhookSource::UserService,
            "user.created",
            "evt_1",
            serde_json::json!({"user_id": "u_1"}),
            None,
            Utc::now(),
        );
        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(event.id, EventId::from_source("user_service", "evt_1"));
        assert_eq!(event.retry_count, 0);
        assert_eq!(event.max_retries, DEFAULT_MAX_RETRIES);
    }
}
