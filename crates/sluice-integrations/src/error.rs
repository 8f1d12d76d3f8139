//! Error taxonomy for outbound integration calls and dispatch.

use std::time::Duration;

use thiserror::Error;

/// Result alias defaulting to [`IntegrationError`].
pub type Result<T, E = IntegrationError> = std::result::Result<T, E>;

/// Errors produced while delivering events to external services.
#[derive(Debug, Clone, Error)]
pub enum IntegrationError {
    /// Circuit breaker rejected the call before any I/O.
    #[error("circuit breaker open for service {service}")]
    CircuitOpen {
        /// Service whose breaker is open.
        service: String,
    },

    /// Request exceeded the configured timeout.
    #[error("request to {service} timed out after {seconds}s")]
    Timeout {
        /// Target service.
        service: String,
        /// Configured timeout in seconds.
        seconds: u64,
    },

    /// Connection-level failure (DNS, refused, reset).
    #[error("transport error calling {service}: {message}")]
    Transport {
        /// Target service.
        service: String,
        /// Underlying failure description.
        message: String,
    },

    /// Service responded with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    HttpStatus {
        /// Target service.
        service: String,
        /// HTTP status code.
        status: u16,
        /// Response body, truncated for diagnostics.
        body: String,
    },

    /// Service name has no registered client.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// No handler registered for the event's `(source, event_type)`.
    #[error("no handler registered for {event_source}/{event_type}")]
    UnroutableEvent {
        /// Event source service name.
        event_source: String,
        /// Event type within the source.
        event_type: String,
    },

    /// Event payload is missing a field the handler requires.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Persistence failure while recording dispatch state.
    #[error("storage error: {0}")]
    Storage(String),

    /// Client or engine misconfiguration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Workers did not stop within the shutdown budget.
    #[error("shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

impl IntegrationError {
    /// Circuit-open rejection for a service.
    pub fn circuit_open(service: impl Into<String>) -> Self {
        Self::CircuitOpen { service: service.into() }
    }

    /// Timed-out request.
    pub fn timeout(service: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout { service: service.into(), seconds }
    }

    /// Connection-level failure.
    pub fn transport(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport { service: service.into(), message: message.into() }
    }

    /// Non-success HTTP response.
    pub fn http_status(service: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus { service: service.into(), status, body: body.into() }
    }

    /// Unknown service name.
    pub fn unknown_service(name: impl Into<String>) -> Self {
        Self::UnknownService(name.into())
    }

    /// Event with no registered handler.
    pub fn unroutable(source: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self::UnroutableEvent { event_source: source.into(), event_type: event_type.into() }
    }

    /// Payload validation failure.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    /// Persistence failure.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Configuration failure.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether the dispatcher may retry the failed call.
    ///
    /// Transport-level failures and HTTP error responses are transient
    /// from the dispatcher's perspective. Circuit-open rejections are not
    /// retried in-process; the event fails and the breaker's recovery
    /// window governs when traffic resumes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. } | Self::HttpStatus { .. })
    }
}

impl From<sluice_core::CoreError> for IntegrationError {
    fn from(e: sluice_core::CoreError) -> Self {
        Self::Storage(e.to_string())
    }
}
