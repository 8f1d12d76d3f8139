//! API error type mapped to structured HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by API handlers.
///
/// Each variant carries a stable machine-readable code and maps to one
/// HTTP status. Internal details are logged at the call site, never
/// leaked into the response body.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Webhook source path segment is not a known service.
    #[error("unknown webhook source: {0}")]
    UnknownSource(String),

    /// No tenant id in the payload or headers.
    #[error("tenant could not be resolved from payload or headers")]
    TenantUnresolved,

    /// Tenant does not exist or is inactive.
    #[error("unknown or inactive tenant: {0}")]
    UnknownTenant(String),

    /// Signature verification failed or the header is missing.
    #[error("webhook signature rejected: {0}")]
    InvalidSignature(String),

    /// Request body is not valid JSON or lacks required fields.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Query parameter failed validation.
    #[error("invalid query parameter: {0}")]
    InvalidQuery(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Resource is in a state that forbids the operation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unexpected internal failure.
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    /// Stable error code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownSource(_) => "unknown_source",
            Self::TenantUnresolved => "tenant_unresolved",
            Self::UnknownTenant(_) => "unknown_tenant",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::InvalidQuery(_) => "invalid_query",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for the variant.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownSource(_) | Self::UnknownTenant(_) | Self::NotFound(_) => {
                StatusCode::NOT_FOUND
            },
            Self::TenantUnresolved | Self::InvalidPayload(_) | Self::InvalidQuery(_) => {
                StatusCode::BAD_REQUEST
            },
            Self::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Internal failure carrying a detail that is logged, not returned.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details.
    pub error: ErrorDetail,
}

/// Code and message inside the error body.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Internal detail stays out of the response.
            Self::Internal(detail) => {
                tracing::error!(detail, "request failed with internal error");
                "internal error".to_string()
            },
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: ErrorDetail { code: self.code().to_string(), message },
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<sluice_core::CoreError> for ApiError {
    fn from(e: sluice_core::CoreError) -> Self {
        match e {
            sluice_core::CoreError::NotFound(what) => Self::NotFound(what),
            other => Self::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_variants() {
        assert_eq!(ApiError::UnknownSource("billing".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::TenantUnresolved.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::InvalidSignature("mismatch".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Conflict("not failed".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::internal("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let response = ApiError::internal("connection pool exhausted").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
