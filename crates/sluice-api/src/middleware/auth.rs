//! Bearer token authentication for operator endpoints.
//!
//! One static token from configuration guards the operator surface.
//! Comparison is constant time; a deployment without a configured token
//! rejects every operator request.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{crypto::constant_time_eq, state::AppState};

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Operator authentication failures.
#[derive(Debug)]
pub enum AuthError {
    /// Authorization header is missing or not a bearer token.
    MissingToken,
    /// Token does not match the configured operator token.
    InvalidToken,
    /// No operator token is configured for this deployment.
    NotConfigured,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            Self::MissingToken => "missing bearer token",
            Self::InvalidToken => "invalid operator token",
            Self::NotConfigured => "operator access is not configured",
        };
        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}

/// Axum middleware guarding the operator routes.
pub async fn admin_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(expected) = state.admin_token.as_deref() else {
        warn!("operator request rejected: no admin token configured");
        return Err(AuthError::NotConfigured);
    };

    let token = extract_bearer_token(req.headers()).ok_or(AuthError::MissingToken)?;

    if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer tok_operator_1"));
        assert_eq!(extract_bearer_token(&headers), Some("tok_operator_1"));
    }

    #[test]
    fn non_bearer_schemes_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn missing_header_yields_none() {
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }
}
