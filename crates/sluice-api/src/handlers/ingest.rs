//! Webhook ingestion endpoint.
//!
//! Validates the source, verifies the signature over the raw body,
//! resolves the tenant, persists the event as pending, and enqueues it
//! for dispatch. The response is fire-and-forget: 202 means "accepted
//! and persisted", not "delivered".

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sluice_core::{TenantId, WebhookEvent, WebhookSource};
use tracing::{debug, info, instrument, warn};

use crate::{crypto::verify_signature, error::ApiError, state::AppState};

const SIGNATURE_HEADER: &str = "x-webhook-signature";
const TENANT_HEADER: &str = "x-tenant-id";

/// Incoming webhook body.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    /// Event type within the source, e.g. `user.created`.
    pub event_type: String,
    /// Upstream event identifier.
    pub event_id: String,
    /// Event payload.
    pub data: serde_json::Value,
    /// Optional source-supplied metadata.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Tenant hint, highest precedence.
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Tenant hint, second precedence.
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Body of a successful ingestion response.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Deterministic event id.
    pub event_id: String,
    /// Always `accepted`; processing is asynchronous.
    pub status: String,
}

/// Ingests one webhook from an external service.
#[instrument(
    name = "ingest_webhook",
    skip(state, headers, body),
    fields(source = %source_slug, body_bytes = body.len()),
)]
pub async fn ingest_webhook(
    Path(source_slug): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let source = WebhookSource::from_path_slug(&source_slug)
        .ok_or_else(|| ApiError::UnknownSource(source_slug.clone()))?;

    // Signature is checked over the raw bytes, before any parsing.
    if let Some(secret) = state.webhook_secret(source) {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if let Err(e) = verify_signature(&body, signature, secret) {
            warn!(source = source.as_str(), error = %e, "webhook signature rejected");
            return Err(ApiError::InvalidSignature(e.to_string()));
        }
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidPayload(e.to_string()))?;
    if payload.event_type.is_empty() {
        return Err(ApiError::InvalidPayload("event_type must not be empty".into()));
    }
    if payload.event_id.is_empty() {
        return Err(ApiError::InvalidPayload("event_id must not be empty".into()));
    }

    let tenant_id = resolve_tenant(&payload, &headers).ok_or(ApiError::TenantUnresolved)?;

    let tenant = state
        .store
        .find_tenant(tenant_id.clone())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    match tenant {
        Some(tenant) if tenant.is_active => {},
        _ => {
            warn!(tenant_id = %tenant_id, "rejecting webhook for unknown or inactive tenant");
            return Err(ApiError::UnknownTenant(tenant_id.0));
        },
    }

    let event = WebhookEvent::new(
        tenant_id,
        source,
        payload.event_type,
        payload.event_id,
        payload.data,
        payload.metadata,
        DateTime::<Utc>::from(state.clock.now_system()),
    );
    let event_id = event.id;

    let inserted = state
        .store
        .insert_event(event.clone())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if inserted {
        // Enqueue failure is fine: the event is pending and the poller
        // will claim it.
        state.queue.enqueue(event_id).await;
        info!(event_id = %event_id, event_type = %event.event_type, "webhook accepted");
    } else {
        debug!(event_id = %event_id, "duplicate webhook delivery, keeping existing record");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse { event_id: event_id.to_string(), status: "accepted".to_string() }),
    )
        .into_response())
}

/// Resolves the owning tenant: body `organization_id`, then body
/// `tenant_id`, then the `X-Tenant-ID` header.
fn resolve_tenant(payload: &WebhookPayload, headers: &HeaderMap) -> Option<TenantId> {
    payload
        .organization_id
        .as_deref()
        .or(payload.tenant_id.as_deref())
        .or_else(|| headers.get(TENANT_HEADER).and_then(|v| v.to_str().ok()))
        .filter(|id| !id.is_empty())
        .map(TenantId::new)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use serde_json::json;

    use super::*;

    fn payload(organization_id: Option<&str>, tenant_id: Option<&str>) -> WebhookPayload {
        WebhookPayload {
            event_type: "user.created".to_string(),
            event_id: "evt_1".to_string(),
            data: json!({}),
            metadata: None,
            organization_id: organization_id.map(String::from),
            tenant_id: tenant_id.map(String::from),
        }
    }

    #[test]
    fn organization_id_has_highest_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_static("tenant_header"));

        let resolved = resolve_tenant(&payload(Some("tenant_org"), Some("tenant_body")), &headers);
        assert_eq!(resolved, Some(TenantId::new("tenant_org")));
    }

    #[test]
    fn body_tenant_id_beats_the_header() {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_static("tenant_header"));

        let resolved = resolve_tenant(&payload(None, Some("tenant_body")), &headers);
        assert_eq!(resolved, Some(TenantId::new("tenant_body")));
    }

    #[test]
    fn header_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_static("tenant_header"));

        let resolved = resolve_tenant(&payload(None, None), &headers);
        assert_eq!(resolved, Some(TenantId::new("tenant_header")));
    }

    #[test]
    fn unresolvable_tenant_is_none() {
        assert_eq!(resolve_tenant(&payload(None, None), &HeaderMap::new()), None);
    }

    #[test]
    fn empty_tenant_hints_are_ignored() {
        let resolved = resolve_tenant(&payload(Some(""), None), &HeaderMap::new());
        assert_eq!(resolved, None);
    }

    #[test]
    fn payload_parses_with_optional_fields_absent() {
        let body = br#"{"event_type":"user.created","event_id":"evt_9","data":{"user_id":"u_1"}}"#;
        let parsed: WebhookPayload = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed.event_type, "user.created");
        assert!(parsed.metadata.is_none());
        assert!(parsed.organization_id.is_none());
    }

    #[test]
    fn malformed_body_fails_to_parse() {
        let body = br#"{"event_type": 7}"#;
        assert!(serde_json::from_slice::<WebhookPayload>(body).is_err());
    }
}
