//! Operator endpoints for event inspection and retry.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use sluice_core::{
    storage::webhook_events::EventFilter, EventId, EventStatus, TenantId, WebhookEvent,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// Query parameters for listing events.
#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    /// Tenant whose events to list.
    pub tenant_id: String,
    /// Optional lifecycle state filter.
    #[serde(default)]
    pub status: Option<String>,
    /// Optional source service filter.
    #[serde(default)]
    pub source: Option<String>,
    /// Page size, capped at 200.
    #[serde(default)]
    pub limit: Option<i64>,
    /// Page offset.
    #[serde(default)]
    pub offset: Option<i64>,
}

/// Lists a tenant's events, newest first.
#[instrument(name = "list_events", skip(state, query), fields(tenant_id = %query.tenant_id))]
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<Vec<WebhookEvent>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<EventStatus>)
        .transpose()
        .map_err(ApiError::InvalidQuery)?;

    let filter = EventFilter {
        status,
        source: query.source,
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        offset: query.offset.unwrap_or(0).max(0),
    };

    let tenant_id = TenantId::new(query.tenant_id);
    let events = state
        .store
        .list_events(tenant_id, filter)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(events))
}

/// Fetches one event by id.
#[instrument(name = "get_event", skip(state))]
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WebhookEvent>, ApiError> {
    let event = state
        .store
        .find_event(EventId(id))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("event {id}")))?;

    Ok(Json(event))
}

/// Requeues a failed event for another delivery attempt.
///
/// Only failed events can be retried; the reset bumps `retry_count`,
/// clears the error, and re-enqueues.
#[instrument(name = "retry_event", skip(state))]
pub async fn retry_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let event_id = EventId(id);

    let reset = state
        .store
        .reset_event_for_retry(event_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let Some(event) = reset else {
        // Distinguish "no such event" from "exists but not failed".
        let existing = state
            .store
            .find_event(event_id)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        return match existing {
            Some(existing) => Err(ApiError::Conflict(format!(
                "event {id} is {}, only failed events can be retried",
                existing.status
            ))),
            None => Err(ApiError::NotFound(format!("event {id}"))),
        };
    };

    state.queue.enqueue(event.id).await;
    info!(event_id = %event.id, retry_count = event.retry_count, "event requeued by operator");

    Ok((StatusCode::ACCEPTED, Json(event)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_parses_filters() {
        let query: ListEventsQuery = serde_json::from_str(
            r#"{"tenant_id":"tenant_acme","status":"failed","source":"user_service","limit":25}"#,
        )
        .unwrap();

        assert_eq!(query.tenant_id, "tenant_acme");
        assert_eq!(query.status.as_deref(), Some("failed"));
        assert_eq!(query.limit, Some(25));
        assert!(query.offset.is_none());
    }

    #[test]
    fn unknown_status_filter_is_rejected() {
        let parsed = "archived".parse::<EventStatus>();
        assert!(parsed.is_err());
    }

    #[test]
    fn limits_clamp_to_the_page_cap() {
        assert_eq!(5000i64.clamp(1, MAX_PAGE_SIZE), MAX_PAGE_SIZE);
        assert_eq!(0i64.clamp(1, MAX_PAGE_SIZE), 1);
    }
}
