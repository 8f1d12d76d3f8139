//! HTTP server assembly and lifecycle.
//!
//! Routes, middleware stack, and graceful shutdown. Requests flow
//! through request-id injection, trace spans, and the timeout layer
//! before reaching handlers; operator routes additionally pass the
//! bearer-token middleware.

use std::net::SocketAddr;

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::{handlers, middleware::admin_auth, state::AppState};

/// Builds the router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::liveness_check))
        .route("/webhooks/:source", post(handlers::ingest_webhook));

    let operator_routes = Router::new()
        .route("/api/v1/events", get(handlers::list_events))
        .route("/api/v1/events/:id", get(handlers::get_event))
        .route("/api/v1/events/:id/retry", post(handlers::retry_event))
        .route("/api/v1/integrations/health", get(handlers::integrations_health))
        .route("/api/v1/integrations/health/:service", get(handlers::integration_health))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth));

    Router::new()
        .merge(public_routes)
        .merge(operator_routes)
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Adds an `X-Request-Id` header to every response for cross-service
/// correlation.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;
    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }
    response
}

/// Binds and serves until a shutdown signal arrives.
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install ctrl-c handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c, starting graceful shutdown"),
        () = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use serde_json::Value;
    use sluice_core::{
        EventId, EventStatus, RealClock, Tenant, TenantId, WebhookEvent, WebhookSource,
    };
    use sluice_integrations::{
        storage::mock::MockStore, CircuitBreakerManager, CircuitConfig, ClientConfig,
        DispatchConfig, DispatchEngine, HandlerRegistry, HealthMonitor, IntegrationEndpoints,
        RetryPolicy, ServiceRegistry, WebhookDispatcher,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{config::Config, crypto::sign_payload, storage::mock::MockApiStore};

    struct TestApp {
        router: Router,
        store: Arc<MockApiStore>,
        state: AppState,
        // Keeps the queue receiver alive for the duration of the test.
        _engine: DispatchEngine,
    }

    fn test_app(config: Config) -> TestApp {
        let store = Arc::new(MockApiStore::new());
        let clock = Arc::new(RealClock::new());

        let breaker =
            Arc::new(CircuitBreakerManager::new(CircuitConfig::default(), clock.clone()));
        let endpoints = IntegrationEndpoints {
            user_service_url: "http://localhost:8001".to_string(),
            payment_service_url: "http://localhost:8002".to_string(),
            communication_service_url: "http://localhost:8003".to_string(),
        };
        let services = Arc::new(
            ServiceRegistry::new(&endpoints, &ClientConfig::default(), breaker.clone())
                .expect("registry builds"),
        );

        let dispatch_store = Arc::new(MockStore::new());
        let dispatcher = Arc::new(WebhookDispatcher::new(
            dispatch_store.clone(),
            Arc::new(HandlerRegistry::new()),
            RetryPolicy::default(),
            clock.clone(),
        ));
        let (engine, queue) = DispatchEngine::new(
            dispatcher,
            dispatch_store.clone(),
            DispatchConfig::default(),
            clock.clone(),
        );
        let health_monitor =
            Arc::new(HealthMonitor::new(services, dispatch_store, breaker, clock.clone()));

        let state = AppState::new(store.clone(), queue, health_monitor, clock, &config);
        TestApp { router: create_router(state.clone()), store, state, _engine: engine }
    }

    fn tenant(id: &str, is_active: bool) -> Tenant {
        Tenant {
            id: TenantId::new(id),
            name: "Acme Corp".to_string(),
            domain: "acme.test".to_string(),
            plan: "standard".to_string(),
            is_active,
            created_at: Utc::now(),
        }
    }

    fn webhook_body(event_id: &str) -> String {
        serde_json::json!({
            "event_type": "user.created",
            "event_id": event_id,
            "data": {"user_id": "u_1"},
            "organization_id": "tenant_acme",
        })
        .to_string()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body collects");
        // Auth failures respond with plain text; everything else is json.
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn post_webhook(body: String, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/user-service")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-webhook-signature", signature);
        }
        builder.body(Body::from(body)).expect("request builds")
    }

    #[tokio::test]
    async fn ingestion_accepts_webhook_and_returns_derived_id() {
        let app = test_app(Config::default());
        app.store.insert_tenant(tenant("tenant_acme", true)).await;

        let (status, json) = send(&app.router, post_webhook(webhook_body("evt_100"), None)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["status"], "accepted");

        let expected = EventId::from_source("user_service", "evt_100");
        assert_eq!(json["event_id"], expected.to_string());

        let stored = app.store.event(expected).await.expect("event persisted");
        assert_eq!(stored.status, EventStatus::Pending);
        assert_eq!(stored.tenant_id, TenantId::new("tenant_acme"));
    }

    #[tokio::test]
    async fn duplicate_delivery_returns_the_same_id_without_a_second_record() {
        let app = test_app(Config::default());
        app.store.insert_tenant(tenant("tenant_acme", true)).await;

        let (first_status, first) =
            send(&app.router, post_webhook(webhook_body("evt_200"), None)).await;
        let (second_status, second) =
            send(&app.router, post_webhook(webhook_body("evt_200"), None)).await;

        assert_eq!(first_status, StatusCode::ACCEPTED);
        assert_eq!(second_status, StatusCode::ACCEPTED);
        assert_eq!(first["event_id"], second["event_id"]);
        assert_eq!(app.store.event_count().await, 1);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected_when_secret_configured() {
        let mut config = Config::default();
        config.user_service_secret = Some("whsec_users".to_string());
        let app = test_app(config);
        app.store.insert_tenant(tenant("tenant_acme", true)).await;

        let (status, json) = send(&app.router, post_webhook(webhook_body("evt_300"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "invalid_signature");
        assert_eq!(app.store.event_count().await, 0);
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let mut config = Config::default();
        config.user_service_secret = Some("whsec_users".to_string());
        let app = test_app(config);
        app.store.insert_tenant(tenant("tenant_acme", true)).await;

        let body = webhook_body("evt_310");
        let wrong = sign_payload(body.as_bytes(), "whsec_other").unwrap();
        let (status, json) =
            send(&app.router, post_webhook(body, Some(&format!("sha256={wrong}")))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "invalid_signature");
    }

    #[tokio::test]
    async fn valid_signature_is_accepted() {
        let mut config = Config::default();
        config.user_service_secret = Some("whsec_users".to_string());
        let app = test_app(config);
        app.store.insert_tenant(tenant("tenant_acme", true)).await;

        let body = webhook_body("evt_320");
        let signature = sign_payload(body.as_bytes(), "whsec_users").unwrap();
        let (status, _) =
            send(&app.router, post_webhook(body, Some(&format!("sha256={signature}")))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(app.store.event_count().await, 1);
    }

    #[tokio::test]
    async fn inactive_tenant_is_rejected() {
        let app = test_app(Config::default());
        app.store.insert_tenant(tenant("tenant_acme", false)).await;

        let (status, json) = send(&app.router, post_webhook(webhook_body("evt_400"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "unknown_tenant");
        assert_eq!(app.store.event_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_source_is_rejected() {
        let app = test_app(Config::default());

        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/inventory-service")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(webhook_body("evt_500")))
            .unwrap();
        let (status, json) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "unknown_source");
    }

    #[tokio::test]
    async fn operator_routes_require_the_bearer_token() {
        let mut config = Config::default();
        config.admin_token = Some("tok_operator".to_string());
        let app = test_app(config);

        let unauthenticated = Request::builder()
            .uri("/api/v1/events?tenant_id=tenant_acme")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app.router, unauthenticated).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let authenticated = Request::builder()
            .uri("/api/v1/events?tenant_id=tenant_acme")
            .header(header::AUTHORIZATION, "Bearer tok_operator")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app.router, authenticated).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn operator_retry_requeues_a_failed_event() {
        let mut config = Config::default();
        config.admin_token = Some("tok_operator".to_string());
        let app = test_app(config);

        let mut event = WebhookEvent::new(
            TenantId::new("tenant_acme"),
            WebhookSource::UserService,
            "user.created",
            "evt_600",
            serde_json::json!({}),
            None,
            Utc::now(),
        );
        event.status = EventStatus::Failed;
        event.retry_count = 1;
        event.error_message = Some("user_service returned HTTP 503".to_string());
        let id = event.id;
        app.store.seed_event(event).await;

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/events/{id}/retry"))
            .header(header::AUTHORIZATION, "Bearer tok_operator")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let stored = app.store.event(id).await.unwrap();
        assert_eq!(stored.status, EventStatus::Pending);
        assert_eq!(stored.retry_count, 2);
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn health_endpoint_reports_database_up() {
        let app = test_app(Config::default());

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, json) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["checks"]["database"]["status"], "up");
    }

    #[tokio::test]
    async fn request_timeout_is_taken_from_config() {
        let mut config = Config::default();
        config.request_timeout = 7;
        let app = test_app(config);

        assert_eq!(app.state.request_timeout, Duration::from_secs(7));
    }
}
