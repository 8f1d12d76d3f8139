//! Sluice webhook ingestion service.
//!
//! Entry point: loads configuration, prepares the database, wires the
//! dispatch engine and health monitor, and runs the HTTP server until a
//! shutdown signal arrives.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use sluice_api::{AppState, Config, PostgresApiStore};
use sluice_core::{storage::Storage, RealClock};
use sluice_integrations::{
    CircuitBreakerManager, DispatchEngine, HandlerRegistry, HealthMonitor, PostgresDispatchStore,
    ServiceRegistry, WebhookDispatcher,
};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log);

    info!("starting sluice webhook ingestion service");
    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        workers = config.worker_count,
        "configuration loaded"
    );

    let pool = create_database_pool(&config).await?;
    info!("database connection pool established");

    run_migrations(&pool).await?;
    info!("database migrations completed");

    let storage = Arc::new(Storage::new(pool.clone()));
    let clock = Arc::new(RealClock::new());

    // Outbound side: breakers, typed clients, routing table.
    let breaker = Arc::new(CircuitBreakerManager::new(config.to_circuit_config(), clock.clone()));
    let services = Arc::new(
        ServiceRegistry::new(
            &config.integration_endpoints(),
            &config.to_client_config(),
            breaker.clone(),
        )
        .context("failed to build service clients")?,
    );
    let registry = Arc::new(HandlerRegistry::with_default_routes(&services));

    // Dispatch pipeline over the shared store.
    let store = Arc::new(PostgresDispatchStore::new(storage.clone()));
    let dispatcher = Arc::new(WebhookDispatcher::new(
        store.clone(),
        registry,
        config.to_retry_policy(),
        clock.clone(),
    ));
    let (mut engine, queue) = DispatchEngine::new(
        dispatcher,
        store.clone(),
        config.to_dispatch_config(),
        clock.clone(),
    );
    engine.spawn_workers().await.context("failed to start dispatch workers")?;

    let health_monitor =
        Arc::new(HealthMonitor::new(services, store, breaker, clock.clone()));

    let api_store = Arc::new(PostgresApiStore::new(storage));
    let state = AppState::new(api_store, queue, health_monitor, clock, &config);
    let addr = config.server_addr()?;

    info!(addr = %addr, "sluice is ready to receive webhooks");
    if let Err(e) = sluice_api::start_server(state, addr).await {
        error!(error = %e, "HTTP server failed");
    }

    info!("draining dispatch workers");
    if let Err(e) = engine.shutdown().await {
        error!(error = %e, "dispatch engine shutdown incomplete");
    }

    pool.close().await;
    info!("database connections closed, shutdown complete");
    Ok(())
}

/// Initializes tracing from `RUST_LOG` or the configured default filter.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with startup retries.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .execute(&pool)
                    .await
                    .context("failed to verify database connection")?;
                return Ok(pool);
            },
            Err(_) if retries < MAX_RETRIES => {
                retries += 1;
                info!(attempt = retries, max_retries = MAX_RETRIES, "database connection failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool after retries");
            },
        }
    }
}

/// Creates the schema if it does not exist. Idempotent.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            domain TEXT NOT NULL,
            plan TEXT NOT NULL DEFAULT 'standard',
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create tenants table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webhook_events (
            id UUID PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            source TEXT NOT NULL,
            event_type TEXT NOT NULL,
            event_id TEXT NOT NULL,
            data JSONB NOT NULL,
            metadata JSONB,
            status TEXT NOT NULL DEFAULT 'pending',
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            processed_at TIMESTAMPTZ,
            error_message TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create webhook_events table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS integration_status (
            id BIGSERIAL PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            service_name TEXT NOT NULL,
            status TEXT NOT NULL,
            last_check TIMESTAMPTZ NOT NULL,
            response_time_ms INTEGER,
            error_count INTEGER NOT NULL DEFAULT 0,
            success_count INTEGER NOT NULL DEFAULT 0,
            circuit_breaker_state TEXT NOT NULL DEFAULT 'closed',
            last_error TEXT,
            UNIQUE (tenant_id, service_name)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create integration_status table")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_webhook_events_pending
        ON webhook_events (created_at)
        WHERE status = 'pending'
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create pending events index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_webhook_events_tenant
        ON webhook_events (tenant_id, created_at DESC)
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create tenant events index")?;

    Ok(())
}
