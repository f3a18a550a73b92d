//! queue-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, StatusCode};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use queue_gateway::api;
use queue_gateway::app_state::AppState;
use queue_gateway::clock::{Clock, SystemClock};
use queue_gateway::config::{QueueConfig, StorageBackend};
use queue_gateway::domain::EventBus;
use queue_gateway::persistence::{InMemoryStore, PostgresStore, QueueStore, seed::seed_demo_data};
use queue_gateway::service::{CounterAllocator, QueueService, StatusCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = QueueConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(
        addr = %config.listen_addr,
        backend = ?config.storage_backend,
        time_zone = %config.time_zone,
        "starting queue-gateway"
    );

    // Build persistence layer
    let store = build_store(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.time_zone));
    if config.seed_demo_data && seed_demo_data(store.as_ref(), clock.utc_now()).await? {
        tracing::info!("seeded demo sites and rooms");
    }

    // Build service layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    let queue_service = QueueService::new(store, clock, event_bus)
        .with_cache(StatusCache::new(config.status_cache_ttl))
        .with_allocator(CounterAllocator::new(config.allocation_max_attempts));

    // Build application state
    let shutdown = CancellationToken::new();
    let app_state = AppState::new(queue_service, shutdown.clone());

    // Build router
    let app = api::build_app(app_state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_allowed_origins)?);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn build_store(config: &QueueConfig) -> anyhow::Result<Arc<dyn QueueStore>> {
    match config.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; queue state is lost on restart");
            Ok(Arc::new(InMemoryStore::with_strategy(config.counter_strategy)))
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for postgres storage")?;
            let pool = PostgresStore::connect(
                url,
                config.database_max_connections,
                config.database_min_connections,
                config.database_connect_timeout,
            )
            .await?;
            let store = PostgresStore::new(pool, config.counter_strategy);
            store.migrate().await?;
            tracing::info!("database migrations applied");
            Ok(Arc::new(store))
        }
    }
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin: {o}")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Resolves on ctrl-c and cancels in-flight work and WebSocket sessions.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
    shutdown.cancel();
}
