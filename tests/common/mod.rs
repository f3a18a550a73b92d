//! Shared harness: the full router over the in-memory store, served on an
//! ephemeral port with a frozen clock.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use queue_gateway::api;
use queue_gateway::app_state::AppState;
use queue_gateway::clock::{Clock, FixedClock};
use queue_gateway::domain::EventBus;
use queue_gateway::persistence::InMemoryStore;
use queue_gateway::persistence::seed::seed_demo_data;
use queue_gateway::service::{QueueService, StatusCache};

/// A running server bound to `127.0.0.1:0`.
pub struct TestServer {
    /// Bound address.
    pub addr: SocketAddr,
    /// Clock driving service dates and shifts.
    pub clock: Arc<FixedClock>,
    /// HTTP client.
    pub client: reqwest::Client,
    shutdown: CancellationToken,
}

impl TestServer {
    /// `http://` URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// `ws://` URL of the notification endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// 2026-03-02 09:00 in Bangkok, inside shift `A` of the default schedule.
pub fn morning() -> DateTime<Utc> {
    match Utc.with_ymd_and_hms(2026, 3, 2, 2, 0, 0) {
        chrono::LocalResult::Single(t) => t,
        _ => DateTime::<Utc>::MIN_UTC,
    }
}

/// Starts the server with the demo catalog seeded.
pub async fn spawn_server() -> TestServer {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::new(morning(), chrono_tz::Asia::Bangkok));
    let Ok(true) = seed_demo_data(store.as_ref(), morning()).await else {
        panic!("demo seed failed");
    };

    let service = QueueService::new(store, Arc::clone(&clock) as Arc<dyn Clock>, EventBus::new(64))
        .with_cache(StatusCache::new(std::time::Duration::from_secs(60)));
    let shutdown = CancellationToken::new();
    let app = api::build_app(AppState::new(service, shutdown.clone()));

    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    let token = shutdown.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
    });

    TestServer {
        addr,
        clock,
        client: reqwest::Client::new(),
        shutdown,
    }
}
