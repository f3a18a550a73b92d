//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::domain::EventBus;
use crate::service::QueueService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Queue service for all business logic.
    pub queue_service: Arc<QueueService>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
    /// Cancelled on server shutdown; handlers derive child tokens from it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Builds the state around a service, sharing the service's event bus.
    #[must_use]
    pub fn new(queue_service: QueueService, shutdown: CancellationToken) -> Self {
        let event_bus = queue_service.event_bus().clone();
        Self {
            queue_service: Arc::new(queue_service),
            event_bus,
            shutdown,
        }
    }
}
