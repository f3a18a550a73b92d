//! Broadcast channel for queue notifications.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Publishing is
//! fire-and-forget: a send with no live receivers is not an error for the
//! operation that triggered it, and nothing is retried.

use tokio::sync::broadcast;

use super::QueueEvent;

/// Broadcast bus for [`QueueEvent`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest events are dropped for lagging
/// receivers, which is fine because every event only asks clients to
/// re-fetch.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that got the event; zero when nobody
    /// is listening.
    pub fn publish(&self, event: QueueEvent) -> usize {
        let [site_topic, room_topic] = event.topics();
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(%site_topic, %room_topic, receivers, "queue update broadcast");
                receivers
            }
            Err(_) => {
                tracing::debug!(%site_topic, %room_topic, "queue update dropped: no subscribers");
                0
            }
        }
    }

    /// Creates a new receiver that will receive all future events.
    ///
    /// Each WebSocket connection should call this once on connect.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
