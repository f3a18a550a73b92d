//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The endpoint at `/ws` pushes a `queue_updated` event whenever a followed
//! room changes. Clients follow `site:{site}` or `room:{site}:{room}`
//! topics and re-fetch status over REST when notified.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
