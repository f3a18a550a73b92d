//! Queue change notifications.
//!
//! Every mutation publishes a [`QueueEvent`] through the
//! [`super::EventBus`]. The event is a signal to re-fetch, not a state
//! push: it only names the site and room that changed.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Topic for every room of a site.
#[must_use]
pub fn site_topic(site_slug: &str) -> String {
    format!("site:{site_slug}")
}

/// Topic for a single room.
#[must_use]
pub fn room_topic(site_slug: &str, room_slug: &str) -> String {
    format!("room:{site_slug}:{room_slug}")
}

/// Domain event emitted after a queue operation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// The queue of a room changed (or a staff action was attempted).
    QueueUpdated {
        /// Site slug.
        site_slug: String,
        /// Room slug.
        room_slug: String,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// Creates a `QueueUpdated` event stamped now.
    #[must_use]
    pub fn queue_updated(site_slug: &str, room_slug: &str) -> Self {
        Self::QueueUpdated {
            site_slug: site_slug.to_string(),
            room_slug: room_slug.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Topics the event is addressed to: the site topic and the room topic.
    #[must_use]
    pub fn topics(&self) -> [String; 2] {
        match self {
            Self::QueueUpdated {
                site_slug,
                room_slug,
                ..
            } => [site_topic(site_slug), room_topic(site_slug, room_slug)],
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::QueueUpdated { .. } => "queue_updated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_updated_targets_site_and_room_topics() {
        let event = QueueEvent::queue_updated("site-1", "room-2");
        assert_eq!(
            event.topics(),
            ["site:site-1".to_string(), "room:site-1:room-2".to_string()]
        );
        assert_eq!(event.event_type_str(), "queue_updated");
    }

    #[test]
    fn payload_carries_slugs_only() {
        let json = serde_json::to_value(QueueEvent::queue_updated("s", "r")).unwrap_or_default();
        assert_eq!(json.get("event_type"), Some(&serde_json::json!("queue_updated")));
        assert_eq!(json.get("site_slug"), Some(&serde_json::json!("s")));
        assert_eq!(json.get("room_slug"), Some(&serde_json::json!("r")));
    }
}
