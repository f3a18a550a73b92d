//! Per-connection subscription manager.
//!
//! Tracks which topics a WebSocket client follows and filters queue
//! events server-side.

use std::collections::HashSet;

use crate::domain::QueueEvent;

/// Wildcard topic matching every event.
pub const WILDCARD_TOPIC: &str = "*";

/// Whether `topic` is a well-formed site or room topic.
#[must_use]
pub fn is_valid_topic(topic: &str) -> bool {
    if topic == WILDCARD_TOPIC {
        return true;
    }
    match topic.split(':').collect::<Vec<_>>().as_slice() {
        ["site", site] => !site.is_empty(),
        ["room", site, room] => !site.is_empty() && !room.is_empty(),
        _ => false,
    }
}

/// Manages the set of topic subscriptions for a single WebSocket
/// connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed topics. If `subscribe_all` is true, this set is ignored.
    topics: HashSet<String>,
    /// Whether the client subscribed to the wildcard topic.
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the valid topics and returns the rejected ones.
    pub fn subscribe(&mut self, topics: &[String]) -> Vec<String> {
        let mut rejected = Vec::new();
        for topic in topics {
            if topic == WILDCARD_TOPIC {
                self.subscribe_all = true;
            } else if is_valid_topic(topic) {
                self.topics.insert(topic.clone());
            } else {
                rejected.push(topic.clone());
            }
        }
        rejected
    }

    /// Removes topics. Removing `*` turns the wildcard off.
    pub fn unsubscribe(&mut self, topics: &[String]) {
        for topic in topics {
            if topic == WILDCARD_TOPIC {
                self.subscribe_all = false;
            } else {
                self.topics.remove(topic);
            }
        }
    }

    /// Returns `true` if the event is addressed to a followed topic.
    #[must_use]
    pub fn matches(&self, event: &QueueEvent) -> bool {
        self.subscribe_all || event.topics().iter().any(|t| self.topics.contains(t))
    }

    /// Returns the number of explicitly subscribed topics.
    #[must_use]
    pub fn count(&self) -> usize {
        self.topics.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub const fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::queue_event::{room_topic, site_topic};

    fn event(site: &str, room: &str) -> QueueEvent {
        QueueEvent::queue_updated(site, room)
    }

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(&event("site-1", "room-1")));
    }

    #[test]
    fn site_topic_matches_every_room_of_the_site() {
        let mut mgr = SubscriptionManager::new();
        assert!(mgr.subscribe(&[site_topic("site-1")]).is_empty());
        assert!(mgr.matches(&event("site-1", "room-1")));
        assert!(mgr.matches(&event("site-1", "room-5")));
        assert!(!mgr.matches(&event("site-2", "room-1")));
    }

    #[test]
    fn room_topic_matches_only_that_room() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[room_topic("site-1", "room-2")]);
        assert!(mgr.matches(&event("site-1", "room-2")));
        assert!(!mgr.matches(&event("site-1", "room-3")));
    }

    #[test]
    fn wildcard_matches_everything_until_removed() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[WILDCARD_TOPIC.to_string()]);
        assert!(mgr.is_subscribed_all());
        assert!(mgr.matches(&event("any", "room")));
        mgr.unsubscribe(&[WILDCARD_TOPIC.to_string()]);
        assert!(!mgr.matches(&event("any", "room")));
    }

    #[test]
    fn malformed_topics_are_rejected() {
        let mut mgr = SubscriptionManager::new();
        let rejected = mgr.subscribe(&[
            "pool:1".to_string(),
            "site:".to_string(),
            "room:site-1".to_string(),
            "site:site-1".to_string(),
        ]);
        assert_eq!(rejected.len(), 3);
        assert_eq!(mgr.count(), 1);
    }
}
