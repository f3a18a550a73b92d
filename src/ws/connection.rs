//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered events.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::QueueEvent;
use crate::domain::queue_event::{room_topic, site_topic};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and updates its subscriptions.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
/// - Closes the socket when `shutdown` fires.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<QueueEvent>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs);
                        if let Ok(json) = serde_json::to_string(&response)
                            && ws_tx.send(Message::text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(queue_event) => {
                        if subs.matches(&queue_event) {
                            let msg = WsMessage::new(
                                uuid::Uuid::new_v4().to_string(),
                                WsMessageType::Event,
                                serde_json::to_value(&queue_event).unwrap_or_default(),
                            );
                            let json = serde_json::to_string(&msg).unwrap_or_default();
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    // Events only ask clients to re-fetch, so a skipped one is harmless.
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Handles a text message from the client and builds the reply.
fn handle_text_message(text: &str, subs: &mut SubscriptionManager) -> WsMessage {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error(String::new(), 400, "malformed JSON");
    };
    if msg.msg_type != WsMessageType::Command {
        return WsMessage::error(msg.id, 400, "expected a command message");
    }
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return WsMessage::error(msg.id, 404, "unknown command");
    };

    let payload = match command {
        WsCommand::Subscribe { topics } => subscribe(subs, topics),
        WsCommand::JoinSite { site_slug } => subscribe(subs, vec![site_topic(&site_slug)]),
        WsCommand::JoinRoom {
            site_slug,
            room_slug,
        } => subscribe(subs, vec![room_topic(&site_slug, &room_slug)]),
        WsCommand::Unsubscribe { topics } => {
            subs.unsubscribe(&topics);
            serde_json::json!({
                "unsubscribed": topics,
                "remaining_count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
    };
    WsMessage::new(msg.id, WsMessageType::Response, payload)
}

fn subscribe(subs: &mut SubscriptionManager, topics: Vec<String>) -> serde_json::Value {
    let rejected = subs.subscribe(&topics);
    let accepted: Vec<&String> = topics.iter().filter(|t| !rejected.contains(t)).collect();
    tracing::debug!(topics = ?accepted, "ws client subscribed");
    serde_json::json!({
        "subscribed": accepted,
        "rejected": rejected,
        "count": subs.count(),
        "wildcard": subs.is_subscribed_all(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_subscribes_room_topic() {
        let mut subs = SubscriptionManager::new();
        let reply = handle_text_message(
            r#"{"id":"r1","type":"command","payload":{"command":"join_room","site_slug":"site-1","room_slug":"room-2"}}"#,
            &mut subs,
        );
        assert_eq!(reply.msg_type, WsMessageType::Response);
        assert_eq!(reply.id, "r1");
        assert!(subs.matches(&QueueEvent::queue_updated("site-1", "room-2")));
        assert!(!subs.matches(&QueueEvent::queue_updated("site-1", "room-1")));
    }

    #[test]
    fn join_site_follows_all_rooms() {
        let mut subs = SubscriptionManager::new();
        handle_text_message(
            r#"{"type":"command","payload":{"command":"join_site","site_slug":"site-1"}}"#,
            &mut subs,
        );
        assert!(subs.matches(&QueueEvent::queue_updated("site-1", "room-4")));
    }

    #[test]
    fn subscribe_reports_rejected_topics() {
        let mut subs = SubscriptionManager::new();
        let reply = handle_text_message(
            r#"{"id":"2","type":"command","payload":{"command":"subscribe","topics":["site:a","bogus"]}}"#,
            &mut subs,
        );
        assert_eq!(reply.payload.get("rejected"), Some(&serde_json::json!(["bogus"])));
        assert_eq!(reply.payload.get("count"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn unsubscribe_removes_topic() {
        let mut subs = SubscriptionManager::new();
        subs.subscribe(&["site:a".to_string()]);
        handle_text_message(
            r#"{"type":"command","payload":{"command":"unsubscribe","topics":["site:a"]}}"#,
            &mut subs,
        );
        assert_eq!(subs.count(), 0);
    }

    #[test]
    fn malformed_and_unknown_messages_error() {
        let mut subs = SubscriptionManager::new();
        let bad = handle_text_message("not json", &mut subs);
        assert_eq!(bad.msg_type, WsMessageType::Error);

        let unknown = handle_text_message(
            r#"{"id":"3","type":"command","payload":{"command":"reset_counter"}}"#,
            &mut subs,
        );
        assert_eq!(unknown.msg_type, WsMessageType::Error);
        assert_eq!(unknown.payload.get("code"), Some(&serde_json::json!(404)));
    }
}
