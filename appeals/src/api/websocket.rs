//! WebSocket endpoint for real-time ticket events.
//!
//! # Connection
//!
//! ```text
//! ws://localhost:8080/ws?token=<token>
//! Authorization: Bearer <token>        (alternative for non-browser clients)
//! ```
//!
//! # Protocol
//!
//! **Client → Server:**
//! ```json
//! {"type": "subscribe", "channels": ["ticket:7", "user:3"]}
//! {"type": "unsubscribe", "channels": ["ticket:7"]}
//! {"type": "ping"}
//! ```
//!
//! **Server → Client:**
//! ```json
//! {"type": "subscribed", "channel": "ticket:7"}
//! {"type": "event", "channel": "ticket:7", "event": {"type": "message-added", "message": {...}}}
//! {"type": "error", "message": "cannot subscribe to user:9", "channel": "user:9"}
//! {"type": "pong"}
//! ```
//!
//! Each subscription is authorized on its own. While a subscription is live
//! the user counts as present on the channel, so a user with `ticket:<id>`
//! open gets no push notifications for that ticket.
//!
//! # Connection Limits
//!
//! - Max 1000 concurrent connections per instance (503 beyond)
//! - Idle timeout: 5 minutes without any client frame
//! - Ping every 30 seconds

use super::auth::Authenticated;
use crate::emitter::RealtimeEvent;
use crate::server::state::AppState;
use appeals_core::{Channel, RequestContext};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

/// Global WebSocket connection counter.
static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Maximum concurrent WebSocket connections.
const MAX_CONNECTIONS: usize = 1000;

/// Ping interval for keep-alive (30 seconds).
const PING_INTERVAL_SECS: u64 = 30;

/// Idle timeout (5 minutes).
const IDLE_TIMEOUT_SECS: u64 = 300;

/// Outgoing frames buffered per connection.
const OUTBOX_CAPACITY: usize = 256;

// ============================================================================
// Message Types
// ============================================================================

/// Frame sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving events on channels
    Subscribe {
        /// `ticket:<id>`, `department:<id>` or `user:<id>`
        channels: Vec<String>,
    },
    /// Stop receiving events on channels
    Unsubscribe {
        /// Channels to leave
        channels: Vec<String>,
    },
    /// Application-level keep-alive
    Ping,
}

/// Frame sent by the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription is live
    Subscribed {
        /// Channel name
        channel: String,
    },
    /// Subscription ended
    Unsubscribed {
        /// Channel name
        channel: String,
    },
    /// A request failed
    Error {
        /// What went wrong
        message: String,
        /// Channel the failure concerns, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
    /// Reply to a client ping
    Pong,
    /// An event published on a subscribed channel
    Event {
        /// Channel name
        channel: String,
        /// The event
        event: RealtimeEvent,
    },
}

/// Number of open WebSocket connections on this instance.
#[must_use]
pub fn active_connection_count() -> usize {
    ACTIVE_CONNECTIONS.load(Ordering::Relaxed)
}

// ============================================================================
// Handler
// ============================================================================

/// Upgrade an authenticated request to a WebSocket.
///
/// Returns 503 Service Unavailable when the connection limit is reached.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn ws_handler(
    Authenticated(ctx): Authenticated,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    let current = ACTIVE_CONNECTIONS.load(Ordering::Relaxed);
    if current >= MAX_CONNECTIONS {
        warn!(current_connections = current, "WebSocket connection limit exceeded");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Too many concurrent connections. Please try again later.",
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, ctx, state))
}

// ============================================================================
// Socket Handling
// ============================================================================

/// Live subscriptions of one connection. Dropping it ends all of them.
#[derive(Default)]
struct Subscriptions(HashMap<Channel, JoinHandle<()>>);

impl Drop for Subscriptions {
    fn drop(&mut self) {
        for (_, task) in self.0.drain() {
            task.abort();
        }
    }
}

async fn handle_socket(socket: WebSocket, ctx: RequestContext, state: AppState) {
    let user_id = ctx.user_id();
    let count = ACTIVE_CONNECTIONS.fetch_add(1, Ordering::Relaxed) + 1;
    info!(user_id = %user_id, total_connections = count, "WebSocket connection established");

    let (mut sink, mut stream) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::channel::<ServerMessage>(OUTBOX_CAPACITY);

    // Single writer: outgoing frames and keep-alive pings.
    let mut send_task = tokio::spawn(async move {
        let mut ping = interval(Duration::from_secs(PING_INTERVAL_SECS));
        loop {
            let frame = tokio::select! {
                next = outbox_rx.recv() => match next {
                    Some(message) => match serde_json::to_string(&message) {
                        Ok(json) => Message::Text(json),
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize WebSocket frame");
                            continue;
                        }
                    },
                    None => break,
                },
                _ = ping.tick() => Message::Ping(Vec::new()),
            };
            if sink.send(frame).await.is_err() {
                debug!("Client disconnected while sending");
                break;
            }
        }
        debug!("WebSocket send task terminated");
    });

    let mut recv_task = tokio::spawn(async move {
        let mut subscriptions = Subscriptions::default();
        let timeout = tokio::time::sleep(Duration::from_secs(IDLE_TIMEOUT_SECS));
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                frame = stream.next() => {
                    let Some(Ok(frame)) = frame else { break };
                    timeout.as_mut().reset(tokio::time::Instant::now() + Duration::from_secs(IDLE_TIMEOUT_SECS));

                    match frame {
                        Message::Text(text) => {
                            let replies = match serde_json::from_str::<ClientMessage>(&text) {
                                Ok(message) => handle_client_message(message, &ctx, &state, &outbox, &mut subscriptions).await,
                                Err(e) => vec![ServerMessage::Error { message: format!("invalid message: {e}"), channel: None }],
                            };
                            for reply in replies {
                                if outbox.send(reply).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Message::Close(_) => {
                            info!("Client requested close");
                            break;
                        }
                        _ => {}
                    }
                }
                () = &mut timeout => {
                    warn!("WebSocket idle timeout");
                    break;
                }
            }
        }

        debug!(subscriptions = subscriptions.0.len(), "WebSocket receive task terminated");
    });

    tokio::select! {
        _ = (&mut send_task) => {
            debug!("Send task completed, aborting receive task");
            recv_task.abort();
        },
        _ = (&mut recv_task) => {
            debug!("Receive task completed, aborting send task");
            send_task.abort();
        },
    }

    let count = ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
    info!(user_id = %user_id, total_connections = count, "WebSocket connection closed");
}

async fn handle_client_message(
    message: ClientMessage,
    ctx: &RequestContext,
    state: &AppState,
    outbox: &mpsc::Sender<ServerMessage>,
    subscriptions: &mut Subscriptions,
) -> Vec<ServerMessage> {
    match message {
        ClientMessage::Ping => vec![ServerMessage::Pong],
        ClientMessage::Subscribe { channels } => {
            let mut replies = Vec::with_capacity(channels.len());
            for name in channels {
                replies.push(subscribe(&name, ctx, state, outbox, subscriptions).await);
            }
            replies
        }
        ClientMessage::Unsubscribe { channels } => channels
            .into_iter()
            .map(|name| match name.parse::<Channel>() {
                Ok(channel) => {
                    if let Some(task) = subscriptions.0.remove(&channel) {
                        task.abort();
                    }
                    ServerMessage::Unsubscribed { channel: name }
                }
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                    channel: Some(name),
                },
            })
            .collect(),
    }
}

async fn subscribe(
    name: &str,
    ctx: &RequestContext,
    state: &AppState,
    outbox: &mpsc::Sender<ServerMessage>,
    subscriptions: &mut Subscriptions,
) -> ServerMessage {
    let error = |message: String| ServerMessage::Error {
        message,
        channel: Some(name.to_string()),
    };

    let channel = match name.parse::<Channel>() {
        Ok(channel) => channel,
        Err(e) => return error(e.to_string()),
    };
    if let Err(e) = state.service.authorize_channel(ctx, channel).await {
        debug!(channel = %channel, error = %e, "Subscription refused");
        return error(e.to_string());
    }

    if !subscriptions.0.contains_key(&channel) {
        let (mut rx, presence) = state.hub.subscribe_as(channel, ctx.user_id()).await;
        let outbox = outbox.clone();
        let task = tokio::spawn(async move {
            // Presence lives as long as this forwarder.
            let _presence = presence;
            loop {
                match rx.recv().await {
                    Ok(published) => {
                        let frame = ServerMessage::Event {
                            channel: published.channel.to_string(),
                            event: published.event,
                        };
                        if outbox.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(channel = %channel, skipped, "Subscriber lagged, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        subscriptions.0.insert(channel, task);
        debug!(channel = %channel, user_id = %ctx.user_id(), "Subscribed");
    }

    ServerMessage::Subscribed {
        channel: channel.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use appeals_core::{MessageId, TicketId, UserId};

    #[test]
    fn test_client_messages_parse() {
        let subscribe: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","channels":["ticket:7"]}"#).unwrap();
        assert_eq!(
            subscribe,
            ClientMessage::Subscribe {
                channels: vec!["ticket:7".into()]
            }
        );
        let ping: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, ClientMessage::Ping);
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shout"}"#).is_err());
    }

    #[test]
    fn test_event_frame_shape() {
        let frame = ServerMessage::Event {
            channel: "ticket:7".into(),
            event: RealtimeEvent::MessageRead {
                ticket_id: TicketId(7),
                user_id: UserId(2),
                message_ids: vec![MessageId(10)],
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["channel"], "ticket:7");
        assert_eq!(json["event"]["type"], "message-read");
        assert_eq!(json["event"]["messageIds"][0], 10);

        let error = serde_json::to_value(ServerMessage::Error {
            message: "nope".into(),
            channel: None,
        })
        .unwrap();
        assert!(error.get("channel").is_none());
    }
}
