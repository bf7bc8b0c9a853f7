//! Push-transport WebSocket endpoint (C11 §6.4).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use tracing::warn;

use crate::events::{heartbeat, SubscriptionFilter};
use crate::AppState;

/// `GET /ws`: upgrades to a WebSocket pushing `DomainEvent`s per the
/// subscriber's filter.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Subscribe {
        #[serde(default)]
        symbols: Option<Vec<String>>,
        #[serde(default)]
        account_ids: Option<Vec<String>>,
        #[serde(default)]
        event_kinds: Option<Vec<String>>,
    },
    Unsubscribe,
    Ping,
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut sub = state.events.subscribe(SubscriptionFilter::default());
    let mut heartbeat_tick = tokio::time::interval(crate::events::HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            Some(event) = sub.recv() => {
                let msg = serde_json::to_string(&event).unwrap_or_else(|e| {
                    warn!("failed to serialize ws event: {e}");
                    "{}".to_string()
                });
                if socket.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            _ = heartbeat_tick.tick() => {
                let msg = serde_json::to_string(&heartbeat()).unwrap_or_else(|_| "{}".to_string());
                if socket.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                let Some(Ok(msg)) = incoming else { break };
                match msg {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { symbols, account_ids, event_kinds }) => {
                                sub.set_filter(SubscriptionFilter { symbols, account_ids, event_kinds });
                            }
                            Ok(ClientMessage::Unsubscribe) => {
                                sub.set_filter(SubscriptionFilter::default());
                            }
                            Ok(ClientMessage::Ping) => {
                                let pong = serde_json::json!({ "type": "pong" });
                                if socket.send(Message::Text(pong.to_string())).await.is_err() {
                                    break;
                                }
                            }
                            Err(_) => {}
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
}
