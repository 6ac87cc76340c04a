//! WebSocket push channel.
//!
//! Purely observational: clients receive a connection acknowledgement and
//! subsequent sync status events. No client-to-server messages are
//! defined beyond connection lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use super::AppState;

/// Event pushed to connected dashboard clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    ConnectionEstablished { timestamp: String },
    SyncStatus { status: String, message: String },
}

/// Decrements the connection count when a client goes away.
struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.ws_connections.load(Ordering::SeqCst) >= state.ws_max_connections {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    state.ws_connections.fetch_add(1, Ordering::SeqCst);
    let _guard = ConnectionGuard(state.ws_connections.clone());
    info!("WebSocket client connected");

    let established = PushEvent::ConnectionEstablished {
        timestamp: Utc::now().to_rfc3339(),
    };
    if send_event(&mut socket, &established).await.is_err() {
        return;
    }

    let mut events = state.events.subscribe();
    let mut heartbeat = tokio::time::interval(state.ws_heartbeat_interval);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut socket, &event).await.is_err() {
                        break;
                    }
                }
                // Slow consumers skip missed events and continue
                Err(RecvError::Lagged(missed)) => {
                    debug!("WebSocket client lagged, skipped {} events", missed);
                }
                Err(RecvError::Closed) => break,
            },
            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => match message {
                // Inbound frames are ignored; only lifecycle matters
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    info!("WebSocket client disconnected");
}

async fn send_event(socket: &mut WebSocket, event: &PushEvent) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(event).unwrap_or_default();
    socket.send(Message::Text(payload)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_event_serialization() {
        let event = PushEvent::SyncStatus {
            status: "buffered".to_string(),
            message: "Rate limit exceeded".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sync_status");
        assert_eq!(json["status"], "buffered");

        let event = PushEvent::ConnectionEstablished {
            timestamp: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connection_established");
        assert!(json["timestamp"].is_string());
    }
}
