//! Inkroom WebSocket Store Server
//!
//! Hosts one JSON tree shared by every client. Clients subscribe to paths and
//! receive the full value at a path whenever anything under or above it
//! changes.
//!
//! ## Protocol
//!
//! JSON text frames tagged by `type`:
//! ```json
//! { "type": "subscribe", "sub": 1, "path": "rooms/123456/strokes" }
//! { "type": "set", "req": 2, "path": "rooms/123456/hostId", "value": "uid" }
//! { "type": "snapshot", "sub": 1, "value": { "-Nabc...": { "width": 3 } } }
//! { "type": "ack", "req": 2 }
//! ```

mod hub;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use hub::{Hub, Subscriptions};
use inkroom_core::store::protocol::{ClientMessage, ServerMessage};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_BIND: &str = "0.0.0.0:3030";

/// Per-connection bookkeeping shown on `/stats`.
#[derive(Debug, Clone, Default, Serialize)]
struct ConnectionInfo {
    subscriptions: usize,
    messages: u64,
}

/// Shared application state
struct AppState {
    hub: Hub,
    connections: DashMap<String, ConnectionInfo>,
}

impl AppState {
    fn new() -> Self {
        Self {
            hub: Hub::new(),
            connections: DashMap::new(),
        }
    }

    fn record(&self, peer_id: &str, subscriptions: usize) {
        if let Some(mut info) = self.connections.get_mut(peer_id) {
            info.subscriptions = subscriptions;
            info.messages += 1;
        }
    }
}

#[derive(Debug, Serialize)]
struct Stats {
    connections: usize,
    subscriptions: usize,
    writes: u64,
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkroom_server=info,tower_http=info".into()),
        )
        .init();

    let addr = std::env::var("INKROOM_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");
    info!("Inkroom store server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    if let Err(e) = axum::serve(listener, app(Arc::new(AppState::new()))).await {
        warn!("Server stopped: {}", e);
    }
}

/// Index page
async fn index() -> &'static str {
    "Inkroom Store Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<Stats> {
    let subscriptions = state.connections.iter().map(|entry| entry.subscriptions).sum();
    Json(Stats {
        connections: state.connections.len(),
        subscriptions,
        writes: state.hub.write_count(),
    })
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_all(
    sender: &mut (impl SinkExt<Message> + Unpin),
    messages: Vec<ServerMessage>,
) -> Result<(), ()> {
    for msg in messages {
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode {:?}: {}", msg, e);
                continue;
            }
        };
        sender.send(Message::Text(json.into())).await.map_err(|_| ())?;
    }
    Ok(())
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4().to_string();
    info!("New connection: {}", peer_id);
    state.connections.insert(peer_id.clone(), ConnectionInfo::default());

    let (mut sender, mut receiver) = socket.split();
    let mut changes = state.hub.changes();
    let mut subs = Subscriptions::new();

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let replies = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                debug!("{} -> {:?}", peer_id, client_msg);
                                state.hub.handle(client_msg, &mut subs).await
                            }
                            Err(e) => {
                                warn!("Invalid message from {}: {}", peer_id, e);
                                vec![ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                }]
                            }
                        };
                        state.record(&peer_id, subs.len());
                        if send_all(&mut sender, replies).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore binary/ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            // Push snapshots for changed paths
            changed = changes.recv() => {
                let snapshots = match changed {
                    Ok(path) => state.hub.snapshots_for(&path, &subs).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!("{} lagged by {} changes, resending all", peer_id, missed);
                        state.hub.snapshots_all(&subs).await
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if send_all(&mut sender, snapshots).await.is_err() {
                    break;
                }
            }
        }
    }

    state.connections.remove(&peer_id);
    info!("Connection closed: {}", peer_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    async fn spawn_server() -> (String, Arc<AppState>) {
        let state = Arc::new(AppState::new());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("ws://{}/ws", addr), state)
    }

    async fn recv<S>(ws: &mut S) -> ServerMessage
    where
        S: StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let WsMessage::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn send<S>(ws: &mut S, msg: &ClientMessage)
    where
        S: SinkExt<WsMessage> + Unpin,
        S::Error: std::fmt::Debug,
    {
        ws.send(WsMessage::text(serde_json::to_string(msg).unwrap())).await.unwrap();
    }

    #[tokio::test]
    async fn test_websocket_round_trip() {
        let (url, state) = spawn_server().await;
        let (mut alice, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let (mut bob, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let strokes = inkroom_core::StorePath::new("rooms/123456/strokes");

        send(&mut bob, &ClientMessage::Subscribe { sub: 1, path: strokes.clone() }).await;
        assert_eq!(recv(&mut bob).await, ServerMessage::Snapshot { sub: 1, value: None });

        send(
            &mut alice,
            &ClientMessage::Set { req: 10, path: strokes.child("k1"), value: json!({"width": 3}) },
        )
        .await;
        assert_eq!(recv(&mut alice).await, ServerMessage::Ack { req: 10 });
        assert_eq!(
            recv(&mut bob).await,
            ServerMessage::Snapshot { sub: 1, value: Some(json!({"k1": {"width": 3}})) }
        );

        send(&mut alice, &ClientMessage::Get { req: 11, path: strokes.child("k1/width") }).await;
        assert_eq!(recv(&mut alice).await, ServerMessage::Value { req: 11, value: Some(json!(3)) });

        send(&mut alice, &ClientMessage::Remove { req: 12, path: strokes.clone() }).await;
        assert_eq!(recv(&mut alice).await, ServerMessage::Ack { req: 12 });
        assert_eq!(recv(&mut bob).await, ServerMessage::Snapshot { sub: 1, value: None });

        assert_eq!(state.hub.write_count(), 2);
        assert_eq!(state.connections.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_message_reports_error() {
        let (url, _state) = spawn_server().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        ws.send(WsMessage::text("{\"type\":\"bogus\"}")).await.unwrap();
        assert!(matches!(recv(&mut ws).await, ServerMessage::Error { .. }));
    }
}
