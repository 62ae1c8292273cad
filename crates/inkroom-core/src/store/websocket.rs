//! Store client over a WebSocket connection to an inkroom store server.
//!
//! Uses a background thread for non-blocking operation. The thread reconnects
//! with exponential backoff and re-issues every live subscription after each
//! reconnect, so subscribers get a fresh full snapshot. Requests in flight
//! when the connection drops, or issued while it is down, fail with
//! [`StoreError::Disconnected`].

use super::keys::PushKeyGenerator;
use super::protocol::{ClientMessage, ServerMessage};
use super::{
    ready, BoxFuture, ConnectionState, RemoteStore, SnapshotEvent, StoreError, StorePath, StoreResult,
    Subscription,
};
use crate::model::RecordId;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};
use url::Url;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(8);
const READ_TIMEOUT: Duration = Duration::from_millis(20);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;
type Reply = oneshot::Sender<StoreResult<Option<Value>>>;

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(ClientMessage),
    Close,
}

/// How a connected session ended.
enum SessionEnd {
    Closed,
    Dropped,
}

/// Where server messages go.
#[derive(Default)]
struct Routes {
    subscriptions: HashMap<u64, (StorePath, mpsc::UnboundedSender<SnapshotEvent>)>,
    requests: HashMap<u64, (StorePath, Reply)>,
}

impl Routes {
    fn reply(&mut self, req: u64, result: impl FnOnce(&StorePath) -> StoreResult<Option<Value>>) {
        match self.requests.remove(&req) {
            Some((path, reply)) => {
                let _ = reply.send(result(&path));
            }
            None => log::warn!("Store reply for unknown request {}", req),
        }
    }

    fn route(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Snapshot { sub, value } => {
                if let Some((_, tx)) = self.subscriptions.get(&sub) {
                    let _ = tx.send(SnapshotEvent::Value(value));
                }
            }
            ServerMessage::Ack { req } => self.reply(req, |_| Ok(None)),
            ServerMessage::Value { req, value } => self.reply(req, |_| Ok(value)),
            ServerMessage::Rejected { req, reason } => self.reply(req, |path| {
                Err(StoreError::Rejected {
                    path: path.clone(),
                    reason,
                })
            }),
            ServerMessage::Error { message } => log::warn!("Store server error: {}", message),
        }
    }

    fn fail_requests(&mut self) {
        for (_, (_, reply)) in self.requests.drain() {
            let _ = reply.send(Err(StoreError::Disconnected));
        }
    }

    fn fail_request(&mut self, msg: &ClientMessage) {
        if let Some(req) = msg.request_id() {
            self.reply(req, |_| Err(StoreError::Disconnected));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remote store reached over WebSocket.
pub struct WsStore {
    cmd_tx: Sender<WsCommand>,
    routes: Arc<Mutex<Routes>>,
    state: Arc<Mutex<ConnectionState>>,
    next_id: AtomicU64,
    keys: PushKeyGenerator,
    _thread: Option<JoinHandle<()>>,
}

impl WsStore {
    /// Start connecting to `url` (`ws://` or `wss://`). Returns immediately;
    /// requests made before the connection is up fail with `Disconnected`.
    pub fn connect(url: &str) -> StoreResult<Self> {
        // Validate URL
        let parsed_url = Url::parse(url).map_err(|e| StoreError::Other(format!("Invalid URL: {}", e)))?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(StoreError::Other(format!(
                "Invalid WebSocket URL scheme: {}",
                parsed_url.scheme()
            )));
        }

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let routes = Arc::new(Mutex::new(Routes::default()));
        let state = Arc::new(Mutex::new(ConnectionState::Connecting));

        let thread_routes = routes.clone();
        let thread_state = state.clone();
        let url = url.to_string();
        let handle = thread::spawn(move || run_connection(url, cmd_rx, thread_routes, thread_state));

        Ok(Self {
            cmd_tx,
            routes,
            state,
            next_id: AtomicU64::new(1),
            keys: PushKeyGenerator::new(),
            _thread: Some(handle),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn request(
        &self,
        path: &StorePath,
        build: impl FnOnce(u64) -> ClientMessage,
    ) -> BoxFuture<'static, StoreResult<Option<Value>>> {
        let req = self.next_id();
        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.routes).requests.insert(req, (path.clone(), reply_tx));

        if self.cmd_tx.send(WsCommand::Send(build(req))).is_err() {
            lock(&self.routes).requests.remove(&req);
            return ready(Err(StoreError::Disconnected));
        }
        Box::pin(async move { reply_rx.await.unwrap_or(Err(StoreError::Disconnected)) })
    }

    fn write(
        &self,
        path: &StorePath,
        build: impl FnOnce(u64) -> ClientMessage,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let reply = self.request(path, build);
        Box::pin(async move { reply.await.map(|_| ()) })
    }
}

impl RemoteStore for WsStore {
    fn subscribe(&self, path: &StorePath) -> Subscription {
        let sub = self.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.routes).subscriptions.insert(sub, (path.clone(), tx));
        let _ = self.cmd_tx.send(WsCommand::Send(ClientMessage::Subscribe {
            sub,
            path: path.clone(),
        }));

        let routes = self.routes.clone();
        let cmd_tx = self.cmd_tx.clone();
        Subscription::new(path.clone(), rx, move || {
            lock(&routes).subscriptions.remove(&sub);
            let _ = cmd_tx.send(WsCommand::Send(ClientMessage::Unsubscribe { sub }));
        })
    }

    fn get(&self, path: &StorePath) -> BoxFuture<'static, StoreResult<Option<Value>>> {
        let path_owned = path.clone();
        self.request(path, move |req| ClientMessage::Get { req, path: path_owned })
    }

    fn set(&self, path: &StorePath, value: Value) -> BoxFuture<'static, StoreResult<()>> {
        let path_owned = path.clone();
        self.write(path, move |req| ClientMessage::Set {
            req,
            path: path_owned,
            value,
        })
    }

    fn update(&self, path: &StorePath, fields: Map<String, Value>) -> BoxFuture<'static, StoreResult<()>> {
        let path_owned = path.clone();
        self.write(path, move |req| ClientMessage::Update {
            req,
            path: path_owned,
            fields,
        })
    }

    fn remove(&self, path: &StorePath) -> BoxFuture<'static, StoreResult<()>> {
        let path_owned = path.clone();
        self.write(path, move |req| ClientMessage::Remove { req, path: path_owned })
    }

    fn generate_key(&self) -> RecordId {
        self.keys.next_key()
    }

    fn connection_state(&self) -> ConnectionState {
        *lock(&self.state)
    }
}

impl Drop for WsStore {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

fn set_state(state: &Mutex<ConnectionState>, next: ConnectionState) {
    *lock(state) = next;
}

fn run_connection(
    url: String,
    cmd_rx: Receiver<WsCommand>,
    routes: Arc<Mutex<Routes>>,
    state: Arc<Mutex<ConnectionState>>,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        set_state(&state, ConnectionState::Connecting);
        log::info!("Store connection: connecting to {}", url);

        match connect(url.as_str()) {
            Ok((mut socket, response)) => {
                log::info!("Store connection established, status: {}", response.status());
                backoff = INITIAL_BACKOFF;
                configure_timeouts(&mut socket);
                set_state(&state, ConnectionState::Connected);

                let end = resubscribe(&mut socket, &routes).and_then(|_| run_session(&mut socket, &cmd_rx, &routes));
                lock(&routes).fail_requests();
                set_state(&state, ConnectionState::Disconnected);
                match end {
                    Ok(SessionEnd::Closed) => {
                        log::info!("Store connection closed");
                        return;
                    }
                    Ok(SessionEnd::Dropped) | Err(()) => log::warn!("Store connection lost, reconnecting"),
                }
            }
            Err(e) => {
                log::error!("Store connection failed: {}", e);
                set_state(&state, ConnectionState::Error);
            }
        }

        if wait_offline(&cmd_rx, &routes, backoff) {
            set_state(&state, ConnectionState::Disconnected);
            return;
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

fn configure_timeouts(socket: &mut Socket) {
    match socket.get_mut() {
        MaybeTlsStream::Plain(tcp) => {
            let _ = tcp.set_read_timeout(Some(READ_TIMEOUT));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }
        #[allow(unreachable_patterns)]
        _ => {
            log::debug!("TLS or other stream - using default timeout handling");
        }
    }
}

fn send_message(socket: &mut Socket, msg: &ClientMessage) -> Result<(), ()> {
    let text = serde_json::to_string(msg).map_err(|e| log::error!("Store message encode error: {}", e))?;
    socket
        .send(Message::Text(text))
        .map_err(|e| log::error!("Store send error: {}", e))
}

/// Re-issue every live subscription on a fresh connection.
fn resubscribe(socket: &mut Socket, routes: &Mutex<Routes>) -> Result<(), ()> {
    let subscriptions: Vec<ClientMessage> = lock(routes)
        .subscriptions
        .iter()
        .map(|(sub, (path, _))| ClientMessage::Subscribe {
            sub: *sub,
            path: path.clone(),
        })
        .collect();
    for msg in &subscriptions {
        send_message(socket, msg)?;
    }
    Ok(())
}

fn run_session(socket: &mut Socket, cmd_rx: &Receiver<WsCommand>, routes: &Mutex<Routes>) -> Result<SessionEnd, ()> {
    loop {
        // Drain queued commands (non-blocking)
        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => send_message(socket, &msg)?,
                Ok(WsCommand::Close) => {
                    let _ = socket.close(None);
                    return Ok(SessionEnd::Closed);
                }
                Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    return Ok(SessionEnd::Closed);
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        // Check for incoming messages (with timeout)
        match socket.read() {
            Ok(Message::Text(txt)) => match serde_json::from_str::<ServerMessage>(&txt) {
                Ok(msg) => lock(routes).route(msg),
                Err(e) => log::warn!("Failed to parse store message: {} ({})", txt, e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("Store server sent close frame");
                return Ok(SessionEnd::Dropped);
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("Store read error: {}", e);
                return Ok(SessionEnd::Dropped);
            }
        }
    }
}

/// Sleep out the backoff while failing requests issued meanwhile. Returns true
/// if the store was closed.
fn wait_offline(cmd_rx: &Receiver<WsCommand>, routes: &Mutex<Routes>, backoff: Duration) -> bool {
    let deadline = Instant::now() + backoff;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match cmd_rx.recv_timeout(remaining) {
            Ok(WsCommand::Close) | Err(RecvTimeoutError::Disconnected) => return true,
            // Subscriptions are re-issued from the routing table on reconnect.
            Ok(WsCommand::Send(msg)) => lock(routes).fail_request(&msg),
            Err(RecvTimeoutError::Timeout) => return false,
        }
    }
}
