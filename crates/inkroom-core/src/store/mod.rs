//! Remote hierarchical store abstraction.
//!
//! The canvas talks to a JSON tree addressed by slash-separated paths. A
//! subscription delivers the full value at its path once on attach and again
//! after every change at, above or below that path.

pub mod keys;
mod memory;
pub mod protocol;
pub mod tree;

#[cfg(not(target_arch = "wasm32"))]
mod websocket;

pub use keys::PushKeyGenerator;
pub use memory::MemoryStore;

#[cfg(not(target_arch = "wasm32"))]
pub use websocket::WsStore;

use crate::model::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Path not found: {0}")]
    NotFound(StorePath),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Write to {path} rejected: {reason}")]
    Rejected { path: StorePath, reason: String },
    #[error("Store connection lost")]
    Disconnected,
    #[error("Store error: {0}")]
    Other(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future for store completions.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Connection state of a store client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Normalized slash-separated location in the store tree. The empty path is
/// the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct StorePath(String);

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        Self(segments.join("/"))
    }

    /// Path of a child; `segment` may itself contain slashes.
    pub fn child(&self, segment: &str) -> Self {
        if self.is_root() {
            Self::new(segment)
        } else {
            Self::new(&format!("{}/{}", self.0, segment))
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind('/') {
            Some(idx) => Self(self.0[..idx].to_string()),
            None => Self::root(),
        })
    }

    pub fn last(&self) -> Option<&str> {
        self.segments().last()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `self` equals `ancestor` or lies beneath it.
    pub fn starts_with(&self, ancestor: &StorePath) -> bool {
        let mut mine = self.segments();
        ancestor.segments().all(|seg| mine.next() == Some(seg))
    }

    /// True if a change at one path can alter the value at the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// First segment of `self` below `ancestor`, if `self` is strictly beneath it.
    pub fn child_key_under(&self, ancestor: &StorePath) -> Option<&str> {
        if !self.starts_with(ancestor) {
            return None;
        }
        self.segments().nth(ancestor.segments().count())
    }
}

impl From<String> for StorePath {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for StorePath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<StorePath> for String {
    fn from(value: StorePath) -> Self {
        value.0
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

/// Well-known locations in the store.
pub mod paths {
    use super::StorePath;
    use crate::model::RoomId;

    pub fn rooms() -> StorePath {
        StorePath::new("rooms")
    }

    pub fn room(room: &RoomId) -> StorePath {
        rooms().child(room.as_str())
    }

    pub fn room_host(room: &RoomId) -> StorePath {
        self::room(room).child("hostId")
    }

    pub fn strokes(room: &RoomId) -> StorePath {
        self::room(room).child("strokes")
    }

    pub fn stroke(room: &RoomId, id: &str) -> StorePath {
        strokes(room).child(id)
    }

    pub fn texts(room: &RoomId) -> StorePath {
        self::room(room).child("texts")
    }

    pub fn text(room: &RoomId, id: &str) -> StorePath {
        texts(room).child(id)
    }

    pub fn online_users() -> StorePath {
        StorePath::new("onlineUsers")
    }
}

/// One delivery on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent {
    /// Full current value at the subscribed path; `None` when absent.
    Value(Option<Value>),
    Error(StoreError),
}

/// Live subscription handle. Dropping it cancels the subscription.
pub struct Subscription {
    path: StorePath,
    rx: mpsc::UnboundedReceiver<SnapshotEvent>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        path: StorePath,
        rx: mpsc::UnboundedReceiver<SnapshotEvent>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            path,
            rx,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Next queued delivery, without waiting.
    pub fn try_next(&mut self) -> Option<SnapshotEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next delivery. `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        self.rx.recv().await
    }

    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("path", &self.path).finish()
    }
}

/// Result of a push: the generated key and the write completion.
pub struct PushRef {
    pub key: RecordId,
    pub completion: BoxFuture<'static, StoreResult<()>>,
}

/// A remote JSON tree with per-path subscriptions.
///
/// Writes return immediately with a completion future; callers that do not
/// care about the outcome may drop it and the write still goes through.
pub trait RemoteStore: Send + Sync {
    /// Attach a listener at `path`. The current value is delivered first.
    fn subscribe(&self, path: &StorePath) -> Subscription;

    /// One-shot read.
    fn get(&self, path: &StorePath) -> BoxFuture<'static, StoreResult<Option<Value>>>;

    /// Replace the value at `path`. Null or an empty object deletes it.
    fn set(&self, path: &StorePath, value: Value) -> BoxFuture<'static, StoreResult<()>>;

    /// Set each field (a relative path) under `path` in one atomic change.
    fn update(&self, path: &StorePath, fields: Map<String, Value>) -> BoxFuture<'static, StoreResult<()>>;

    fn remove(&self, path: &StorePath) -> BoxFuture<'static, StoreResult<()>>;

    /// A fresh, chronologically ordered key.
    fn generate_key(&self) -> RecordId;

    /// Store `value` under a freshly generated child key of `path`.
    fn push(&self, path: &StorePath, value: Value) -> PushRef {
        let key = self.generate_key();
        let completion = self.set(&path.child(&key), value);
        PushRef { key, completion }
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Connected
    }
}

pub(crate) fn ready<T: Send + 'static>(value: T) -> BoxFuture<'static, T> {
    Box::pin(std::future::ready(value))
}
