//! Wire protocol between a store client and the store server.
//!
//! JSON text frames, one message per frame. Subscriptions and requests carry
//! client-chosen ids so replies can be routed.

use super::StorePath;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start delivering snapshots of `path`
    Subscribe { sub: u64, path: StorePath },
    Unsubscribe { sub: u64 },
    /// One-shot read
    Get { req: u64, path: StorePath },
    Set { req: u64, path: StorePath, value: Value },
    Update {
        req: u64,
        path: StorePath,
        fields: Map<String, Value>,
    },
    Remove { req: u64, path: StorePath },
}

impl ClientMessage {
    /// Request id, for messages that expect a reply.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ClientMessage::Get { req, .. }
            | ClientMessage::Set { req, .. }
            | ClientMessage::Update { req, .. }
            | ClientMessage::Remove { req, .. } => Some(*req),
            ClientMessage::Subscribe { .. } | ClientMessage::Unsubscribe { .. } => None,
        }
    }
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full value at a subscribed path
    Snapshot { sub: u64, value: Option<Value> },
    /// Write applied
    Ack { req: u64 },
    /// Reply to a get
    Value { req: u64, value: Option<Value> },
    /// Write refused
    Rejected { req: u64, reason: String },
    /// Error message
    Error { message: String },
}
