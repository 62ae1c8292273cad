//! Error taxonomy for the canvas core.
//!
//! - [`SyncError`]: transient failures (subscription errors, rejected writes,
//!   undecodable records). Logged and collected; the next snapshot heals state.
//! - [`JoinError`]: opening a room view failed. Surfaced to the caller.
//! - [`ValidationError`]: bad local input. Never reaches the store.

use crate::model::RoomId;
use crate::store::{StoreError, StorePath};
use thiserror::Error;

/// Local input rejected before any store call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Room id must be 6 digits, got {0} characters")]
    RoomIdLength(usize),
    #[error("Room id must contain only digits")]
    RoomIdNotNumeric,
    #[error("Text annotation is empty")]
    EmptyText,
    #[error("Only the room host can clear the canvas")]
    NotHost,
    #[error("Invalid color: {0}")]
    InvalidColor(String),
    #[error("Invalid stroke width: {0}")]
    InvalidWidth(f64),
    #[error("Invalid value for {name}: {value}")]
    InvalidSetting { name: &'static str, value: f64 },
}

/// Transient sync failure.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Subscription to {path} failed: {source}")]
    Subscription {
        path: StorePath,
        #[source]
        source: StoreError,
    },
    #[error("Write to {path} failed: {source}")]
    WriteFailed {
        path: StorePath,
        #[source]
        source: StoreError,
    },
    #[error("Could not decode record at {path}: {message}")]
    Decode { path: StorePath, message: String },
}

/// Failure to open a room view.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error(transparent)]
    InvalidRoomId(#[from] ValidationError),
    #[error("Room {0} not found")]
    RoomNotFound(RoomId),
    #[error("No signed-in user")]
    NotSignedIn,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
