//! inkroom Core Library
//!
//! Model, remote-store plumbing, sync controller and interaction state machine
//! for the inkroom shared canvas.

pub mod auth;
pub mod config;
pub mod error;
pub mod hit_test;
pub mod input;
pub mod interaction;
pub mod model;
pub mod rooms;
pub mod session;
pub mod store;
pub mod sync;

pub use auth::{AuthProvider, CurrentUser, StaticAuth};
pub use config::CanvasConfig;
pub use error::{JoinError, SyncError, ValidationError};
pub use input::{PointerEvent, ViewportMapping};
pub use interaction::{InteractionMachine, InteractionState, Tool};
pub use model::{CanvasModel, RecordId, RgbHex, Room, RoomId, Stroke, TextAnnotation, UserId};
pub use session::CanvasSession;
pub use store::{ConnectionState, MemoryStore, RemoteStore, StoreError, StorePath, Subscription};
pub use sync::{PumpStats, SyncController};

#[cfg(not(target_arch = "wasm32"))]
pub use store::WsStore;
