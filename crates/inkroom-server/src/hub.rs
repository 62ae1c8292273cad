//! The shared tree and the per-connection subscription table.

use inkroom_core::store::protocol::{ClientMessage, ServerMessage};
use inkroom_core::store::{tree, StorePath};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};

const CHANNEL_CAPACITY: usize = 256;

/// Subscription id to subscribed path, owned by one connection.
pub type Subscriptions = HashMap<u64, StorePath>;

/// Holds the tree and announces every changed path.
pub struct Hub {
    tree: RwLock<Value>,
    changes: broadcast::Sender<StorePath>,
    writes: AtomicU64,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tree: RwLock::new(Value::Object(Map::new())),
            changes,
            writes: AtomicU64::new(0),
        }
    }

    /// Receiver for the paths written from now on.
    pub fn changes(&self) -> broadcast::Receiver<StorePath> {
        self.changes.subscribe()
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub async fn get(&self, path: &StorePath) -> Option<Value> {
        tree::get(&*self.tree.read().await, path).cloned()
    }

    pub async fn set(&self, path: &StorePath, value: Value) {
        tree::set(&mut *self.tree.write().await, path, value);
        self.changed(path);
    }

    pub async fn update(&self, path: &StorePath, fields: Map<String, Value>) {
        tree::update(&mut *self.tree.write().await, path, fields);
        self.changed(path);
    }

    pub async fn remove(&self, path: &StorePath) {
        tree::remove(&mut *self.tree.write().await, path);
        self.changed(path);
    }

    fn changed(&self, path: &StorePath) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        // No receivers just means nobody is connected.
        let _ = self.changes.send(path.clone());
    }

    /// Apply one client message and return the direct replies.
    pub async fn handle(&self, msg: ClientMessage, subs: &mut Subscriptions) -> Vec<ServerMessage> {
        match msg {
            ClientMessage::Subscribe { sub, path } => {
                let value = self.get(&path).await;
                subs.insert(sub, path);
                vec![ServerMessage::Snapshot { sub, value }]
            }
            ClientMessage::Unsubscribe { sub } => {
                subs.remove(&sub);
                Vec::new()
            }
            ClientMessage::Get { req, path } => {
                let value = self.get(&path).await;
                vec![ServerMessage::Value { req, value }]
            }
            ClientMessage::Set { req, path, value } => {
                if path.is_root() {
                    return vec![ServerMessage::Rejected {
                        req,
                        reason: "Refusing to replace the root".to_string(),
                    }];
                }
                self.set(&path, value).await;
                vec![ServerMessage::Ack { req }]
            }
            ClientMessage::Update { req, path, fields } => {
                if let Some(bad) = fields.keys().find(|k| StorePath::new(k).is_root()) {
                    return vec![ServerMessage::Rejected {
                        req,
                        reason: format!("Invalid field key '{}'", bad),
                    }];
                }
                self.update(&path, fields).await;
                vec![ServerMessage::Ack { req }]
            }
            ClientMessage::Remove { req, path } => {
                self.remove(&path).await;
                vec![ServerMessage::Ack { req }]
            }
        }
    }

    /// Fresh snapshots for every subscription the change touches.
    pub async fn snapshots_for(&self, changed: &StorePath, subs: &Subscriptions) -> Vec<ServerMessage> {
        let tree = self.tree.read().await;
        let mut touched: Vec<(&u64, &StorePath)> = subs.iter().filter(|(_, path)| path.overlaps(changed)).collect();
        touched.sort_by_key(|(sub, _)| **sub);
        touched
            .into_iter()
            .map(|(sub, path)| ServerMessage::Snapshot {
                sub: *sub,
                value: tree::get(&tree, path).cloned(),
            })
            .collect()
    }

    /// Fresh snapshots for every subscription, after missed changes.
    pub async fn snapshots_all(&self, subs: &Subscriptions) -> Vec<ServerMessage> {
        self.snapshots_for(&StorePath::root(), subs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> StorePath {
        StorePath::new(p)
    }

    #[tokio::test]
    async fn test_subscribe_sends_current_value() {
        let hub = Hub::new();
        hub.set(&path("rooms/123456/hostId"), json!("u1")).await;

        let mut subs = Subscriptions::new();
        let replies = hub
            .handle(ClientMessage::Subscribe { sub: 1, path: path("rooms/123456") }, &mut subs)
            .await;
        assert_eq!(
            replies,
            vec![ServerMessage::Snapshot {
                sub: 1,
                value: Some(json!({"hostId": "u1"}))
            }]
        );
        assert_eq!(subs.len(), 1);

        hub.handle(ClientMessage::Unsubscribe { sub: 1 }, &mut subs).await;
        assert!(subs.is_empty());
    }

    #[tokio::test]
    async fn test_writes_ack_and_announce() {
        let hub = Hub::new();
        let mut changes = hub.changes();
        let mut subs = Subscriptions::new();

        let replies = hub
            .handle(
                ClientMessage::Set { req: 7, path: path("rooms/1/strokes/a"), value: json!({"width": 3}) },
                &mut subs,
            )
            .await;
        assert_eq!(replies, vec![ServerMessage::Ack { req: 7 }]);
        assert_eq!(changes.recv().await.unwrap(), path("rooms/1/strokes/a"));

        let mut fields = Map::new();
        fields.insert("points".to_string(), json!([{"x": 1.0, "y": 1.0}]));
        hub.handle(ClientMessage::Update { req: 8, path: path("rooms/1/strokes/a"), fields }, &mut subs)
            .await;
        assert_eq!(
            hub.get(&path("rooms/1/strokes/a")).await,
            Some(json!({"width": 3, "points": [{"x": 1.0, "y": 1.0}]}))
        );

        hub.handle(ClientMessage::Remove { req: 9, path: path("rooms/1/strokes/a") }, &mut subs)
            .await;
        assert_eq!(hub.get(&path("rooms/1")).await, None);
        assert_eq!(hub.write_count(), 3);
    }

    #[tokio::test]
    async fn test_root_set_rejected() {
        let hub = Hub::new();
        let mut subs = Subscriptions::new();
        let replies = hub
            .handle(ClientMessage::Set { req: 1, path: StorePath::root(), value: json!({}) }, &mut subs)
            .await;
        assert!(matches!(replies.as_slice(), [ServerMessage::Rejected { req: 1, .. }]));
        assert_eq!(hub.write_count(), 0);
    }

    #[tokio::test]
    async fn test_get_value() {
        let hub = Hub::new();
        let mut subs = Subscriptions::new();
        let replies = hub.handle(ClientMessage::Get { req: 2, path: path("rooms") }, &mut subs).await;
        assert_eq!(replies, vec![ServerMessage::Value { req: 2, value: None }]);
    }

    #[tokio::test]
    async fn test_snapshots_for_overlapping_subscriptions() {
        let hub = Hub::new();
        let mut subs = Subscriptions::new();
        subs.insert(1, path("rooms/1/strokes"));
        subs.insert(2, path("rooms/1/texts"));
        subs.insert(3, path("rooms"));

        hub.set(&path("rooms/1/strokes/k"), json!({"width": 2})).await;
        let snapshots = hub.snapshots_for(&path("rooms/1/strokes/k"), &subs).await;
        assert_eq!(
            snapshots,
            vec![
                ServerMessage::Snapshot { sub: 1, value: Some(json!({"k": {"width": 2}})) },
                ServerMessage::Snapshot { sub: 3, value: Some(json!({"1": {"strokes": {"k": {"width": 2}}}})) },
            ]
        );
        assert_eq!(hub.snapshots_all(&subs).await.len(), 3);
    }
}
