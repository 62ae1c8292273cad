//! In-memory store for tests and single-process use.

use super::keys::PushKeyGenerator;
use super::{
    ready, tree, BoxFuture, ConnectionState, RemoteStore, SnapshotEvent, StoreError, StorePath, StoreResult,
    Subscription,
};
use crate::model::RecordId;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

struct Subscriber {
    path: StorePath,
    tx: mpsc::UnboundedSender<SnapshotEvent>,
}

#[derive(Default)]
struct MemoryInner {
    root: Value,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber: u64,
    reject_writes: Option<String>,
    write_count: usize,
}

impl MemoryInner {
    /// Send the current value to every subscriber whose path overlaps `changed`.
    fn notify(&mut self, changed: &StorePath) {
        let MemoryInner { root, subscribers, .. } = self;
        let root: &Value = root;
        subscribers.retain(|_, sub| {
            if !sub.path.overlaps(changed) {
                return true;
            }
            let snapshot = tree::get(root, &sub.path).cloned();
            sub.tx.send(SnapshotEvent::Value(snapshot)).is_ok()
        });
    }
}

fn lock_error<T>(e: PoisonError<T>) -> StoreError {
    StoreError::Other(format!("Lock error: {}", e))
}

/// In-memory store. Writes apply synchronously and notify subscribers before
/// their completion future is returned.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
    keys: Arc<PushKeyGenerator>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail with `reason`, or accept writes again
    /// with `None`.
    pub fn reject_writes(&self, reason: Option<&str>) {
        match self.inner.write() {
            Ok(mut inner) => inner.reject_writes = reason.map(str::to_string),
            Err(e) => log::error!("MemoryStore: {}", lock_error(e)),
        }
    }

    /// Synchronous read of the current value at `path`.
    pub fn snapshot(&self, path: &StorePath) -> Option<Value> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| tree::get(&inner.root, path).cloned())
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.read().map(|inner| inner.subscribers.len()).unwrap_or(0)
    }

    /// Number of accepted writes so far.
    pub fn write_count(&self) -> usize {
        self.inner.read().map(|inner| inner.write_count).unwrap_or(0)
    }

    fn write(&self, path: &StorePath, apply: impl FnOnce(&mut Value)) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(lock_error)?;
        if let Some(reason) = &inner.reject_writes {
            log::debug!("MemoryStore: rejecting write to {}", path);
            return Err(StoreError::Rejected {
                path: path.clone(),
                reason: reason.clone(),
            });
        }
        apply(&mut inner.root);
        inner.write_count += 1;
        inner.notify(path);
        Ok(())
    }
}

impl RemoteStore for MemoryStore {
    fn subscribe(&self, path: &StorePath) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let path = path.clone();

        let mut inner = match self.inner.write() {
            Ok(inner) => inner,
            Err(e) => {
                let _ = tx.send(SnapshotEvent::Error(lock_error(e)));
                return Subscription::new(path, rx, || {});
            }
        };

        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        let _ = tx.send(SnapshotEvent::Value(tree::get(&inner.root, &path).cloned()));
        inner.subscribers.insert(
            id,
            Subscriber {
                path: path.clone(),
                tx,
            },
        );

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(path, rx, move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut inner) = inner.write() {
                    inner.subscribers.remove(&id);
                }
            }
        })
    }

    fn get(&self, path: &StorePath) -> BoxFuture<'static, StoreResult<Option<Value>>> {
        let result = self
            .inner
            .read()
            .map_err(lock_error)
            .map(|inner| tree::get(&inner.root, path).cloned());
        ready(result)
    }

    fn set(&self, path: &StorePath, value: Value) -> BoxFuture<'static, StoreResult<()>> {
        ready(self.write(path, |root| tree::set(root, path, value)))
    }

    fn update(&self, path: &StorePath, fields: Map<String, Value>) -> BoxFuture<'static, StoreResult<()>> {
        ready(self.write(path, |root| tree::update(root, path, fields)))
    }

    fn remove(&self, path: &StorePath) -> BoxFuture<'static, StoreResult<()>> {
        ready(self.write(path, |root| tree::remove(root, path)))
    }

    fn generate_key(&self) -> RecordId {
        self.keys.next_key()
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use pollster::block_on;

    #[test]
    fn test_set_and_get() {
        let store = MemoryStore::new();
        let path = StorePath::new("rooms/123456/hostId");

        block_on(store.set(&path, json!("u1"))).unwrap();
        assert_eq!(block_on(store.get(&path)).unwrap(), Some(json!("u1")));
        assert_eq!(block_on(store.get(&StorePath::new("rooms/999999"))).unwrap(), None);
    }

    #[test]
    fn test_subscribe_delivers_current_value_first() {
        let store = MemoryStore::new();
        let path = StorePath::new("a/b");
        block_on(store.set(&path, json!(1))).unwrap();

        let mut sub = store.subscribe(&path);
        assert_eq!(sub.try_next(), Some(SnapshotEvent::Value(Some(json!(1)))));
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_subscription_sees_descendant_and_ancestor_writes() {
        let store = MemoryStore::new();
        let strokes = StorePath::new("rooms/1/strokes");
        let mut sub = store.subscribe(&strokes);
        assert_eq!(sub.try_next(), Some(SnapshotEvent::Value(None)));

        block_on(store.set(&strokes.child("k1"), json!({"w": 1}))).unwrap();
        assert_eq!(sub.try_next(), Some(SnapshotEvent::Value(Some(json!({"k1": {"w": 1}})))));

        block_on(store.remove(&StorePath::new("rooms/1"))).unwrap();
        assert_eq!(sub.try_next(), Some(SnapshotEvent::Value(None)));

        block_on(store.set(&StorePath::new("rooms/1/texts/t"), json!("x"))).unwrap();
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_drop_subscription_unregisters() {
        let store = MemoryStore::new();
        let sub = store.subscribe(&StorePath::new("a"));
        assert_eq!(store.subscriber_count(), 1);
        drop(sub);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_push_generates_ordered_keys() {
        let store = MemoryStore::new();
        let strokes = StorePath::new("s");
        let first = store.push(&strokes, json!(1));
        let second = store.push(&strokes, json!(2));
        block_on(first.completion).unwrap();
        block_on(second.completion).unwrap();

        assert!(first.key < second.key);
        let all = store.snapshot(&strokes).unwrap();
        assert_eq!(all.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_rejected_writes() {
        let store = MemoryStore::new();
        let path = StorePath::new("a");
        store.reject_writes(Some("permission denied"));

        let result = block_on(store.set(&path, json!(1)));
        assert!(matches!(result, Err(StoreError::Rejected { ref reason, .. }) if reason == "permission denied"));
        assert_eq!(store.snapshot(&path), None);

        store.reject_writes(None);
        block_on(store.set(&path, json!(1))).unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_update_is_one_notification() {
        let store = MemoryStore::new();
        let path = StorePath::new("r");
        let mut sub = store.subscribe(&path);
        sub.try_next();

        let mut fields = Map::new();
        fields.insert("a".to_string(), json!(1));
        fields.insert("b/c".to_string(), json!(2));
        block_on(store.update(&path, fields)).unwrap();

        assert_eq!(sub.try_next(), Some(SnapshotEvent::Value(Some(json!({"a": 1, "b": {"c": 2}})))));
        assert_eq!(sub.try_next(), None);
    }
}
