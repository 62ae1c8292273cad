//! Sync controller: keeps a room's [`CanvasModel`] in step with the remote
//! store.
//!
//! The controller holds three subscriptions (strokes, texts and the room's
//! host id) and applies every delivered snapshot as a full replacement of the
//! matching collection. Local edits are applied to the model first and then
//! written; while a write to a record is in flight, incoming snapshots keep
//! the local version of that record so a late snapshot cannot roll it back.
//!
//! Nothing here blocks. Call [`SyncController::pump`] once per frame (or
//! whenever convenient) to apply queued snapshots and collect finished writes.

use crate::auth::CurrentUser;
use crate::error::{SyncError, ValidationError};
use crate::hit_test::EraseTargets;
use crate::model::{decode_records, CanvasModel, RecordId, Record, RoomId, Stroke, TextAnnotation};
use crate::store::{paths, BoxFuture, ConnectionState, RemoteStore, SnapshotEvent, StorePath, StoreResult, Subscription};
use kurbo::Point;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Called with the model after every change, local or remote.
pub type RedrawCallback = Box<dyn FnMut(&CanvasModel)>;

/// What one [`SyncController::pump`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub snapshots: usize,
    pub completed_writes: usize,
    pub failed_writes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedKind {
    Strokes,
    Texts,
    Host,
}

impl FeedKind {
    const ALL: [FeedKind; 3] = [FeedKind::Strokes, FeedKind::Texts, FeedKind::Host];
}

struct Feed {
    path: StorePath,
    subscription: Subscription,
    /// At least one snapshot applied.
    synced: bool,
}

impl Feed {
    fn open(store: &dyn RemoteStore, path: StorePath) -> Self {
        let subscription = store.subscribe(&path);
        Self {
            path,
            subscription,
            synced: false,
        }
    }
}

/// In-flight write counts per target path.
#[derive(Debug, Default)]
struct PendingWrites {
    counts: HashMap<StorePath, usize>,
}

impl PendingWrites {
    fn begin(&mut self, path: &StorePath) {
        *self.counts.entry(path.clone()).or_insert(0) += 1;
    }

    fn finish(&mut self, path: &StorePath) {
        if let Some(count) = self.counts.get_mut(path) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(path);
            }
        }
    }

    /// A write to the collection itself, or above it, is in flight.
    fn covers(&self, collection: &StorePath) -> bool {
        self.counts.keys().any(|pending| collection.starts_with(pending))
    }

    /// Keys of records under `collection` with a write in flight.
    fn records_under<'a>(&'a self, collection: &StorePath) -> BTreeSet<&'a str> {
        self.counts
            .keys()
            .filter_map(|pending| pending.child_key_under(collection))
            .collect()
    }

    fn len(&self) -> usize {
        self.counts.values().sum()
    }
}

struct InFlightWrite {
    path: StorePath,
    completion: BoxFuture<'static, StoreResult<()>>,
}

/// Merge a decoded snapshot with local records that have writes in flight.
fn reconcile<T: Record>(
    local: &BTreeMap<RecordId, T>,
    mut incoming: BTreeMap<RecordId, T>,
    collection: &StorePath,
    pending: &PendingWrites,
) -> BTreeMap<RecordId, T> {
    if pending.covers(collection) {
        return local.clone();
    }
    for id in pending.records_under(collection) {
        match local.get(id) {
            Some(record) => {
                incoming.insert(id.to_string(), record.clone());
            }
            None => {
                incoming.remove(id);
            }
        }
    }
    incoming
}

/// Owns the model for one open room.
pub struct SyncController {
    room_id: RoomId,
    user: CurrentUser,
    store: Arc<dyn RemoteStore>,
    model: CanvasModel,
    strokes: Feed,
    texts: Feed,
    host: Feed,
    is_host: bool,
    pending: PendingWrites,
    in_flight: Vec<InFlightWrite>,
    listeners: Vec<RedrawCallback>,
    errors: Vec<SyncError>,
}

impl SyncController {
    /// Subscribe to the room's strokes, texts and host id. Snapshots are
    /// applied on the next [`pump`](Self::pump).
    pub fn open(store: Arc<dyn RemoteStore>, room_id: RoomId, user: CurrentUser) -> Self {
        log::info!("Opening room {} as {}", room_id, user.uid);
        let strokes = Feed::open(store.as_ref(), paths::strokes(&room_id));
        let texts = Feed::open(store.as_ref(), paths::texts(&room_id));
        let host = Feed::open(store.as_ref(), paths::room_host(&room_id));
        Self {
            room_id,
            user,
            store,
            model: CanvasModel::new(),
            strokes,
            texts,
            host,
            is_host: false,
            pending: PendingWrites::default(),
            in_flight: Vec::new(),
            listeners: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Cancel all subscriptions. Writes already issued still complete on the
    /// store side.
    pub fn close(self) {
        log::info!(
            "Closing room {} ({} writes in flight)",
            self.room_id,
            self.in_flight.len()
        );
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn model(&self) -> &CanvasModel {
        &self.model
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// True if the room's host id equals the current user's uid.
    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// Both collections have delivered at least one snapshot.
    pub fn is_synced(&self) -> bool {
        self.strokes.synced && self.texts.synced
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.store.connection_state()
    }

    pub fn pending_write_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Register a redraw callback.
    pub fn on_redraw(&mut self, callback: impl FnMut(&CanvasModel) + 'static) {
        self.listeners.push(Box::new(callback));
    }

    /// Errors collected since the last call.
    pub fn take_errors(&mut self) -> Vec<SyncError> {
        std::mem::take(&mut self.errors)
    }

    /// Apply queued snapshots, then collect finished writes.
    pub fn pump(&mut self) -> PumpStats {
        let mut stats = PumpStats::default();
        for kind in FeedKind::ALL {
            while let Some(event) = self.feed_mut(kind).subscription.try_next() {
                stats.snapshots += 1;
                self.apply_event(kind, event);
            }
        }
        self.poll_writes(&mut stats);
        stats
    }

    fn feed_mut(&mut self, kind: FeedKind) -> &mut Feed {
        match kind {
            FeedKind::Strokes => &mut self.strokes,
            FeedKind::Texts => &mut self.texts,
            FeedKind::Host => &mut self.host,
        }
    }

    fn apply_event(&mut self, kind: FeedKind, event: SnapshotEvent) {
        match event {
            SnapshotEvent::Value(value) => match kind {
                FeedKind::Strokes => self.apply_strokes_snapshot(value.as_ref()),
                FeedKind::Texts => self.apply_texts_snapshot(value.as_ref()),
                FeedKind::Host => self.apply_host_snapshot(value.as_ref()),
            },
            SnapshotEvent::Error(source) => {
                let path = self.feed_mut(kind).path.clone();
                log::warn!("Subscription to {} failed: {}", path, source);
                self.errors.push(SyncError::Subscription { path, source });
            }
        }
    }

    /// Replace the stroke collection with a snapshot (absent means empty).
    pub fn apply_strokes_snapshot(&mut self, value: Option<&Value>) {
        let decoded = decode_records::<Stroke>(value);
        self.report_rejected(&self.strokes.path.clone(), decoded.rejected);
        let merged = reconcile(self.model.stroke_map(), decoded.records, &self.strokes.path, &self.pending);
        self.model.replace_strokes(merged);
        self.strokes.synced = true;
        self.notify();
    }

    /// Replace the text collection with a snapshot (absent means empty).
    pub fn apply_texts_snapshot(&mut self, value: Option<&Value>) {
        let decoded = decode_records::<TextAnnotation>(value);
        self.report_rejected(&self.texts.path.clone(), decoded.rejected);
        let merged = reconcile(self.model.text_map(), decoded.records, &self.texts.path, &self.pending);
        self.model.replace_texts(merged);
        self.texts.synced = true;
        self.notify();
    }

    pub fn apply_host_snapshot(&mut self, value: Option<&Value>) {
        let host_id = value.and_then(Value::as_str);
        self.is_host = host_id == Some(self.user.uid.as_str());
        self.host.synced = true;
        log::debug!("Room {} host is {:?} (local host: {})", self.room_id, host_id, self.is_host);
    }

    fn report_rejected(&mut self, collection: &StorePath, rejected: Vec<(RecordId, String)>) {
        for (id, message) in rejected {
            let path = collection.child(&id);
            log::warn!("Skipping malformed record at {}: {}", path, message);
            self.errors.push(SyncError::Decode { path, message });
        }
    }

    fn notify(&mut self) {
        let model = &self.model;
        for listener in self.listeners.iter_mut() {
            listener(model);
        }
    }

    fn track(&mut self, path: StorePath, completion: BoxFuture<'static, StoreResult<()>>) {
        self.pending.begin(&path);
        self.in_flight.push(InFlightWrite { path, completion });
    }

    fn poll_writes(&mut self, stats: &mut PumpStats) {
        let mut cx = Context::from_waker(Waker::noop());
        let mut failed = Vec::new();
        let mut i = 0;
        while i < self.in_flight.len() {
            match self.in_flight[i].completion.as_mut().poll(&mut cx) {
                Poll::Ready(result) => {
                    let write = self.in_flight.swap_remove(i);
                    self.pending.finish(&write.path);
                    match result {
                        Ok(()) => stats.completed_writes += 1,
                        Err(source) => {
                            stats.failed_writes += 1;
                            log::warn!("Write to {} failed: {}", write.path, source);
                            failed.push(write.path.clone());
                            self.errors.push(SyncError::WriteFailed {
                                path: write.path,
                                source,
                            });
                        }
                    }
                }
                Poll::Pending => i += 1,
            }
        }
        for path in failed {
            self.refresh(&path);
        }
    }

    /// Re-subscribe the collection a failed write touched so the store's
    /// value replaces the rejected local edit.
    fn refresh(&mut self, failed: &StorePath) {
        for kind in [FeedKind::Strokes, FeedKind::Texts] {
            let store = self.store.clone();
            let feed = self.feed_mut(kind);
            if failed.overlaps(&feed.path) {
                log::debug!("Refreshing {} after failed write", feed.path);
                feed.subscription = store.subscribe(&feed.path);
            }
        }
    }

    // --- Local edits ---

    /// Push a new stroke, insert it locally and make it the current stroke.
    pub fn begin_stroke(&mut self, mut stroke: Stroke) -> RecordId {
        let value = match serde_json::to_value(&stroke) {
            Ok(value) => value,
            Err(e) => {
                log::error!("Failed to encode stroke: {}", e);
                return RecordId::new();
            }
        };
        let push = self.store.push(&self.strokes.path, value);
        stroke.id = push.key.clone();
        self.track(paths::stroke(&self.room_id, &push.key), push.completion);

        self.model.insert_stroke(stroke);
        self.model.set_current_stroke(Some(push.key.clone()));
        self.notify();
        push.key
    }

    /// Append a point to the current stroke and write its whole point list.
    /// Returns false if there is no current stroke or it has been deleted.
    pub fn extend_current_stroke(&mut self, point: Point) -> bool {
        let Some(id) = self.model.current_stroke().map(str::to_string) else {
            return false;
        };
        let points = match self.model.append_point(&id, point) {
            Some(stroke) => serde_json::to_value(&stroke.points),
            None => return false,
        };
        self.notify();

        match points {
            Ok(points) => {
                let path = paths::stroke(&self.room_id, &id);
                let mut fields = Map::new();
                fields.insert("points".to_string(), points);
                let completion = self.store.update(&path, fields);
                self.track(path, completion);
            }
            Err(e) => log::error!("Failed to encode stroke points: {}", e),
        }
        true
    }

    pub fn end_stroke(&mut self) {
        self.model.set_current_stroke(None);
    }

    /// Remove the targets locally and in the store. Returns how many records
    /// were removed.
    pub fn erase(&mut self, targets: &EraseTargets) -> usize {
        let mut removed = Vec::new();
        for id in &targets.strokes {
            if self.model.remove_stroke(id).is_some() {
                removed.push(paths::stroke(&self.room_id, id));
            }
        }
        if let Some(id) = &targets.text {
            if self.model.remove_text(id).is_some() {
                removed.push(paths::text(&self.room_id, id));
            }
        }
        if removed.is_empty() {
            return 0;
        }

        self.notify();
        let count = removed.len();
        for path in removed {
            let completion = self.store.remove(&path);
            self.track(path, completion);
        }
        count
    }

    /// Push a text annotation and insert it locally.
    pub fn add_text(&mut self, mut text: TextAnnotation) -> RecordId {
        let value = match serde_json::to_value(&text) {
            Ok(value) => value,
            Err(e) => {
                log::error!("Failed to encode text: {}", e);
                return RecordId::new();
            }
        };
        let push = self.store.push(&self.texts.path, value);
        text.id = push.key.clone();
        self.track(paths::text(&self.room_id, &push.key), push.completion);

        self.model.insert_text(text);
        self.notify();
        push.key
    }

    /// Empty both collections. Host only.
    pub fn clear_canvas(&mut self) -> Result<(), ValidationError> {
        if !self.is_host {
            return Err(ValidationError::NotHost);
        }
        log::info!("Clearing canvas of room {}", self.room_id);
        self.model.clear();
        self.notify();

        for path in [self.strokes.path.clone(), self.texts.path.clone()] {
            let completion = self.store.set(&path, Value::Object(Map::new()));
            self.track(path, completion);
        }
        Ok(())
    }
}
