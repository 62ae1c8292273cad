//! One user's open view of one room: sync controller plus interaction state.

use crate::auth::{AuthProvider, CurrentUser};
use crate::config::CanvasConfig;
use crate::error::{JoinError, SyncError, ValidationError};
use crate::input::PointerEvent;
use crate::interaction::{InteractionMachine, Tool};
use crate::model::{CanvasModel, RecordId, RgbHex, RoomId};
use crate::rooms;
use crate::store::{ConnectionState, RemoteStore};
use crate::sync::{PumpStats, SyncController};
use kurbo::Point;
use std::sync::Arc;

pub struct CanvasSession {
    sync: SyncController,
    interaction: InteractionMachine,
}

impl CanvasSession {
    /// Validate the room id, confirm the room exists and open it for the
    /// signed-in user.
    pub async fn join(
        store: Arc<dyn RemoteStore>,
        auth: &dyn AuthProvider,
        room_input: &str,
        config: CanvasConfig,
    ) -> Result<Self, JoinError> {
        let user = auth.current_user().ok_or(JoinError::NotSignedIn)?;
        let room = rooms::join_room(store.as_ref(), room_input).await?;
        let room_id = RoomId::parse(&room.id)?;
        Ok(Self::open(store, room_id, user, config))
    }

    /// Open a room without checking that it exists.
    pub fn open(store: Arc<dyn RemoteStore>, room_id: RoomId, user: CurrentUser, config: CanvasConfig) -> Self {
        Self {
            sync: SyncController::open(store, room_id, user),
            interaction: InteractionMachine::new(config),
        }
    }

    pub fn sync(&self) -> &SyncController {
        &self.sync
    }

    pub fn interaction(&self) -> &InteractionMachine {
        &self.interaction
    }

    pub fn model(&self) -> &CanvasModel {
        self.sync.model()
    }

    pub fn room_id(&self) -> &RoomId {
        self.sync.room_id()
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Down { position } => self.pointer_down(position),
            PointerEvent::Move { position } => self.pointer_move(position),
            PointerEvent::Up { .. } | PointerEvent::Leave { .. } => self.pointer_up(),
        }
    }

    pub fn pointer_down(&mut self, point: Point) {
        self.interaction.pointer_down(&mut self.sync, point);
    }

    pub fn pointer_move(&mut self, point: Point) {
        self.interaction.pointer_move(&mut self.sync, point);
    }

    pub fn pointer_up(&mut self) {
        self.interaction.pointer_up(&mut self.sync);
    }

    /// End any gesture, then switch tools.
    pub fn set_tool(&mut self, tool: Tool) {
        self.interaction.set_tool(&mut self.sync, tool);
    }

    pub fn set_color(&mut self, color: RgbHex) {
        self.interaction.set_color(color);
    }

    /// Set the color from `#rrggbb` text.
    pub fn set_color_hex(&mut self, color: &str) -> Result<(), ValidationError> {
        self.interaction.set_color(color.parse()?);
        Ok(())
    }

    pub fn set_width(&mut self, width: f64) -> Result<(), ValidationError> {
        self.interaction.set_width(width)
    }

    /// Commit the open text entry (Enter or focus loss).
    pub fn commit_text(&mut self, text: &str) -> Result<Option<RecordId>, ValidationError> {
        self.interaction.commit_text(&mut self.sync, text)
    }

    /// Close the open text entry (Escape).
    pub fn cancel_text(&mut self) {
        self.interaction.cancel_text();
    }

    pub fn clear_canvas(&mut self) -> Result<(), ValidationError> {
        self.sync.clear_canvas()
    }

    pub fn on_redraw(&mut self, callback: impl FnMut(&CanvasModel) + 'static) {
        self.sync.on_redraw(callback);
    }

    pub fn pump(&mut self) -> PumpStats {
        self.sync.pump()
    }

    pub fn take_errors(&mut self) -> Vec<SyncError> {
        self.sync.take_errors()
    }

    pub fn is_host(&self) -> bool {
        self.sync.is_host()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.sync.connection_state()
    }

    /// Leave the room.
    pub fn close(self) {
        self.sync.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuth;
    use crate::model::UserId;
    use crate::store::MemoryStore;
    use pollster::block_on;

    fn hosted_room(store: &MemoryStore, host: &str) -> RoomId {
        let room = block_on(rooms::create_room(store, &UserId::new(host))).unwrap();
        RoomId::parse(&room.id).unwrap()
    }

    #[test]
    fn test_join_requires_user_and_room() {
        let store = Arc::new(MemoryStore::new());
        let signed_out = StaticAuth::signed_out();
        let result = block_on(CanvasSession::join(store.clone(), &signed_out, "123456", CanvasConfig::default()));
        assert!(matches!(result, Err(JoinError::NotSignedIn)));

        let auth = StaticAuth::signed_in(CurrentUser::new("u1", "u1@example.com"));
        let result = block_on(CanvasSession::join(store.clone(), &auth, "123456", CanvasConfig::default()));
        assert!(matches!(result, Err(JoinError::RoomNotFound(_))));

        let result = block_on(CanvasSession::join(store, &auth, "12ab56", CanvasConfig::default()));
        assert!(matches!(result, Err(JoinError::InvalidRoomId(ValidationError::RoomIdNotNumeric))));
    }

    #[test]
    fn test_join_and_draw() {
        let store = MemoryStore::new();
        let room = hosted_room(&store, "host");
        let auth = StaticAuth::signed_in(CurrentUser::new("host", "host@example.com"));

        let mut session = block_on(CanvasSession::join(
            Arc::new(store.clone()),
            &auth,
            room.as_str(),
            CanvasConfig::default(),
        ))
        .unwrap();
        session.pump();
        assert!(session.is_host());

        session.handle_pointer(PointerEvent::Down { position: Point::new(1.0, 1.0) });
        session.handle_pointer(PointerEvent::Move { position: Point::new(10.0, 1.0) });
        session.handle_pointer(PointerEvent::Leave { position: Point::new(10.0, 1.0) });
        assert_eq!(session.model().stroke_count(), 1);
        assert_eq!(session.model().current_stroke(), None);

        session.clear_canvas().unwrap();
        assert!(session.model().is_empty());
        session.close();
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_set_tool_ends_stroke() {
        let store = MemoryStore::new();
        let room = hosted_room(&store, "host");
        let mut session = CanvasSession::open(
            Arc::new(store),
            room,
            CurrentUser::new("guest", "g@example.com"),
            CanvasConfig::default(),
        );
        session.pump();

        session.pointer_down(Point::new(0.0, 0.0));
        session.set_tool(Tool::Eraser);
        assert_eq!(session.model().current_stroke(), None);
        assert!(!session.is_host());
        assert_eq!(session.clear_canvas(), Err(ValidationError::NotHost));

        assert!(session.set_color_hex("#12ab34").is_ok());
        assert_eq!(session.interaction().color(), RgbHex::new(0x12, 0xab, 0x34));
        assert!(session.set_color_hex("blue").is_err());
    }
}
