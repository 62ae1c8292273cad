//! Inkroom headless client.
//!
//! Drives a `CanvasSession` against a store without a window: creates rooms,
//! replays scripted input and exports the canvas as PNG.

pub mod cli;
pub mod script;

use cli::{Cli, Command, GlobalArgs};
use inkroom_core::{
    rooms, CanvasConfig, CanvasSession, CurrentUser, JoinError, RemoteStore, RoomId, StaticAuth, StoreError, WsStore,
};
use inkroom_render::{encode_png, CanvasSurface, RendererError};
use script::ScriptStep;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

const PUMP_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Join failed: {0}")]
    Join(#[from] JoinError),
    #[error("Invalid input: {0}")]
    Validation(#[from] inkroom_core::ValidationError),
    #[error("Invalid config: {0}")]
    Config(#[from] inkroom_core::config::ConfigError),
    #[error("Render failed: {0}")]
    Render(#[from] RendererError),
    #[error("Invalid script: {0}")]
    Script(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

pub type AppResult<T> = Result<T, AppError>;

/// Run the parsed command against the configured server.
pub async fn run(cli: Cli) -> AppResult<()> {
    let store: Arc<dyn RemoteStore> = Arc::new(WsStore::connect(&cli.global.server)?);
    let config = load_config(cli.global.config.as_deref())?;
    let client = Client::new(store, &cli.global, config);

    match cli.command {
        Command::Create => {
            let room = client.create().await?;
            println!("{}", room);
        }
        Command::Snapshot { room, out } => {
            let png = client.snapshot(&room).await?;
            std::fs::write(&out, &png)?;
            log::info!("Wrote {} ({} bytes)", out.display(), png.len());
        }
        Command::Replay { room, script } => {
            let steps = script::parse_script(&std::fs::read_to_string(&script)?)?;
            let applied = client.replay(&room, &steps).await?;
            log::info!("Replayed {} of {} steps into room {}", applied, steps.len(), room);
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> AppResult<CanvasConfig> {
    match path {
        Some(path) => Ok(CanvasConfig::from_json(&std::fs::read_to_string(path)?)?),
        None => Ok(CanvasConfig::default()),
    }
}

/// One user's connection to a store.
pub struct Client {
    store: Arc<dyn RemoteStore>,
    user: CurrentUser,
    config: CanvasConfig,
    width: u32,
    height: u32,
    timeout: Duration,
}

impl Client {
    pub fn new(store: Arc<dyn RemoteStore>, args: &GlobalArgs, config: CanvasConfig) -> Self {
        Self {
            store,
            user: CurrentUser::new(args.user.clone(), args.email.clone()),
            config,
            width: args.width,
            height: args.height,
            timeout: Duration::from_secs(args.timeout),
        }
    }

    /// Create a room hosted by this user.
    pub async fn create(&self) -> AppResult<RoomId> {
        let host = self.user.uid.clone();
        let room = rooms::create_room(self.store.as_ref(), &host).await?;
        Ok(RoomId::parse(&room.id)?)
    }

    async fn join(&self, room: &str) -> AppResult<CanvasSession> {
        let auth = StaticAuth::signed_in(self.user.clone());
        Ok(CanvasSession::join(self.store.clone(), &auth, room, self.config.clone()).await?)
    }

    /// Join, wait for both collections and render them as PNG.
    pub async fn snapshot(&self, room: &str) -> AppResult<Vec<u8>> {
        let mut session = self.join(room).await?;
        let surface = Rc::new(RefCell::new(CanvasSurface::new(self.width, self.height)));
        session.on_redraw(CanvasSurface::redraw_callback(&surface));

        self.wait(&mut session, "the first snapshots", |s| s.sync().is_synced())?;
        let png = encode_png(surface.borrow().image())?;
        session.close();
        Ok(png)
    }

    /// Apply each step in order, then wait until every write is acknowledged.
    /// Returns the number of steps applied; steps that fail validation are
    /// logged and skipped.
    pub async fn replay(&self, room: &str, steps: &[ScriptStep]) -> AppResult<usize> {
        let mut session = self.join(room).await?;
        self.wait(&mut session, "the first snapshots", |s| s.sync().is_synced())?;

        let mut applied = 0;
        for step in steps {
            match step.apply(&mut session) {
                Ok(()) => applied += 1,
                Err(e) => log::warn!("Skipping {:?}: {}", step, e),
            }
            session.pump();
        }
        self.wait(&mut session, "write acknowledgements", |s| !s.sync().has_pending_writes())?;

        for error in session.take_errors() {
            log::warn!("{}", error);
        }
        session.close();
        Ok(applied)
    }

    fn wait(
        &self,
        session: &mut CanvasSession,
        what: &'static str,
        done: impl Fn(&CanvasSession) -> bool,
    ) -> AppResult<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            session.pump();
            if done(session) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AppError::Timeout(what));
            }
            std::thread::sleep(PUMP_INTERVAL);
        }
    }
}
