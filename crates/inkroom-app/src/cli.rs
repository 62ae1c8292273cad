//! Command line arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "inkroom", about = "Headless client for inkroom shared canvases")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Store server WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:3030/ws")]
    pub server: String,

    /// User id to act as
    #[arg(long, default_value = "inkroom-cli")]
    pub user: String,

    #[arg(long, default_value = "cli@inkroom.local")]
    pub email: String,

    /// Canvas width in pixels
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Canvas height in pixels
    #[arg(long, default_value_t = 600)]
    pub height: u32,

    /// Interaction settings as JSON
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seconds to wait for the store before giving up
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a room hosted by --user and print its id
    Create,
    /// Render the current canvas of a room to PNG
    Snapshot {
        #[arg(long)]
        room: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Replay a JSON script of input steps into a room
    Replay {
        #[arg(long)]
        room: String,
        #[arg(long)]
        script: PathBuf,
    },
}
