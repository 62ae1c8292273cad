//! Main application entry point (native).

use clap::Parser;
use inkroom_app::cli::Cli;

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    log::info!("Starting inkroom against {}", cli.global.server);

    if let Err(e) = pollster::block_on(inkroom_app::run(cli)) {
        log::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
