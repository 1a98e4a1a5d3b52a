//! `wapoll` binary entry point.

use std::sync::Arc;

use clap::Parser;
use tracing::debug;
use wapoll_agent::cli::Cli;
use wapoll_agent::commands::{resolve_settings, run, select_backend};
use wapoll_core::logging::init_subscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Arc::new(resolve_settings(&cli)?);
    let _ = init_subscriber(&settings.logging.to_log_options());

    let backend = select_backend(cli.backend)?;
    debug!(store = %settings.store.database_url, backend = backend.name(), "starting");
    run(cli, settings, backend).await
}
