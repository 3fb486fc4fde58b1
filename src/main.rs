use anyhow::Result;
use buildcast::config::Config;
use buildcast::logging::init_logging;
use buildcast::server::{self, AppState};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    if let Err(e) = init_logging(config.json_logs) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    tracing::info!(
        project_dir = %config.project_dir.display(),
        modules = config.module_names().len(),
        history = ?config.history_backend,
        "Starting buildcast"
    );

    let state = AppState::from_config(&config)?;
    server::start_server(config.socket_addr(), state, config.public_dir.clone()).await
}
