pub mod config;
pub mod controller;
pub mod daemon;
pub mod mapping;
pub mod sink;
pub mod variant;

use crate::config::DaemonConfig;
use crate::daemon::Daemon;
use color_eyre::{eyre::eyre, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let config = setup().await?;

    let variant = variant::identify_variant(&config.board_id_path)?;

    let daemon = Daemon::create(config, variant)
        .start()
        .await
        .map_err(|e| eyre!("Failed to start: {}", e))?;

    let stopped = daemon.run_until_shutdown().await?;
    if let Some(report) = stopped.report() {
        info!(
            "Exiting: {} devices restored, {} loops stopped",
            report.restored + report.already_visible,
            report.loops_stopped
        );
    }
    Ok(())
}

async fn setup() -> Result<DaemonConfig> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    let config = DaemonConfig::load().await?;
    setup_logging_env(&config.log_level);
    Ok(config)
}

fn setup_logging_env(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
