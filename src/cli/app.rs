use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::init_logging;
use soulflow::config::load_config;
use soulflow::metrics;

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    let loaded = load_config(cli.config.as_deref()).await?;
    let _log_guard = init_logging(cli.log_level.as_deref(), cli.debug, &loaded.config.logging)?;
    let _metrics_server = metrics::spawn_metrics_server(cli.metrics_port);

    info!("Starting SoulFlow v{}", env!("CARGO_PKG_VERSION"));
    debug!(
        path = %loaded.path.display(),
        from_file = loaded.from_file,
        "configuration resolved"
    );
    let ctx = CliContext::new(loaded);

    match dispatch(&cli, &ctx).await {
        Ok(()) => {
            debug!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
