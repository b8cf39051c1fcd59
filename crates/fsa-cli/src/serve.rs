//! `fsa serve`: keep the store open with its background workers running.

use std::time::Duration;

use anyhow::Result;
use fsa_config::{log_cli_debug, log_cli_info, log_cli_warn, Config};
use fsa_service::AssetStoreService;

/// How often the spool backlog is checked while serving.
const BACKLOG_CHECK: Duration = Duration::from_secs(30);

pub async fn run(service: AssetStoreService, config: Config) -> Result<()> {
    service.start()?;
    log_cli_info!(
        "Serving asset store",
        base = tracing::field::display(config.storage.base_dir.display()),
        compactor_ms = config.compactor.interval_ms,
    );
    println!(
        "Serving {} (Ctrl-C to stop)",
        config.storage.base_dir.display()
    );

    let mut backlog = tokio::time::interval(BACKLOG_CHECK);
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = backlog.tick() => {
                let store = service.clone();
                match tokio::task::spawn_blocking(move || store.spool_backlog()).await? {
                    Ok(spooled) => log_cli_debug!("Spool backlog", spooled_blobs = spooled),
                    Err(e) => log_cli_warn!(
                        "Spool backlog check failed",
                        error = tracing::field::display(&e),
                    ),
                }
            }
        }
    }

    log_cli_info!("Shutting down");
    tokio::task::spawn_blocking(move || service.shutdown()).await?;
    println!("Stopped");
    Ok(())
}
