/*!
 * Subcommands
 */

pub mod fold;
pub mod init;
pub mod reap;
pub mod status;
pub mod watch;

use foldhost::config::{self, Config, ConfigSource};
use foldhost::core::FoldhostResult;
use foldhost::pipeline::FoldPipeline;
use std::path::Path;
use tracing::{debug, info, warn};

/// Locate, load and validate the configuration
pub fn load_config(explicit: Option<&Path>) -> FoldhostResult<(ConfigSource, Config)> {
    let source = config::locate(explicit)?;
    let config = config::load(&source)?;
    debug!(path = %source.path().display(), "Configuration loaded");
    Ok((source, config))
}

/// Reap leftovers from a previous crash before the first run
pub async fn reap_on_startup(config: &Config, pipeline: &FoldPipeline) {
    if !config.resources.reap_on_startup {
        return;
    }
    let Some(reaper) = pipeline.reaper() else {
        return;
    };
    match reaper.reap().await {
        Ok(0) => debug!("No stale backend processes"),
        Ok(count) => info!(count, "Terminated stale backend processes from an earlier run"),
        Err(e) => warn!(error = %e, "Startup reaping failed"),
    }
}
