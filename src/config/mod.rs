/*!
 * Configuration
 * TOML configuration, its lookup and the runtime values derived from it
 */

mod loader;
mod types;

pub use loader::{
    api_key, default_path, load, locate, parse, validate, write_default, ConfigError,
    ConfigResult, ConfigSource, ANTHROPIC_KEY_ENV, CONFIG_ENV, DEFAULT_TEMPLATE, OLLAMA_URL_ENV,
    OPENAI_KEY_ENV,
};
pub use types::{
    BackendKind, CollaboratorsConfig, CommandSpec, Config, FoldingConfig, OutputConfig,
    ResourcesConfig, SummaryConfig, SummaryProvider, WatchConfig,
};

use crate::core::types::{gib_to_bytes, Bytes};
use crate::monitoring::WatchdogSettings;
use std::time::Duration;

impl Config {
    pub fn fold_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.folding.timeout_hours.max(0.0) * 3600.0)
    }

    pub fn preflight_min(&self) -> Bytes {
        gib_to_bytes(self.resources.preflight_min_gib)
    }

    /// `None` when the watchdog is disabled
    pub fn watchdog(&self) -> Option<WatchdogSettings> {
        self.resources.memory_watchdog.then(|| WatchdogSettings {
            threshold: gib_to_bytes(self.resources.watchdog_threshold_gib),
            interval: Duration::from_secs(self.resources.watchdog_interval_secs),
        })
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.resources.terminate_grace_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.watch.poll_interval)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborators.timeout_secs)
    }

    pub fn summary_timeout(&self) -> Duration {
        Duration::from_secs(self.summary.timeout_secs)
    }
}
