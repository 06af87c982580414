/*!
 * Configuration Types
 *
 * The TOML document, section by section. Every field has a default so an
 * empty file (or no file) is a valid configuration.
 */

use crate::core::limits::{
    DEFAULT_COLLABORATOR_TIMEOUT, DEFAULT_FOLD_TIMEOUT, DEFAULT_NUM_MODELS,
    DEFAULT_POLL_INTERVAL, DEFAULT_PREFLIGHT_MIN, DEFAULT_QUEUE_EXTENSIONS,
    DEFAULT_SUMMARY_TIMEOUT, DEFAULT_TERMINATE_GRACE, DEFAULT_WATCHDOG_INTERVAL,
    DEFAULT_WATCHDOG_THRESHOLD,
};
use crate::core::types::GIB;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub folding: FoldingConfig,
    pub resources: ResourcesConfig,
    pub watch: WatchConfig,
    pub output: OutputConfig,
    pub summary: SummaryConfig,
    pub collaborators: CollaboratorsConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Colabfold,
    Alphafold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FoldingConfig {
    pub backend: BackendKind,
    pub colabfold_path: String,
    pub alphafold_path: String,
    pub alphafold_image: String,
    /// Empty means "let the backend choose"
    pub gpu_device: String,
    pub timeout_hours: f64,
    pub num_models: u32,
}

impl Default for FoldingConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Colabfold,
            colabfold_path: "colabfold_batch".to_string(),
            alphafold_path: String::new(),
            alphafold_image: "alphafold".to_string(),
            gpu_device: String::new(),
            timeout_hours: DEFAULT_FOLD_TIMEOUT.as_secs_f64() / 3600.0,
            num_models: DEFAULT_NUM_MODELS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcesConfig {
    /// Free memory required before a fold starts
    pub preflight_min_gib: f64,
    pub memory_watchdog: bool,
    /// Watchdog terminates the fold below this
    pub watchdog_threshold_gib: f64,
    pub watchdog_interval_secs: u64,
    /// SIGTERM to SIGKILL escalation delay
    pub terminate_grace_secs: u64,
    pub reap_on_startup: bool,
    pub reap_before_fold: bool,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            preflight_min_gib: DEFAULT_PREFLIGHT_MIN as f64 / GIB as f64,
            memory_watchdog: true,
            watchdog_threshold_gib: DEFAULT_WATCHDOG_THRESHOLD as f64 / GIB as f64,
            watchdog_interval_secs: DEFAULT_WATCHDOG_INTERVAL.as_secs(),
            terminate_grace_secs: DEFAULT_TERMINATE_GRACE.as_secs(),
            reap_on_startup: true,
            reap_before_fold: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub poll_interval: u64,
    /// Move processed inputs to `archive/`; otherwise write `<stem>.done`
    pub archive_processed: bool,
    pub extensions: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL.as_secs(),
            archive_processed: true,
            extensions: DEFAULT_QUEUE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub results_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("./results"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryProvider {
    #[default]
    Template,
    Ollama,
    Anthropic,
    OpenAi,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SummaryConfig {
    pub provider: SummaryProvider,
    pub ollama_url: String,
    pub ollama_model: String,
    /// Falls back to $ANTHROPIC_API_KEY when empty
    pub anthropic_api_key: String,
    pub anthropic_model: String,
    /// Falls back to $OPENAI_API_KEY when empty
    pub openai_api_key: String,
    pub openai_model: String,
    pub timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            provider: SummaryProvider::Template,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.1:70b".to_string(),
            anthropic_api_key: String::new(),
            anthropic_model: "claude-sonnet-4-5-20250929".to_string(),
            openai_api_key: String::new(),
            openai_model: "gpt-4o".to_string(),
            timeout_secs: DEFAULT_SUMMARY_TIMEOUT.as_secs(),
        }
    }
}

/// External program that answers on stdout with JSON.
/// `{protein}` and `{variant}` in `args` are substituted per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollaboratorsConfig {
    pub timeout_secs: u64,
    pub max_papers: usize,
    /// Prints FASTA for `{protein}` when no sequence is supplied
    pub sequence: Option<CommandSpec>,
    pub clinical: Option<CommandSpec>,
    pub literature: Option<CommandSpec>,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_COLLABORATOR_TIMEOUT.as_secs(),
            max_papers: 20,
            sequence: None,
            clinical: None,
            literature: None,
        }
    }
}
