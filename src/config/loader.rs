/*!
 * Configuration Loading
 *
 * Lookup order: explicit path, then $FOLDHOST_CONFIG, then
 * ~/.foldhost/config.toml. Only an explicitly named file must exist; a
 * missing default file means defaults.
 */

use super::types::{Config, SummaryConfig, SummaryProvider};
use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub type ConfigResult<T> = Result<T, ConfigError>;

pub const CONFIG_ENV: &str = "FOLDHOST_CONFIG";
pub const OLLAMA_URL_ENV: &str = "FOLDHOST_OLLAMA_URL";
pub const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
const CONFIG_DIR: &str = ".foldhost";
const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("Config file {path} not found", path = path.display())]
    #[diagnostic(
        code(config::not_found),
        help("Create one with `foldhost init` or drop the --config flag.")
    )]
    NotFound { path: PathBuf },

    #[error("Failed to read {path}", path = path.display())]
    #[diagnostic(code(config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}", path = path.display())]
    #[diagnostic(code(config::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(config::invalid))]
    Invalid(String),

    #[error("Cannot determine the home directory for the default config location")]
    #[diagnostic(
        code(config::no_home),
        help("Pass --config or set FOLDHOST_CONFIG.")
    )]
    NoHome,

    #[error("{path} already exists", path = path.display())]
    #[diagnostic(code(config::exists), help("Use --force to overwrite it."))]
    AlreadyExists { path: PathBuf },

    #[error("Failed to write {path}", path = path.display())]
    #[diagnostic(code(config::write))]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the configuration is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` or $FOLDHOST_CONFIG; must exist
    Explicit(PathBuf),
    /// ~/.foldhost/config.toml; may be absent
    Default(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::Explicit(path) | ConfigSource::Default(path) => path,
        }
    }
}

/// Resolve the config location
pub fn locate(explicit: Option<&Path>) -> ConfigResult<ConfigSource> {
    if let Some(path) = explicit {
        return Ok(ConfigSource::Explicit(path.to_path_buf()));
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Ok(ConfigSource::Explicit(PathBuf::from(path)));
    }
    default_path().map(ConfigSource::Default)
}

pub fn default_path() -> ConfigResult<PathBuf> {
    home::home_dir()
        .map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
        .ok_or(ConfigError::NoHome)
}

/// Load, apply environment overrides and validate
pub fn load(source: &ConfigSource) -> ConfigResult<Config> {
    let path = source.path();
    let mut config = match std::fs::read_to_string(path) {
        Ok(text) => parse(&text, path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => match source {
            ConfigSource::Explicit(_) => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            ConfigSource::Default(_) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Config::default()
            }
        },
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    apply_env(&mut config);
    validate(&config)?;
    Ok(config)
}

pub fn parse(text: &str, path: &Path) -> ConfigResult<Config> {
    toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env(config: &mut Config) {
    if let Ok(url) = std::env::var(OLLAMA_URL_ENV) {
        if !url.is_empty() {
            debug!(url = %url, "Ollama URL overridden from environment");
            config.summary.ollama_url = url;
        }
    }
}

/// API key for a hosted summary provider: the configured value, else the
/// provider's usual environment variable. `None` for local providers.
pub fn api_key(summary: &SummaryConfig) -> Option<String> {
    let (configured, env) = match summary.provider {
        SummaryProvider::Anthropic => (&summary.anthropic_api_key, ANTHROPIC_KEY_ENV),
        SummaryProvider::OpenAi => (&summary.openai_api_key, OPENAI_KEY_ENV),
        _ => return None,
    };
    if !configured.trim().is_empty() {
        return Some(configured.trim().to_string());
    }
    std::env::var(env).ok().filter(|key| !key.trim().is_empty())
}

/// Reject values the runtime cannot work with
pub fn validate(config: &Config) -> ConfigResult<()> {
    let res = &config.resources;
    let timeout = config.folding.timeout_hours;
    if timeout.is_nan() || timeout <= 0.0 {
        return Err(ConfigError::Invalid(
            "folding.timeout_hours must be positive".into(),
        ));
    }
    if config.folding.num_models == 0 {
        return Err(ConfigError::Invalid(
            "folding.num_models must be at least 1".into(),
        ));
    }
    if res.preflight_min_gib < 0.0 || res.watchdog_threshold_gib < 0.0 {
        return Err(ConfigError::Invalid(
            "memory thresholds cannot be negative".into(),
        ));
    }
    if res.memory_watchdog {
        if res.watchdog_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "resources.watchdog_interval_secs must be non-zero".into(),
            ));
        }
        if res.watchdog_threshold_gib >= res.preflight_min_gib {
            return Err(ConfigError::Invalid(format!(
                "resources.watchdog_threshold_gib ({}) must be below preflight_min_gib ({})",
                res.watchdog_threshold_gib, res.preflight_min_gib
            )));
        }
    }
    if config.watch.poll_interval == 0 {
        return Err(ConfigError::Invalid(
            "watch.poll_interval must be non-zero".into(),
        ));
    }
    if config.watch.extensions.iter().all(|e| e.trim().is_empty()) {
        return Err(ConfigError::Invalid(
            "watch.extensions must name at least one extension".into(),
        ));
    }
    if config.collaborators.timeout_secs == 0 || config.summary.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "collaborator and summary timeouts must be non-zero".into(),
        ));
    }
    if config.summary.provider == SummaryProvider::Ollama && config.summary.ollama_url.is_empty()
    {
        return Err(ConfigError::Invalid(
            "summary.ollama_url is required for the ollama provider".into(),
        ));
    }
    let key_source = match config.summary.provider {
        SummaryProvider::Anthropic => Some(("anthropic", ANTHROPIC_KEY_ENV)),
        SummaryProvider::OpenAi => Some(("openai", OPENAI_KEY_ENV)),
        _ => None,
    };
    if let Some((provider, env)) = key_source {
        if api_key(&config.summary).is_none() {
            return Err(ConfigError::Invalid(format!(
                "summary.{provider}_api_key or ${env} is required for the {provider} provider"
            )));
        }
    }
    Ok(())
}

/// Write the commented default configuration to `path`
pub fn write_default(path: &Path, force: bool) -> ConfigResult<()> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, DEFAULT_TEMPLATE).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub const DEFAULT_TEMPLATE: &str = r#"# foldhost configuration

[folding]
# "colabfold" or "alphafold"
backend = "colabfold"
colabfold_path = "colabfold_batch"
# Native AlphaFold binary; leave empty to run the Docker image instead
alphafold_path = ""
alphafold_image = "alphafold"
gpu_device = ""
timeout_hours = 4.0
num_models = 5

[resources]
# Free memory required before a fold is started
preflight_min_gib = 16.0
memory_watchdog = true
# The fold is terminated when free memory drops below this
watchdog_threshold_gib = 4.0
watchdog_interval_secs = 5
terminate_grace_secs = 5
reap_on_startup = true
reap_before_fold = false

[watch]
poll_interval = 60
# true: move processed inputs to archive/; false: leave them with a .done marker
archive_processed = true
extensions = ["fasta", "fa"]

[output]
results_dir = "./results"

[summary]
# "template", "ollama", "anthropic", "openai" or "none"
provider = "template"
ollama_url = "http://localhost:11434"
ollama_model = "llama3.1:70b"
# Hosted providers read $ANTHROPIC_API_KEY / $OPENAI_API_KEY when the key is empty
anthropic_api_key = ""
anthropic_model = "claude-sonnet-4-5-20250929"
openai_api_key = ""
openai_model = "gpt-4o"
timeout_secs = 300

[collaborators]
timeout_secs = 60
max_papers = 20

# External lookups print JSON on stdout. {protein} and {variant} are substituted.
# [collaborators.sequence]
# command = "fetch-fasta"
# args = ["{protein}"]
#
# [collaborators.clinical]
# command = "clinvar-lookup"
# args = ["--gene", "{protein}", "--variant", "{variant}"]
#
# [collaborators.literature]
# command = "pubmed-search"
# args = ["{protein} {variant}"]
"#;
