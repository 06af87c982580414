/*!
 * Queue Types
 */

use crate::config::Config;
use crate::core::limits::{DEFAULT_FOLD_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_EXTENSIONS};
use crate::pipeline::SkipFlags;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use time::OffsetDateTime;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Error, Debug, Diagnostic)]
pub enum QueueError {
    #[error("Cannot scan queue directory {dir}", dir = dir.display())]
    #[diagnostic(code(queue::scan), help("Check that the directory exists and is readable."))]
    Scan {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to archive {path}: {reason}", path = path.display())]
    #[diagnostic(code(queue::archive))]
    Archive { path: PathBuf, reason: String },

    #[error("Failed to write done marker for {path}: {reason}", path = path.display())]
    #[diagnostic(code(queue::marker))]
    Marker { path: PathBuf, reason: String },
}

/// Why a filename cannot be turned into a job
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("empty file stem")]
    EmptyStem,
    #[error("empty protein name")]
    EmptyProtein,
    #[error("ordering prefix does not fit in 64 bits")]
    KeyOverflow,
}

/// Protein, variant and ordering key parsed from a filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub key: Option<u64>,
    pub protein: String,
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Discovered,
    Processing,
    Done,
    Failed,
}

/// One discovered input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub path: PathBuf,
    pub file_name: String,
    pub protein: String,
    pub variant: Option<String>,
    pub key: Option<u64>,
    pub modified: SystemTime,
    pub discovered_at: OffsetDateTime,
    pub state: EntryState,
}

/// What happens to an input once its run is over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedPolicy {
    /// Move into `archive/`
    Archive,
    /// Leave in place next to a `<stem>.done` marker
    Marker,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    pub dir: PathBuf,
    pub poll_interval: Duration,
    /// Lower-case, without the dot
    pub extensions: Vec<String>,
    pub policy: ProcessedPolicy,
    pub output_root: PathBuf,
    pub skip: SkipFlags,
    pub fold_timeout: Duration,
}

impl QueueSettings {
    pub fn new(dir: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            extensions: DEFAULT_QUEUE_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            policy: ProcessedPolicy::Archive,
            output_root: output_root.into(),
            skip: SkipFlags::default(),
            fold_timeout: DEFAULT_FOLD_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config, dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            poll_interval: config.poll_interval(),
            extensions: config
                .watch
                .extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            policy: if config.watch.archive_processed {
                ProcessedPolicy::Archive
            } else {
                ProcessedPolicy::Marker
            },
            output_root: config.output.results_dir.clone(),
            skip: SkipFlags::default(),
            fold_timeout: config.fold_timeout(),
        }
    }
}

/// Outcome of one poll tick
#[derive(Debug, Default)]
pub struct TickReport {
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Files skipped because their names cannot be parsed (first sighting only)
    pub unparseable: Vec<PathBuf>,
    /// Archive or marker failures; those entries stay `processing`
    pub disposal_errors: Vec<QueueError>,
    /// Candidates left for a later tick because draining started
    pub deferred: usize,
}

impl TickReport {
    pub fn ran(&self) -> usize {
        self.succeeded + self.failed
    }
}
