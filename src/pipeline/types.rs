/*!
 * Pipeline Types
 * Jobs, stages, stage errors and run verdicts
 */

use crate::backend::StructureFiles;
use crate::config::Config;
use crate::core::limits::{
    DEFAULT_COLLABORATOR_TIMEOUT, DEFAULT_FOLD_TIMEOUT, DEFAULT_PREFLIGHT_MIN,
    DEFAULT_SUMMARY_TIMEOUT,
};
use crate::core::types::{Bytes, Quantity};
use crate::monitoring::WatchdogSettings;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub type StageResult<T> = Result<T, StageError>;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ResolveSequence,
    Fold,
    Analyze,
    ClinicalLookup,
    LiteratureSearch,
    Summarize,
    Persist,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::ResolveSequence,
        Stage::Fold,
        Stage::Analyze,
        Stage::ClinicalLookup,
        Stage::LiteratureSearch,
        Stage::Summarize,
        Stage::Persist,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ResolveSequence => "resolve_sequence",
            Stage::Fold => "fold",
            Stage::Analyze => "analyze",
            Stage::ClinicalLookup => "clinical_lookup",
            Stage::LiteratureSearch => "literature_search",
            Stage::Summarize => "summarize",
            Stage::Persist => "persist",
        }
    }

    /// Failures of these stages are recorded but never fail the run
    pub fn is_best_effort(self) -> bool {
        matches!(
            self,
            Stage::ClinicalLookup | Stage::LiteratureSearch | Stage::Summarize
        )
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Skipped,
    Failed,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Succeeded => "succeeded",
            StageStatus::Skipped => "skipped",
            StageStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StageStatus::Succeeded | StageStatus::Skipped | StageStatus::Failed
        )
    }

    /// Allowed transitions; statuses only move forward
    pub fn can_become(self, next: StageStatus) -> bool {
        match self {
            StageStatus::Pending => next != StageStatus::Pending,
            StageStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

/// What a stage left behind for downstream stages
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput<T> {
    Present(T),
    Skipped(String),
    Failed(String),
}

impl<T> StageOutput<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            StageOutput::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, StageOutput::Present(_))
    }
}

impl<T> Default for StageOutput<T> {
    fn default() -> Self {
        StageOutput::Skipped("not run".to_string())
    }
}

/// Per-job stage switches. Sequence resolution cannot be skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipFlags {
    pub fold: bool,
    pub analysis: bool,
    pub clinical: bool,
    pub literature: bool,
    pub summary: bool,
    /// Skips artifact files; `metadata.json` is always written
    pub persist: bool,
}

impl SkipFlags {
    /// Every skippable stage skipped
    pub fn all() -> Self {
        Self {
            fold: true,
            analysis: true,
            clinical: true,
            literature: true,
            summary: true,
            persist: true,
        }
    }

    pub fn skips(&self, stage: Stage) -> bool {
        match stage {
            Stage::ResolveSequence => false,
            Stage::Fold => self.fold,
            Stage::Analyze => self.analysis,
            Stage::ClinicalLookup => self.clinical,
            Stage::LiteratureSearch => self.literature,
            Stage::Summarize => self.summary,
            Stage::Persist => self.persist,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceSource {
    /// Raw residues or FASTA text
    Inline(String),
    /// Existing FASTA file
    File(PathBuf),
}

/// One unit of work. Immutable once the pipeline starts.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldJob {
    pub protein: String,
    pub variant: Option<String>,
    /// `None` asks the sequence lookup collaborator
    pub sequence: Option<SequenceSource>,
    pub rationale: Option<String>,
    pub skip: SkipFlags,
    /// Parent of the per-job results directory
    pub output_root: PathBuf,
    pub fold_timeout: Duration,
    /// Previously predicted structure, used when the fold is skipped
    pub existing_structure: Option<StructureFiles>,
}

impl FoldJob {
    pub fn new(protein: impl Into<String>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            protein: protein.into(),
            variant: None,
            sequence: None,
            rationale: None,
            skip: SkipFlags::default(),
            output_root: output_root.into(),
            fold_timeout: DEFAULT_FOLD_TIMEOUT,
            existing_structure: None,
        }
    }

    #[must_use]
    pub fn with_variant(mut self, variant: Option<String>) -> Self {
        self.variant = variant.filter(|v| !v.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_sequence(mut self, source: SequenceSource) -> Self {
        self.sequence = Some(source);
        self
    }

    #[must_use]
    pub fn with_rationale(mut self, rationale: Option<String>) -> Self {
        self.rationale = rationale;
        self
    }

    #[must_use]
    pub fn with_skip(mut self, skip: SkipFlags) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn with_fold_timeout(mut self, timeout: Duration) -> Self {
        self.fold_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_existing_structure(mut self, structure: StructureFiles) -> Self {
        self.existing_structure = Some(structure);
        self
    }

    /// `PROTEIN_VARIANT`, safe for use as a directory name
    pub fn name(&self) -> String {
        let raw = match &self.variant {
            Some(variant) => format!("{}_{}", self.protein, variant),
            None => self.protein.clone(),
        };
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Human-readable title, e.g. "SOD1 A4V"
    pub fn title(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{} {}", self.protein, variant),
            None => self.protein.clone(),
        }
    }

    pub fn results_dir(&self) -> PathBuf {
        self.output_root.join(self.name())
    }
}

/// Stage failures
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum StageError {
    #[error("No sequence for {protein}: {reason}")]
    #[diagnostic(
        code(pipeline::sequence_unavailable),
        help("Pass --fasta or --sequence, or configure [collaborators.sequence].")
    )]
    SequenceUnavailable { protein: String, reason: String },

    #[error("Insufficient memory: {required} required, {available} available")]
    #[diagnostic(
        code(pipeline::insufficient_resources),
        help("Close other memory-heavy programs or lower resources.preflight_min_gib.")
    )]
    InsufficientResources {
        required: Quantity,
        available: Quantity,
    },

    #[error("Could not read available memory: {0}")]
    #[diagnostic(code(pipeline::resource_query))]
    ResourceQuery(String),

    #[error("Backend {backend} is not available: {reason}")]
    #[diagnostic(
        code(pipeline::backend_unavailable),
        help("Install the backend or point folding.colabfold_path / alphafold_path at it.")
    )]
    BackendUnavailable { backend: String, reason: String },

    #[error("Failed to launch the backend: {0}")]
    #[diagnostic(code(pipeline::launch))]
    Launch(String),

    #[error("Fold exceeded its {secs}s timeout")]
    #[diagnostic(code(pipeline::timed_out), help("Raise folding.timeout_hours or --timeout-hours."))]
    TimedOut { secs: u64 },

    #[error("Fold terminated by the memory watchdog")]
    #[diagnostic(
        code(pipeline::low_memory),
        help("Available memory fell below resources.watchdog_threshold_gib during the fold.")
    )]
    LowMemoryTermination,

    #[error("Run cancelled")]
    #[diagnostic(code(pipeline::cancelled))]
    Cancelled,

    #[error("Backend exited with code {code}")]
    #[diagnostic(code(pipeline::non_zero_exit))]
    NonZeroExit { code: i32, tail: Vec<String> },

    #[error("Backend was killed by an external signal")]
    #[diagnostic(code(pipeline::external_signal))]
    ExternalSignal,

    #[error("No structure found in {path}", path = path.display())]
    #[diagnostic(code(pipeline::missing_structure))]
    MissingStructure { path: PathBuf },

    #[error("Structure analysis failed: {0}")]
    #[diagnostic(code(pipeline::analysis))]
    Analysis(String),

    #[error("{0}")]
    #[diagnostic(code(pipeline::collaborator))]
    Collaborator(String),

    #[error("Failed to persist results: {0}")]
    #[diagnostic(code(pipeline::persistence))]
    Persistence(String),

    #[error("Job {job} is already running (pid {holder})")]
    #[diagnostic(
        code(pipeline::job_conflict),
        help("Wait for the other run to finish, or remove a stale lock file.")
    )]
    JobConflict { job: String, holder: i32 },

    #[error("I/O error: {0}")]
    #[diagnostic(code(pipeline::io))]
    Io(String),
}

impl StageError {
    /// Stable machine-readable kind, written to metadata.json
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::SequenceUnavailable { .. } => "sequence_unavailable",
            StageError::InsufficientResources { .. } => "insufficient_resources",
            StageError::ResourceQuery(_) => "resource_query",
            StageError::BackendUnavailable { .. } => "backend_unavailable",
            StageError::Launch(_) => "launch",
            StageError::TimedOut { .. } => "timed_out",
            StageError::LowMemoryTermination => "low_memory_termination",
            StageError::Cancelled => "cancelled",
            StageError::NonZeroExit { .. } => "non_zero_exit",
            StageError::ExternalSignal => "external_signal",
            StageError::MissingStructure { .. } => "missing_structure",
            StageError::Analysis(_) => "analysis",
            StageError::Collaborator(_) => "recoverable_collaborator_failure",
            StageError::Persistence(_) => "persistence",
            StageError::JobConflict { .. } => "job_conflict",
            StageError::Io(_) => "io",
        }
    }

    pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
        StageError::Io(format!("{}: {}", path.display(), err))
    }
}

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Succeeded,
    Failed {
        /// `None` when the run failed before any stage (job conflict)
        stage: Option<Stage>,
        error: StageError,
    },
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Succeeded)
    }
}

/// One stage as recorded in the run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<time::OffsetDateTime>,
    pub elapsed_ms: Option<u64>,
    /// Skip reason, failure message or a short result note
    pub note: Option<String>,
    pub error_kind: Option<&'static str>,
}

/// Returned to the caller after every run, successful or not
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub job_name: String,
    pub verdict: Verdict,
    pub stages: Vec<StageRecord>,
    pub results_dir: PathBuf,
    /// Whether metadata.json was written
    pub persisted: bool,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.verdict.is_success()
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.stages
            .get(stage.index())
            .map(|r| r.status)
            .unwrap_or(StageStatus::Pending)
    }
}

/// Frozen runtime settings shared by every run of a pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub preflight_min: Bytes,
    /// `None` disables the watchdog
    pub watchdog: Option<WatchdogSettings>,
    pub reap_before_fold: bool,
    pub collaborator_timeout: Duration,
    pub summary_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            preflight_min: DEFAULT_PREFLIGHT_MIN,
            watchdog: Some(WatchdogSettings::default()),
            reap_before_fold: false,
            collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT,
            summary_timeout: DEFAULT_SUMMARY_TIMEOUT,
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            preflight_min: config.preflight_min(),
            watchdog: config.watchdog(),
            reap_before_fold: config.resources.reap_before_fold,
            collaborator_timeout: config.collaborator_timeout(),
            summary_timeout: config.summary_timeout(),
        }
    }
}
