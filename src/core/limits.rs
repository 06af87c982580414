/*!
 * Defaults and Thresholds
 *
 * Centralized location for the default thresholds, intervals and magic numbers
 * used by the supervisor, watchdog, pipeline and queue. Configuration values
 * fall back to these when a field is absent.
 */

use super::types::{Bytes, GIB};
use std::time::Duration;

// =============================================================================
// ADMISSION / WATCHDOG
// =============================================================================

/// Minimum available memory before a fold is admitted (16 GiB)
pub const DEFAULT_PREFLIGHT_MIN: Bytes = 16 * GIB;

/// Watchdog kills the fold when available memory drops below this (4 GiB)
pub const DEFAULT_WATCHDOG_THRESHOLD: Bytes = 4 * GIB;

/// Watchdog sampling interval
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

/// Location of the Linux memory sensor
pub const MEMINFO_PATH: &str = "/proc/meminfo";

// =============================================================================
// PROCESS SUPERVISION
// =============================================================================

/// Grace period between SIGTERM and SIGKILL for a process group
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// How often a signalled group is re-checked for liveness
pub const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on waiting for the leader to be reaped after SIGKILL
pub const KILL_SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lines of backend output retained in memory for failure diagnostics
pub const OUTPUT_TAIL_LINES: usize = 200;

/// Time allowed for output readers to drain after the process exits
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// OOM score written for the fold process so the kernel kills it first
pub const FOLD_OOM_SCORE_ADJ: i32 = 1000;

/// Default wall-clock limit for one fold (4 hours)
pub const DEFAULT_FOLD_TIMEOUT: Duration = Duration::from_secs(4 * 60 * 60);

/// Programs that adopt orphans (init and per-user service managers)
pub const SUBREAPER_NAMES: &[&str] = &["init", "systemd"];

/// Ancestry walk limit when deciding whether a backend process is orphaned
pub const MAX_ANCESTRY_DEPTH: usize = 64;

// =============================================================================
// BACKENDS
// =============================================================================

/// Sequences longer than this get reduced model count and MSA depth
pub const LARGE_PROTEIN_RESIDUES: usize = 1000;

/// Models predicted for large sequences
pub const LARGE_PROTEIN_MODELS: u32 = 3;

/// MSA depth cap for large sequences
pub const LARGE_PROTEIN_MAX_MSA: &str = "256:2048";

/// Default model count
pub const DEFAULT_NUM_MODELS: u32 = 5;

// =============================================================================
// COLLABORATORS
// =============================================================================

/// Stage-local timeout for clinical / literature / analysis collaborators
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Stage-local timeout for summary generation (local models are slow)
pub const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(300);

/// Papers included in the summary prompt
pub const PROMPT_MAX_PAPERS: usize = 10;

/// Abstract characters included per paper in the summary prompt
pub const PROMPT_ABSTRACT_CHARS: usize = 400;

// =============================================================================
// WATCH QUEUE
// =============================================================================

/// Directory poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Subdirectory processed inputs are moved to under the archive policy
pub const ARCHIVE_DIR_NAME: &str = "archive";

/// Suffix of the sentinel written under the marker policy
pub const DONE_MARKER_EXT: &str = "done";

/// Input extensions picked up by default
pub const DEFAULT_QUEUE_EXTENSIONS: &[&str] = &["fasta", "fa"];

// =============================================================================
// RESULTS
// =============================================================================

/// Lock file guarding a results directory against concurrent runs
pub const RESULTS_LOCK_FILE: &str = ".foldhost.lock";

/// Backend output directory inside a job's results directory
pub const STRUCTURE_DIR: &str = "structure";
