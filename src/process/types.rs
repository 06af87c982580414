/*!
 * Process Types
 * Common types for supervised process management
 */

use crate::core::types::Pgid;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Process operation result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Process errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ProcessError {
    #[error("Failed to launch '{program}': {reason}")]
    #[diagnostic(
        code(process::launch_failed),
        help("Check that the backend binary exists, is executable and is on PATH.")
    )]
    Launch { program: String, reason: String },

    #[error("Failed to signal process group {pgid}: {reason}")]
    #[diagnostic(code(process::signal_failed))]
    Signal { pgid: Pgid, reason: String },

    #[error("Process group {0} survived SIGKILL")]
    #[diagnostic(
        code(process::unkillable),
        help("The group may be stuck in uninterruptible sleep (D state). Inspect it with ps.")
    )]
    Unkillable(Pgid),

    #[error("Process table unavailable: {0}")]
    #[diagnostic(code(process::table_unavailable))]
    TableUnavailable(String),
}

/// Why a supervised process stopped
///
/// Recorded once: the first non-`None` reason wins, so a termination issued
/// before the exit is observed takes precedence over a late normal exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    None,
    Timeout,
    LowMemory,
    ExternalSignal,
    NormalExit,
}

impl TerminationReason {
    /// Whether this reason was imposed by the supervisor or the environment
    #[inline]
    pub fn is_forced(self) -> bool {
        matches!(
            self,
            TerminationReason::Timeout
                | TerminationReason::LowMemory
                | TerminationReason::ExternalSignal
        )
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationReason::None => "none",
            TerminationReason::Timeout => "timeout",
            TerminationReason::LowMemory => "low_memory",
            TerminationReason::ExternalSignal => "external_signal",
            TerminationReason::NormalExit => "normal_exit",
        };
        f.write_str(s)
    }
}

/// Raw exit information captured when the leader is reaped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRecord {
    /// Exit code, absent when the leader died from a signal
    pub code: Option<i32>,
    /// Terminating signal number, if any
    pub signal: Option<i32>,
}

impl ExitRecord {
    /// Exit state could not be observed (wait itself failed)
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }
}

/// Settled outcome of a process that is no longer running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    Exited(i32),
    Terminated(TerminationReason),
}

/// Non-blocking status check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited(i32),
    Terminated(TerminationReason),
}

impl From<ExitKind> for ProcessStatus {
    fn from(kind: ExitKind) -> Self {
        match kind {
            ExitKind::Exited(code) => ProcessStatus::Exited(code),
            ExitKind::Terminated(reason) => ProcessStatus::Terminated(reason),
        }
    }
}

/// Blocking wait result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(i32),
    Terminated(TerminationReason),
    TimedOut,
}

impl From<ExitKind> for WaitOutcome {
    fn from(kind: ExitKind) -> Self {
        match kind {
            ExitKind::Exited(code) => WaitOutcome::Exited(code),
            ExitKind::Terminated(reason) => WaitOutcome::Terminated(reason),
        }
    }
}

/// How a group termination concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupTermination {
    /// Nothing was alive when termination started
    AlreadyGone,
    /// Group exited within the grace period after SIGTERM
    Graceful,
    /// Group needed SIGKILL
    Forced,
}

/// Everything needed to start one supervised computation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LaunchSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// File that receives the captured stdout/stderr
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Raise the child's OOM score so the kernel picks it first
    #[serde(default)]
    pub oom_priority: bool,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            env: vec![],
            working_dir: None,
            log_path: None,
            oom_priority: false,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_oom_priority(mut self, enabled: bool) -> Self {
        self.oom_priority = enabled;
        self
    }

    /// Command line rendered for logs
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}
