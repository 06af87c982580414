/*!
 * Error Types
 * Top-level error surfaced by the binary, with miette diagnostics
 */

use crate::config::ConfigError;
use crate::pipeline::{Stage, StageError};
use crate::process::ProcessError;
use crate::queue::QueueError;
use miette::Diagnostic;
use thiserror::Error;

pub type FoldhostResult<T> = Result<T, FoldhostError>;

#[derive(Error, Debug, Diagnostic)]
pub enum FoldhostError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Queue(#[from] QueueError),

    #[error("Run {job} failed{}", stage.map(|s| format!(" in stage {}", s)).unwrap_or_default())]
    #[diagnostic(code(foldhost::run_failed))]
    Run {
        job: String,
        stage: Option<Stage>,
        #[source]
        #[diagnostic_source]
        source: StageError,
    },

    #[error("Invalid argument: {0}")]
    #[diagnostic(code(foldhost::argument), help("See `foldhost --help`."))]
    Argument(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(foldhost::io))]
    Io(#[from] std::io::Error),
}
