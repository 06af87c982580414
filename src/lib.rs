/*!
 * foldhost
 *
 * Memory-guarded supervision of protein structure prediction runs: a
 * preflight gate and watchdog around the folding backend, a stage pipeline
 * that turns one job into a results directory, and a watch queue that feeds
 * the pipeline from a directory of inputs.
 */

pub mod backend;
pub mod collaborators;
pub mod config;
pub mod core;
pub mod monitoring;
pub mod pipeline;
pub mod process;
pub mod queue;
pub mod signals;
pub mod summary;

// Re-exports
pub use crate::core::{FoldhostError, FoldhostResult};
pub use config::Config;
pub use monitoring::{init_tracing, TracingOptions};
pub use pipeline::{FoldJob, FoldPipeline, RunReport, Stage, StageError, Verdict};
pub use queue::WatchQueue;
