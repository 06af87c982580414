/*!
 * Process Module
 * Supervised backend processes, host process table access and stale-process reaping
 */

pub mod capture;
pub mod handle;
pub mod reaper;
pub mod supervisor;
pub mod table;
pub mod types;

// Re-export for convenience
pub use capture::OutputTail;
pub use handle::SupervisedProcess;
pub use reaper::StaleProcessReaper;
pub use supervisor::{ActiveGroups, ProcessSupervisor};
pub use table::{terminate_group, GroupSignal, ProcessEntry, ProcessIdentity, ProcessTable, ProcfsTable};
pub use types::{
    ExitKind, ExitRecord, GroupTermination, LaunchSpec, ProcessError, ProcessResult,
    ProcessStatus, TerminationReason, WaitOutcome,
};
