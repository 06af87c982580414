/*!
 * Process Supervisor
 *
 * Launches the backend as its own process group and owns the child for its
 * whole lifetime. A reaping task publishes the leader's exit through the
 * handle, so `poll`, `wait` and `terminate` can run from different tasks
 * against the same handle.
 */

use super::capture::{spawn_capture, OutputTail};
use super::handle::SupervisedProcess;
use super::table::{terminate_group, ProcessTable};
use super::types::{
    ExitRecord, GroupTermination, LaunchSpec, ProcessError, ProcessResult, ProcessStatus,
    TerminationReason, WaitOutcome,
};
use crate::core::limits::{
    DEFAULT_TERMINATE_GRACE, FOLD_OOM_SCORE_ADJ, KILL_SETTLE_TIMEOUT, OUTPUT_TAIL_LINES,
};
use crate::core::types::Pgid;
use dashmap::DashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Process groups currently owned by a supervisor, keyed by pgid.
/// Shared with the stale-process reaper so it never touches a live run.
pub type ActiveGroups = Arc<DashMap<Pgid, String>>;

/// Owns launched backend process groups
pub struct ProcessSupervisor {
    table: Arc<dyn ProcessTable>,
    grace: Duration,
    active: ActiveGroups,
}

impl ProcessSupervisor {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self {
            table,
            grace: DEFAULT_TERMINATE_GRACE,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Time between SIGTERM and SIGKILL
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn table(&self) -> Arc<dyn ProcessTable> {
        Arc::clone(&self.table)
    }

    pub fn active_groups(&self) -> ActiveGroups {
        Arc::clone(&self.active)
    }

    /// Start the computation as the leader of a new process group
    pub fn launch(&self, spec: &LaunchSpec) -> ProcessResult<Arc<SupervisedProcess>> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| ProcessError::Launch {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;

        let pid = child.id().ok_or_else(|| ProcessError::Launch {
            program: spec.program.clone(),
            reason: "process exited before its pid could be read".to_string(),
        })? as i32;

        if spec.oom_priority {
            raise_oom_score(pid);
        }

        let tail = Arc::new(OutputTail::new(OUTPUT_TAIL_LINES));
        let capture = spawn_capture(
            format!("{}[{}]", spec.program, pid),
            child.stdout.take(),
            child.stderr.take(),
            spec.log_path.clone(),
            Arc::clone(&tail),
        );

        let (exit_tx, exit_rx) = watch::channel(None);
        let handle = Arc::new(SupervisedProcess::new(
            pid,
            spec.program.clone(),
            exit_rx,
            tail,
            Some(capture),
        ));
        self.active.insert(handle.pgid(), spec.program.clone());

        let reaped = Arc::clone(&handle);
        let active = Arc::clone(&self.active);
        tokio::spawn(async move {
            let record = match child.wait().await {
                Ok(status) => ExitRecord {
                    code: status.code(),
                    signal: exit_signal(&status),
                },
                Err(e) => {
                    error!(pid = reaped.pid(), error = %e, "Failed to reap process leader");
                    ExitRecord::unknown()
                }
            };
            let reason = if record.code.is_some() {
                TerminationReason::NormalExit
            } else {
                TerminationReason::ExternalSignal
            };
            reaped.record_reason(reason);
            active.remove(&reaped.pgid());
            debug!(
                pid = reaped.pid(),
                code = ?record.code,
                signal = ?record.signal,
                "Process leader reaped"
            );
            let _ = exit_tx.send(Some(record));
        });

        info!(
            pid,
            pgid = handle.pgid(),
            command = %spec.display(),
            "Launched supervised process group"
        );
        Ok(handle)
    }

    /// Non-blocking status check
    pub fn poll(&self, handle: &SupervisedProcess) -> ProcessStatus {
        match handle.exit_record() {
            Some(record) => handle.settle(record).into(),
            None => {
                handle.touch();
                ProcessStatus::Running
            }
        }
    }

    /// Terminate the whole group: SIGTERM, grace period, then SIGKILL.
    ///
    /// The reason is recorded before any signal goes out, so a concurrent
    /// `wait` resolves to `Terminated(reason)` even if the leader exits 0
    /// while handling SIGTERM. Calling this on an exited process is a no-op.
    pub async fn terminate(
        &self,
        handle: &SupervisedProcess,
        reason: TerminationReason,
    ) -> ProcessResult<GroupTermination> {
        if handle.has_exited() {
            debug!(pgid = handle.pgid(), "Terminate on exited process, nothing to do");
            return Ok(GroupTermination::AlreadyGone);
        }

        if handle.record_reason(reason) {
            warn!(pgid = handle.pgid(), %reason, "Terminating supervised process group");
        }

        let outcome = terminate_group(self.table.as_ref(), handle.pgid(), self.grace).await?;

        if tokio::time::timeout(KILL_SETTLE_TIMEOUT, handle.exited())
            .await
            .is_err()
        {
            warn!(
                pgid = handle.pgid(),
                "Group is gone but the leader has not been reaped yet"
            );
        }
        Ok(outcome)
    }

    /// Block until the leader exits or `timeout` elapses
    pub async fn wait(&self, handle: &SupervisedProcess, timeout: Duration) -> WaitOutcome {
        match tokio::time::timeout(timeout, handle.exited()).await {
            Ok(record) => handle.settle(record).into(),
            Err(_) => WaitOutcome::TimedOut,
        }
    }

    /// Terminate every group this supervisor still owns
    pub async fn shutdown(&self, reason: TerminationReason) {
        let groups: Vec<Pgid> = self.active.iter().map(|entry| *entry.key()).collect();
        for pgid in groups {
            match terminate_group(self.table.as_ref(), pgid, self.grace).await {
                Ok(outcome) => debug!(pgid, ?outcome, %reason, "Shut down process group"),
                Err(e) => error!(pgid, error = %e, "Failed to shut down process group"),
            }
            self.active.remove(&pgid);
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Make the kernel OOM killer pick this process first. Best effort.
fn raise_oom_score(pid: i32) {
    let path = format!("/proc/{}/oom_score_adj", pid);
    if let Err(e) = std::fs::write(&path, FOLD_OOM_SCORE_ADJ.to_string()) {
        debug!(pid, error = %e, "Could not adjust oom_score_adj");
    }
}
