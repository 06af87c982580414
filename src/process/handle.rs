/*!
 * Supervised Process Handle
 *
 * Shared view of one launched computation. The supervisor owns the child;
 * the pipeline and the watchdog hold `Arc<SupervisedProcess>` handles to
 * observe it. Exit state is published through a watch channel so any number
 * of observers can await it concurrently with `terminate`.
 */

use super::capture::OutputTail;
use super::types::{ExitKind, ExitRecord, TerminationReason};
use crate::core::types::{Pgid, Pid};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// One externally launched computation
#[derive(Debug)]
pub struct SupervisedProcess {
    id: Uuid,
    pid: Pid,
    pgid: Pgid,
    program: String,
    started_at: OffsetDateTime,
    started: Instant,
    last_seen: Mutex<OffsetDateTime>,
    reason: Mutex<TerminationReason>,
    exit_rx: watch::Receiver<Option<ExitRecord>>,
    output: Arc<OutputTail>,
    capture: Mutex<Option<JoinHandle<()>>>,
}

impl SupervisedProcess {
    pub(super) fn new(
        pid: Pid,
        program: String,
        exit_rx: watch::Receiver<Option<ExitRecord>>,
        output: Arc<OutputTail>,
        capture: Option<JoinHandle<()>>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            pid,
            // Launched with process_group(0): the leader's pid is the group id.
            pgid: pid,
            program,
            started_at: now,
            started: Instant::now(),
            last_seen: Mutex::new(now),
            reason: Mutex::new(TerminationReason::None),
            exit_rx,
            output,
            capture: Mutex::new(capture),
        }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn pgid(&self) -> Pgid {
        self.pgid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn last_seen(&self) -> OffsetDateTime {
        *self.last_seen.lock()
    }

    /// Record that the process was observed alive
    pub fn touch(&self) {
        *self.last_seen.lock() = OffsetDateTime::now_utc();
    }

    pub fn termination_reason(&self) -> TerminationReason {
        *self.reason.lock()
    }

    /// Record why the process stopped. Only the first reason sticks.
    pub fn record_reason(&self, reason: TerminationReason) -> bool {
        let mut current = self.reason.lock();
        if *current == TerminationReason::None && reason != TerminationReason::None {
            *current = reason;
            true
        } else {
            false
        }
    }

    /// Exit record, if the leader has been reaped
    pub fn exit_record(&self) -> Option<ExitRecord> {
        *self.exit_rx.borrow()
    }

    #[inline]
    pub fn has_exited(&self) -> bool {
        self.exit_record().is_some()
    }

    /// Wait until the leader has been reaped
    pub async fn exited(&self) -> ExitRecord {
        let mut rx = self.exit_rx.clone();
        let result = match rx.wait_for(|state| state.is_some()).await {
            Ok(state) => *state,
            Err(_) => None,
        };
        result.unwrap_or_else(ExitRecord::unknown)
    }

    /// Resolve the final outcome. Forced termination reasons take precedence
    /// over whatever exit code the leader reported.
    pub fn settle(&self, record: ExitRecord) -> ExitKind {
        let reason = self.termination_reason();
        if reason.is_forced() {
            return ExitKind::Terminated(reason);
        }
        match record.code {
            Some(code) => ExitKind::Exited(code),
            None => ExitKind::Terminated(TerminationReason::ExternalSignal),
        }
    }

    /// Captured output lines retained for diagnostics
    pub fn output_tail(&self, max_lines: usize) -> Vec<String> {
        self.output.last(max_lines)
    }

    /// Wait (bounded) for the output readers to drain after exit
    pub async fn flush_output(&self, within: Duration) {
        let task = self.capture.lock().take();
        if let Some(task) = task {
            if tokio::time::timeout(within, task).await.is_err() {
                tracing::debug!(pgid = self.pgid, "Output capture still draining, detaching");
            }
        }
    }
}
