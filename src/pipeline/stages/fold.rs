/*!
 * Fold
 *
 * availability -> optional reap -> preflight -> launch -> watchdog ->
 * wait (bounded by the job timeout, interruptible by cancellation) ->
 * retire watchdog -> map the exit into a stage result.
 */

use crate::core::limits::{KILL_SETTLE_TIMEOUT, OUTPUT_DRAIN_TIMEOUT, STRUCTURE_DIR};
use crate::monitoring::{MemoryWatchdog, PreflightError, PreflightGate};
use crate::pipeline::driver::{Completion, FoldPipeline};
use crate::pipeline::run::{FoldRecord, PipelineRun};
use crate::pipeline::types::{StageError, StageOutput, StageResult};
use crate::process::{ExitKind, SupervisedProcess, TerminationReason, WaitOutcome};
use crate::signals::CancelToken;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Output lines attached to a non-zero exit
const FAILURE_TAIL_LINES: usize = 20;

impl FoldPipeline {
    pub(in crate::pipeline) async fn fold(
        &self,
        run: &mut PipelineRun,
        cancel: &CancelToken,
    ) -> StageResult<Completion> {
        let job = run.job().clone();
        let Some(fasta) = run.artifacts.fasta.clone() else {
            return Err(StageError::SequenceUnavailable {
                protein: job.protein.clone(),
                reason: "no FASTA was resolved".to_string(),
            });
        };

        let backend = Arc::clone(&self.backend);
        let detail = backend
            .availability()
            .map_err(|reason| StageError::BackendUnavailable {
                backend: backend.name().to_string(),
                reason,
            })?;
        debug!(backend = backend.name(), detail = %detail, "Backend available");

        if self.settings.reap_before_fold {
            if let Some(reaper) = &self.reaper {
                match reaper.reap().await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "Reaped stale backend processes before fold"),
                    Err(e) => warn!(error = %e, "Stale process reaping failed"),
                }
            }
        }

        let mut gate = PreflightGate::new(Arc::clone(&self.monitor));
        if let Some(reaper) = &self.reaper {
            gate = gate.with_reaper(Arc::clone(reaper));
        }
        let available = gate
            .check(self.settings.preflight_min)
            .await
            .map_err(|e| match e {
                PreflightError::InsufficientResources {
                    required,
                    available,
                } => StageError::InsufficientResources {
                    required,
                    available,
                },
                PreflightError::ResourceQuery(e) => StageError::ResourceQuery(e.to_string()),
            })?;

        let results_dir = job.results_dir();
        let structure_dir = results_dir.join(STRUCTURE_DIR);
        let log_path = results_dir.join("logs").join("backend.log");
        tokio::fs::create_dir_all(&structure_dir)
            .await
            .map_err(|e| StageError::io(&structure_dir, e))?;

        let spec = backend
            .launch_spec(&fasta, &structure_dir)
            .with_log_path(&log_path);
        let handle = self
            .supervisor
            .launch(&spec)
            .map_err(|e| StageError::Launch(e.to_string()))?;

        let mut record = FoldRecord {
            backend: backend.name().to_string(),
            available_at_preflight: Some(available),
            pid: Some(handle.pid()),
            log: Some(log_path.clone()),
            ..Default::default()
        };
        run.artifacts.files.insert("backend_log", log_path);

        let watchdog = self.settings.watchdog.map(|settings| {
            MemoryWatchdog::arm(
                Arc::clone(&self.monitor),
                Arc::clone(&self.supervisor),
                Arc::clone(&handle),
                settings,
            )
        });

        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.supervisor.wait(&handle, job.fold_timeout) => Some(outcome),
        };
        let cancelled = waited.is_none();
        match waited {
            None => {
                info!(pgid = handle.pgid(), "Run cancelled, stopping the fold");
                self.stop(&handle, TerminationReason::ExternalSignal).await;
            }
            Some(WaitOutcome::TimedOut) => {
                warn!(
                    pgid = handle.pgid(),
                    timeout_secs = job.fold_timeout.as_secs(),
                    "Fold timed out"
                );
                self.stop(&handle, TerminationReason::Timeout).await;
            }
            Some(_) => {}
        }

        let exit = match tokio::time::timeout(KILL_SETTLE_TIMEOUT, handle.exited()).await {
            Ok(exit_record) => handle.settle(exit_record),
            Err(_) => ExitKind::Terminated(handle.termination_reason()),
        };

        if let Some(watchdog) = watchdog {
            let report = watchdog.retire().await;
            record.watchdog_samples = report.samples;
            record.watchdog_triggered = report.triggered;
        }
        handle.flush_output(OUTPUT_DRAIN_TIMEOUT).await;
        record.exit = Some(exit);
        run.artifacts.fold = Some(record);

        info!(pgid = handle.pgid(), ?exit, "Fold finished");
        match exit {
            ExitKind::Exited(0) => {}
            ExitKind::Exited(code) => {
                return Err(StageError::NonZeroExit {
                    code,
                    tail: handle.output_tail(FAILURE_TAIL_LINES),
                })
            }
            ExitKind::Terminated(TerminationReason::LowMemory) => {
                return Err(StageError::LowMemoryTermination)
            }
            ExitKind::Terminated(TerminationReason::Timeout) => {
                return Err(StageError::TimedOut {
                    secs: job.fold_timeout.as_secs(),
                })
            }
            ExitKind::Terminated(_) if cancelled => return Err(StageError::Cancelled),
            ExitKind::Terminated(_) => return Err(StageError::ExternalSignal),
        }

        let structure = backend
            .collect(&structure_dir)
            .ok_or_else(|| StageError::MissingStructure {
                path: structure_dir.clone(),
            })?;
        let note = structure
            .pdb
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        run.artifacts.files.insert("structure", structure.pdb.clone());
        if let Some(scores) = &structure.scores {
            run.artifacts.files.insert("scores", scores.clone());
        }
        run.artifacts.structure = StageOutput::Present(structure);
        Ok(Completion::Done(note))
    }

    async fn stop(&self, handle: &SupervisedProcess, reason: TerminationReason) {
        if let Err(e) = self.supervisor.terminate(handle, reason).await {
            warn!(pgid = handle.pgid(), error = %e, "Failed to terminate fold");
        }
    }
}
