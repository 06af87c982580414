/*!
 * Watch Queue
 *
 * Poll loop over an input directory. Each tick scans, orders and runs the
 * eligible entries one at a time; every processed input is archived or
 * marked before it leaves `processing`. An entry enters `processing` at most
 * once per queue lifetime, whatever happens to it afterwards.
 */

use super::disposal::dispose;
use super::scan::scan;
use super::types::{EntryState, QueueEntry, QueueResult, QueueSettings, TickReport};
use crate::pipeline::{FoldJob, FoldPipeline, RunReport, SequenceSource};
use crate::signals::CancelToken;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runs one job to completion
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, job: FoldJob, cancel: CancelToken) -> RunReport;
}

/// Runs queue jobs through a fold pipeline
pub struct PipelineRunner {
    pipeline: Arc<FoldPipeline>,
}

impl PipelineRunner {
    pub fn new(pipeline: Arc<FoldPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobRunner for PipelineRunner {
    async fn run_job(&self, job: FoldJob, cancel: CancelToken) -> RunReport {
        self.pipeline.run(job, cancel).await
    }
}

pub struct WatchQueue {
    settings: QueueSettings,
    entries: HashMap<PathBuf, QueueEntry>,
    /// Unparseable files already warned about
    ignored: HashSet<PathBuf>,
}

impl WatchQueue {
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            settings,
            entries: HashMap::new(),
            ignored: HashSet::new(),
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn state(&self, path: &Path) -> Option<EntryState> {
        self.entries.get(path).map(|e| e.state)
    }

    /// Every entry seen in this queue lifetime
    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.values()
    }

    /// Job for one queue entry
    pub fn job_for(&self, entry: &QueueEntry) -> FoldJob {
        FoldJob::new(entry.protein.clone(), self.settings.output_root.clone())
            .with_variant(entry.variant.clone())
            .with_sequence(SequenceSource::File(entry.path.clone()))
            .with_skip(self.settings.skip)
            .with_fold_timeout(self.settings.fold_timeout)
    }

    /// One poll: scan, then run every eligible entry in order.
    /// `drain` stops new entries from starting; `abort` is passed to the
    /// running job.
    pub async fn tick(
        &mut self,
        runner: &dyn JobRunner,
        drain: &CancelToken,
        abort: &CancelToken,
    ) -> QueueResult<TickReport> {
        let seen: HashSet<PathBuf> = self
            .entries
            .keys()
            .chain(self.ignored.iter())
            .cloned()
            .collect();
        let outcome = scan(&self.settings.dir, &self.settings.extensions, &seen)?;

        let mut report = TickReport {
            discovered: outcome.entries.len(),
            ..TickReport::default()
        };
        for (path, reason) in outcome.unparseable {
            warn!(path = %path.display(), %reason, "Skipping input with unparseable name");
            self.ignored.insert(path.clone());
            report.unparseable.push(path);
        }

        let total = outcome.entries.len();
        for (index, entry) in outcome.entries.into_iter().enumerate() {
            if drain.is_cancelled() || abort.is_cancelled() {
                report.deferred = total - index;
                info!(deferred = report.deferred, "Draining, not starting further entries");
                break;
            }
            self.process(entry, runner, abort, &mut report).await;
        }
        Ok(report)
    }

    async fn process(
        &mut self,
        mut entry: QueueEntry,
        runner: &dyn JobRunner,
        abort: &CancelToken,
        report: &mut TickReport,
    ) {
        let path = entry.path.clone();
        if self.entries.contains_key(&path) {
            return;
        }
        let job = self.job_for(&entry);
        entry.state = EntryState::Processing;
        self.entries.insert(path.clone(), entry);

        info!(input = %path.display(), job = %job.name(), "Processing queue entry");
        let run = runner.run_job(job, abort.clone()).await;

        match dispose(&path, self.settings.policy, &run) {
            Ok(target) => {
                let state = if run.is_success() {
                    report.succeeded += 1;
                    EntryState::Done
                } else {
                    report.failed += 1;
                    EntryState::Failed
                };
                if let Some(entry) = self.entries.get_mut(&path) {
                    entry.state = state;
                }
                info!(
                    input = %path.display(),
                    disposed = %target.display(),
                    succeeded = run.is_success(),
                    "Queue entry finished"
                );
            }
            Err(e) => {
                // Stays `processing`: never retried in this lifetime
                error!(input = %path.display(), error = %e, "Failed to dispose of processed input");
                if run.is_success() {
                    report.succeeded += 1;
                } else {
                    report.failed += 1;
                }
                report.disposal_errors.push(e);
            }
        }
    }

    /// Poll until `drain` fires. A scan error is logged and retried on the
    /// next tick.
    pub async fn run(&mut self, runner: &dyn JobRunner, drain: CancelToken, abort: CancelToken) {
        info!(
            dir = %self.settings.dir.display(),
            interval_secs = self.settings.poll_interval.as_secs(),
            policy = ?self.settings.policy,
            "Watching queue directory"
        );
        loop {
            match self.tick(runner, &drain, &abort).await {
                Ok(report) if report.ran() > 0 || !report.disposal_errors.is_empty() => info!(
                    succeeded = report.succeeded,
                    failed = report.failed,
                    disposal_errors = report.disposal_errors.len(),
                    "Queue tick finished"
                ),
                Ok(_) => {}
                Err(e) => error!(error = %e, "Queue scan failed"),
            }
            if drain.is_cancelled() || abort.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = drain.cancelled() => break,
                _ = abort.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
        info!("Queue stopped");
    }
}
