/*!
 * Pipeline Run
 *
 * Per-run state: stage records, accumulated artifacts and the first fatal
 * error. Stage statuses only move forward (see `StageStatus::can_become`).
 */

use super::types::{FoldJob, Stage, StageError, StageOutput, StageRecord, StageStatus, Verdict};
use crate::backend::StructureFiles;
use crate::collaborators::{ClinicalRecord, ConfidenceSummary, Paper};
use crate::core::types::Bytes;
use crate::process::ExitKind;
use crate::summary::SummaryDocument;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

/// Details of the fold stage, kept for metadata.json
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FoldRecord {
    pub backend: String,
    pub available_at_preflight: Option<Bytes>,
    pub pid: Option<i32>,
    pub exit: Option<ExitKind>,
    pub watchdog_samples: u64,
    pub watchdog_triggered: bool,
    pub log: Option<PathBuf>,
}

/// Everything the stages produced so far
#[derive(Debug, Default)]
pub struct Artifacts {
    pub fasta: Option<PathBuf>,
    pub fold: Option<FoldRecord>,
    pub structure: StageOutput<StructureFiles>,
    pub confidence: StageOutput<ConfidenceSummary>,
    pub clinical: StageOutput<Option<ClinicalRecord>>,
    pub papers: StageOutput<Vec<Paper>>,
    pub summary: StageOutput<SummaryDocument>,
    /// Files belonging to the run, by role
    pub files: BTreeMap<&'static str, PathBuf>,
}

impl Artifacts {
    /// Record why a stage left no output
    pub(crate) fn mark_absent(&mut self, stage: Stage, status: StageStatus, reason: String) {
        fn absent<T>(status: StageStatus, reason: String) -> StageOutput<T> {
            if status == StageStatus::Skipped {
                StageOutput::Skipped(reason)
            } else {
                StageOutput::Failed(reason)
            }
        }
        match stage {
            Stage::Fold => self.structure = absent(status, reason),
            Stage::Analyze => self.confidence = absent(status, reason),
            Stage::ClinicalLookup => self.clinical = absent(status, reason),
            Stage::LiteratureSearch => self.papers = absent(status, reason),
            Stage::Summarize => self.summary = absent(status, reason),
            Stage::ResolveSequence | Stage::Persist => {}
        }
    }
}

pub struct PipelineRun {
    run_id: Uuid,
    job: FoldJob,
    started_at: OffsetDateTime,
    records: Vec<StageRecord>,
    clocks: Vec<Option<Instant>>,
    pub(crate) artifacts: Artifacts,
    fatal: Option<(Stage, StageError)>,
}

impl PipelineRun {
    pub fn new(job: FoldJob) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job,
            started_at: OffsetDateTime::now_utc(),
            records: Stage::ALL
                .iter()
                .map(|&stage| StageRecord {
                    stage,
                    status: StageStatus::Pending,
                    started_at: None,
                    elapsed_ms: None,
                    note: None,
                    error_kind: None,
                })
                .collect(),
            clocks: vec![None; Stage::ALL.len()],
            artifacts: Artifacts::default(),
            fatal: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn job(&self) -> &FoldJob {
        &self.job
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.records[stage.index()].status
    }

    /// Stage currently running, if any
    pub fn current(&self) -> Option<Stage> {
        self.records
            .iter()
            .find(|r| r.status == StageStatus::Running)
            .map(|r| r.stage)
    }

    pub fn is_failed(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn fatal(&self) -> Option<&(Stage, StageError)> {
        self.fatal.as_ref()
    }

    fn transition(&mut self, stage: Stage, next: StageStatus, note: Option<String>) -> bool {
        let record = &mut self.records[stage.index()];
        if !record.status.can_become(next) {
            warn!(
                stage = %stage,
                from = ?record.status,
                to = ?next,
                "Ignoring backwards stage transition"
            );
            return false;
        }
        record.status = next;
        if note.is_some() {
            record.note = note;
        }
        if next == StageStatus::Running {
            record.started_at = Some(OffsetDateTime::now_utc());
            self.clocks[stage.index()] = Some(Instant::now());
        } else if let Some(start) = self.clocks[stage.index()] {
            record.elapsed_ms = Some(start.elapsed().as_millis() as u64);
        }
        true
    }

    pub fn start(&mut self, stage: Stage) -> bool {
        self.transition(stage, StageStatus::Running, None)
    }

    pub fn succeed(&mut self, stage: Stage, note: Option<String>) {
        self.transition(stage, StageStatus::Succeeded, note);
    }

    pub fn skip(&mut self, stage: Stage, reason: impl Into<String>) {
        self.transition(stage, StageStatus::Skipped, Some(reason.into()));
    }

    /// Record a failure. Only the first fatal failure becomes the verdict.
    pub fn fail(&mut self, stage: Stage, error: &StageError, fatal: bool) {
        if self.transition(stage, StageStatus::Failed, Some(error.to_string())) {
            self.records[stage.index()].error_kind = Some(error.kind());
        }
        if fatal && self.fatal.is_none() {
            self.fatal = Some((stage, error.clone()));
        }
    }

    /// Fatal failure attributed to `stage` after its status was settled
    pub fn record_fatal(&mut self, stage: Stage, error: StageError) {
        if self.fatal.is_none() {
            self.fatal = Some((stage, error));
        }
    }

    /// Mark every stage before Persist that never ran as skipped
    pub fn skip_remaining(&mut self, reason: &str) {
        for stage in Stage::ALL {
            if stage != Stage::Persist && self.status(stage) == StageStatus::Pending {
                self.skip(stage, reason);
            }
        }
    }

    pub fn verdict(&self) -> Verdict {
        match &self.fatal {
            None => Verdict::Succeeded,
            Some((stage, error)) => Verdict::Failed {
                stage: Some(*stage),
                error: error.clone(),
            },
        }
    }
}
