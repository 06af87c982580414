/*!
 * Pipeline Driver
 *
 * Drives one FoldJob through the stages in order. Fatal failures stop the
 * run; best-effort failures are recorded and the run continues. Every run
 * that got hold of its results directory ends with Persist.
 */

use super::lock::ResultsLock;
use super::run::PipelineRun;
use super::types::{
    FoldJob, PipelineSettings, RunReport, Stage, StageError, StageOutput, StageStatus, Verdict,
};
use crate::backend::FoldBackend;
use crate::collaborators::{ClinicalSource, LiteratureSource, SequenceLookup, StructureAnalyzer};
use crate::core::limits::STRUCTURE_DIR;
use crate::monitoring::{span_run, ResourceMonitor, StageSpan};
use crate::process::{ProcessSupervisor, StaleProcessReaper};
use crate::signals::CancelToken;
use crate::summary::Summarizer;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// How a stage finished when it did not fail
pub(super) enum Completion {
    Done(Option<String>),
    Skipped(String),
}

pub struct FoldPipeline {
    pub(super) settings: PipelineSettings,
    pub(super) backend: Arc<dyn FoldBackend>,
    pub(super) monitor: Arc<dyn ResourceMonitor>,
    pub(super) supervisor: Arc<ProcessSupervisor>,
    pub(super) reaper: Option<Arc<StaleProcessReaper>>,
    pub(super) sequence_lookup: Option<Arc<dyn SequenceLookup>>,
    pub(super) analyzer: Arc<dyn StructureAnalyzer>,
    pub(super) clinical: Option<Arc<dyn ClinicalSource>>,
    pub(super) literature: Option<Arc<dyn LiteratureSource>>,
    pub(super) summarizer: Option<Arc<dyn Summarizer>>,
}

impl FoldPipeline {
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn backend(&self) -> &Arc<dyn FoldBackend> {
        &self.backend
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub fn reaper(&self) -> Option<&Arc<StaleProcessReaper>> {
        self.reaper.as_ref()
    }

    /// Run one job to a terminal verdict. Never panics on stage failure;
    /// the outcome is in the report.
    pub async fn run(&self, job: FoldJob, cancel: CancelToken) -> RunReport {
        let mut run = PipelineRun::new(job);
        let job_name = run.job().name();
        let span = span_run(&job_name, &run.run_id().to_string());

        async move {
            let results_dir = run.job().results_dir();
            info!(results = %results_dir.display(), "Starting run");

            let lock = match ResultsLock::acquire(&results_dir, &job_name) {
                Ok(lock) => lock,
                Err(e) => {
                    error!(error = %e, "Cannot take the results directory");
                    run.skip_remaining("job conflict");
                    run.skip(Stage::Persist, "job conflict");
                    return RunReport {
                        run_id: run.run_id(),
                        job_name,
                        verdict: Verdict::Failed {
                            stage: None,
                            error: e,
                        },
                        stages: run.records().to_vec(),
                        results_dir,
                        persisted: false,
                    };
                }
            };

            self.drive(&mut run, &cancel).await;
            let persisted = self.persist(&mut run).await;
            drop(lock);

            let verdict = run.verdict();
            match &verdict {
                Verdict::Succeeded => info!("Run succeeded"),
                Verdict::Failed { stage, error } => {
                    error!(stage = ?stage, kind = error.kind(), error = %error, "Run failed")
                }
            }
            RunReport {
                run_id: run.run_id(),
                job_name,
                verdict,
                stages: run.records().to_vec(),
                results_dir,
                persisted,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, run: &mut PipelineRun, cancel: &CancelToken) {
        for stage in Stage::ALL {
            if stage == Stage::Persist || run.is_failed() {
                break;
            }

            if run.job().skip.skips(stage) {
                self.skip_stage(run, stage);
                continue;
            }

            let stage_span = StageSpan::new(stage.as_str());
            run.start(stage);

            let result = if cancel.is_cancelled() {
                Err(StageError::Cancelled)
            } else {
                self.execute(stage, run, cancel)
                    .instrument(stage_span.span().clone())
                    .await
            };

            match result {
                Ok(Completion::Done(note)) => {
                    stage_span.record_result("succeeded");
                    run.succeed(stage, note);
                }
                Ok(Completion::Skipped(reason)) => {
                    stage_span.record_result("skipped");
                    info!(stage = %stage, reason = %reason, "Stage skipped");
                    run.artifacts
                        .mark_absent(stage, StageStatus::Skipped, reason.clone());
                    run.skip(stage, reason);
                }
                Err(e) => {
                    stage_span.record_result("failed");
                    let fatal = !stage.is_best_effort() || e == StageError::Cancelled;
                    if fatal {
                        error!(stage = %stage, error = %e, "Stage failed");
                    } else {
                        warn!(stage = %stage, error = %e, "Best-effort stage failed, continuing");
                    }
                    run.artifacts
                        .mark_absent(stage, StageStatus::Failed, e.to_string());
                    run.fail(stage, &e, fatal);
                }
            }
        }

        if run.is_failed() {
            run.skip_remaining("earlier stage failed");
        }
    }

    /// A skipped Fold still yields a structure when one was supplied, or
    /// when an earlier fold of this job left a model in the results tree
    fn skip_stage(&self, run: &mut PipelineRun, stage: Stage) {
        let existing = match stage {
            Stage::Fold => match run.job().existing_structure.clone() {
                Some(supplied) => Some((supplied, "using supplied structure")),
                None => self
                    .backend
                    .collect(&run.job().results_dir().join(STRUCTURE_DIR))
                    .map(|found| (found, "using structure from an earlier fold")),
            },
            _ => None,
        };
        match existing {
            Some((structure, origin)) => {
                info!(pdb = %structure.pdb.display(), "Fold skipped, {}", origin);
                run.artifacts.files.insert("structure", structure.pdb.clone());
                run.artifacts.structure = StageOutput::Present(structure);
                run.skip(stage, format!("skipped by request, {}", origin));
            }
            None => {
                run.artifacts.mark_absent(
                    stage,
                    StageStatus::Skipped,
                    "skipped by request".to_string(),
                );
                run.skip(stage, "skipped by request");
            }
        }
    }

    async fn execute(
        &self,
        stage: Stage,
        run: &mut PipelineRun,
        cancel: &CancelToken,
    ) -> Result<Completion, StageError> {
        match stage {
            Stage::ResolveSequence => self.resolve_sequence(run, cancel).await,
            Stage::Fold => self.fold(run, cancel).await,
            Stage::Analyze => self.analyze(run, cancel).await,
            Stage::ClinicalLookup => self.clinical_lookup(run, cancel).await,
            Stage::LiteratureSearch => self.literature_search(run, cancel).await,
            Stage::Summarize => self.summarize(run, cancel).await,
            // Persist runs after the loop, for every terminal run
            Stage::Persist => Ok(Completion::Skipped("persisted after the run".to_string())),
        }
    }
}
