//! Summarize: report built from whatever artifacts the run produced

use super::bounded;
use crate::pipeline::driver::{Completion, FoldPipeline};
use crate::pipeline::run::PipelineRun;
use crate::pipeline::types::{StageError, StageOutput, StageResult};
use crate::signals::CancelToken;
use crate::summary::SummaryInput;

impl FoldPipeline {
    pub(in crate::pipeline) async fn summarize(
        &self,
        run: &mut PipelineRun,
        cancel: &CancelToken,
    ) -> StageResult<Completion> {
        let Some(summarizer) = &self.summarizer else {
            return Ok(Completion::Skipped("summary provider disabled".to_string()));
        };

        let job = run.job();
        let artifacts = &run.artifacts;
        let input = SummaryInput {
            protein: &job.protein,
            variant: job.variant.as_deref(),
            rationale: job.rationale.as_deref(),
            structure: artifacts.structure.present(),
            confidence: artifacts.confidence.present(),
            clinical: artifacts.clinical.present().and_then(Option::as_ref),
            papers: artifacts
                .papers
                .present()
                .map(Vec::as_slice)
                .unwrap_or_default(),
        };

        let document = bounded(
            summarizer.name(),
            self.settings.summary_timeout,
            cancel,
            StageError::Collaborator,
            summarizer.summarize(&input),
        )
        .await?;

        let note = document.generator.clone();
        run.artifacts.summary = StageOutput::Present(document);
        Ok(Completion::Done(Some(note)))
    }
}
