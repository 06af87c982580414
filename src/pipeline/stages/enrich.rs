/*!
 * ClinicalLookup and LiteratureSearch
 *
 * Both are best-effort: the driver records their failures without failing
 * the run. Missing collaborators skip the stage.
 */

use super::bounded;
use crate::pipeline::driver::{Completion, FoldPipeline};
use crate::pipeline::run::PipelineRun;
use crate::pipeline::types::{StageError, StageOutput, StageResult};
use crate::signals::CancelToken;
use tracing::debug;

impl FoldPipeline {
    pub(in crate::pipeline) async fn clinical_lookup(
        &self,
        run: &mut PipelineRun,
        cancel: &CancelToken,
    ) -> StageResult<Completion> {
        let job = run.job();
        let Some(variant) = job.variant.clone() else {
            return Ok(Completion::Skipped("no variant".to_string()));
        };
        let Some(source) = &self.clinical else {
            return Ok(Completion::Skipped("no clinical source configured".to_string()));
        };
        let protein = job.protein.clone();

        debug!(protein = %protein, variant = %variant, "Looking up clinical annotations");
        let record = bounded(
            "clinical lookup",
            self.settings.collaborator_timeout,
            cancel,
            StageError::Collaborator,
            source.lookup(&protein, &variant),
        )
        .await?;

        let note = match &record {
            Some(found) => found
                .significance
                .clone()
                .unwrap_or_else(|| "entry without significance".to_string()),
            None => "no entry".to_string(),
        };
        run.artifacts.clinical = StageOutput::Present(record);
        Ok(Completion::Done(Some(note)))
    }

    pub(in crate::pipeline) async fn literature_search(
        &self,
        run: &mut PipelineRun,
        cancel: &CancelToken,
    ) -> StageResult<Completion> {
        let Some(source) = &self.literature else {
            return Ok(Completion::Skipped("no literature source configured".to_string()));
        };
        let protein = run.job().protein.clone();
        let variant = run.job().variant.clone();

        let papers = bounded(
            "literature search",
            self.settings.collaborator_timeout,
            cancel,
            StageError::Collaborator,
            source.search(&protein, variant.as_deref()),
        )
        .await?;

        let note = format!("{} papers", papers.len());
        run.artifacts.papers = StageOutput::Present(papers);
        Ok(Completion::Done(Some(note)))
    }
}
