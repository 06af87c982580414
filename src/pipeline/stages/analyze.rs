//! Analyze: confidence summary of the predicted (or supplied) structure

use super::bounded;
use crate::pipeline::driver::{Completion, FoldPipeline};
use crate::pipeline::run::PipelineRun;
use crate::pipeline::types::{StageError, StageOutput, StageResult};
use crate::signals::CancelToken;

impl FoldPipeline {
    pub(in crate::pipeline) async fn analyze(
        &self,
        run: &mut PipelineRun,
        cancel: &CancelToken,
    ) -> StageResult<Completion> {
        let Some(structure) = run.artifacts.structure.present().cloned() else {
            return Ok(Completion::Skipped("no structure".to_string()));
        };

        let summary = bounded(
            "structure analyzer",
            self.settings.collaborator_timeout,
            cancel,
            StageError::Analysis,
            self.analyzer.analyze(&structure),
        )
        .await?;

        let note = format!(
            "mean pLDDT {:.1} over {} residues",
            summary.mean_plddt, summary.residues
        );
        run.artifacts.confidence = StageOutput::Present(summary);
        Ok(Completion::Done(Some(note)))
    }
}
