/*!
 * ResolveSequence
 *
 * Produces `input.fasta` in the results directory from inline text, an
 * existing file or the sequence lookup collaborator.
 */

use super::bounded;
use crate::backend::locate::fasta_residue_count;
use crate::pipeline::driver::{Completion, FoldPipeline};
use crate::pipeline::run::PipelineRun;
use crate::pipeline::types::{SequenceSource, StageError, StageResult};
use crate::signals::CancelToken;
use tracing::{debug, info};

pub(crate) const INPUT_FASTA: &str = "input.fasta";

impl FoldPipeline {
    pub(in crate::pipeline) async fn resolve_sequence(
        &self,
        run: &mut PipelineRun,
        cancel: &CancelToken,
    ) -> StageResult<Completion> {
        let job = run.job().clone();
        let unavailable = |reason: String| StageError::SequenceUnavailable {
            protein: job.protein.clone(),
            reason,
        };

        let (text, origin) = match &job.sequence {
            Some(SequenceSource::File(path)) => {
                if !path.is_file() {
                    return Err(unavailable(format!("{} does not exist", path.display())));
                }
                let residues = fasta_residue_count(path);
                if residues == 0 {
                    return Err(unavailable(format!("{} has no residues", path.display())));
                }
                run.artifacts.fasta = Some(path.clone());
                run.artifacts.files.insert("fasta", path.clone());
                return Ok(Completion::Done(Some(format!(
                    "{} residues from {}",
                    residues,
                    path.display()
                ))));
            }
            Some(SequenceSource::Inline(text)) => (text.clone(), "inline"),
            None if job.skip.fold => {
                return Ok(Completion::Done(Some("no sequence needed".to_string())));
            }
            None => {
                let Some(lookup) = &self.sequence_lookup else {
                    return Err(unavailable(
                        "no sequence given and no sequence lookup configured".to_string(),
                    ));
                };
                debug!(protein = %job.protein, "Fetching sequence");
                let protein = job.protein.clone();
                let text = bounded(
                    "sequence lookup",
                    self.settings.collaborator_timeout,
                    cancel,
                    |reason| StageError::SequenceUnavailable {
                        protein: String::new(),
                        reason,
                    },
                    lookup.fetch_fasta(&job.protein),
                )
                .await
                .map_err(|e| match e {
                    StageError::SequenceUnavailable { reason, .. } => {
                        StageError::SequenceUnavailable { protein, reason }
                    }
                    other => other,
                })?;
                (text, "lookup")
            }
        };

        let fasta = to_fasta(&job.name(), &text)
            .ok_or_else(|| unavailable(format!("{} sequence has no residues", origin)))?;

        let dir = job.results_dir();
        let path = dir.join(INPUT_FASTA);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StageError::io(&dir, e))?;
        tokio::fs::write(&path, &fasta)
            .await
            .map_err(|e| StageError::io(&path, e))?;

        info!(path = %path.display(), origin, "Sequence resolved");
        run.artifacts.fasta = Some(path.clone());
        run.artifacts.files.insert("fasta", path);
        Ok(Completion::Done(Some(format!("{} sequence", origin))))
    }
}

/// Normalise raw residues or FASTA text into a FASTA document.
/// `None` when there are no residues.
pub(crate) fn to_fasta(name: &str, text: &str) -> Option<String> {
    let text = text.trim();
    if text.starts_with('>') {
        let has_residues = text
            .lines()
            .skip(1)
            .any(|line| line.chars().any(|c| c.is_ascii_alphabetic()));
        return has_residues.then(|| format!("{}\n", text));
    }

    let residues: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if residues.is_empty() {
        return None;
    }
    Some(format!(">{}\n{}\n", name, residues))
}
