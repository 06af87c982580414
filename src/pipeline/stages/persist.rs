/*!
 * Persist
 *
 * Writes the run's artifacts into the results directory and finally
 * `metadata.json`. Persist runs for every run that acquired the results
 * directory, including failed ones, so partial artifacts are kept.
 * `metadata.json` is written even when Persist itself is skipped.
 */

use crate::monitoring::StageSpan;
use crate::pipeline::driver::FoldPipeline;
use crate::pipeline::run::{FoldRecord, PipelineRun};
use crate::pipeline::types::{Stage, StageError, StageRecord, StageResult, Verdict};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

pub const METADATA_FILE: &str = "metadata.json";

#[derive(Serialize)]
struct JobMetadata<'a> {
    name: String,
    protein: &'a str,
    variant: Option<&'a str>,
    rationale: Option<&'a str>,
    fold_timeout_secs: u64,
}

#[derive(Serialize)]
struct VerdictMetadata {
    status: &'static str,
    stage: Option<Stage>,
    error_kind: Option<&'static str>,
    message: Option<String>,
}

impl From<&Verdict> for VerdictMetadata {
    fn from(verdict: &Verdict) -> Self {
        match verdict {
            Verdict::Succeeded => Self {
                status: "succeeded",
                stage: None,
                error_kind: None,
                message: None,
            },
            Verdict::Failed { stage, error } => Self {
                status: "failed",
                stage: *stage,
                error_kind: Some(error.kind()),
                message: Some(error.to_string()),
            },
        }
    }
}

#[derive(Serialize)]
struct RunMetadata<'a> {
    run_id: Uuid,
    job: JobMetadata<'a>,
    #[serde(with = "time::serde::rfc3339")]
    started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    finished_at: OffsetDateTime,
    verdict: VerdictMetadata,
    stages: &'a [StageRecord],
    fold: Option<&'a FoldRecord>,
    /// Paths relative to the results directory where possible
    artifacts: BTreeMap<&'static str, PathBuf>,
}

impl FoldPipeline {
    /// Returns whether metadata.json was written
    pub(in crate::pipeline) async fn persist(&self, run: &mut PipelineRun) -> bool {
        let dir = run.job().results_dir();

        if run.job().skip.persist {
            run.skip(Stage::Persist, "skipped by request");
        } else {
            let stage_span = StageSpan::new(Stage::Persist.as_str());
            run.start(Stage::Persist);
            match write_artifacts(run, &dir).await {
                Ok(count) => {
                    stage_span.record_result("succeeded");
                    run.succeed(Stage::Persist, Some(format!("{} artifact files", count)));
                }
                Err(e) => {
                    stage_span.record_result("failed");
                    error!(error = %e, "Failed to persist artifacts");
                    run.fail(Stage::Persist, &e, true);
                }
            }
        }

        match write_metadata(run, &dir).await {
            Ok(path) => {
                info!(path = %path.display(), "Run metadata written");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to write run metadata");
                run.record_fatal(Stage::Persist, e);
                false
            }
        }
    }
}

async fn write_artifacts(run: &mut PipelineRun, dir: &Path) -> StageResult<usize> {
    let artifacts = &run.artifacts;
    let mut written: Vec<(&'static str, PathBuf, Vec<u8>)> = Vec::new();

    if let Some(confidence) = artifacts.confidence.present() {
        written.push(("confidence", dir.join("analysis").join("confidence.json"), to_json(confidence)?));
    }
    if let Some(clinical) = artifacts.clinical.present() {
        written.push(("clinical", dir.join("clinical").join("clinical.json"), to_json(clinical)?));
    }
    if let Some(papers) = artifacts.papers.present() {
        written.push(("papers", dir.join("papers").join("papers.json"), to_json(papers)?));
    }
    if let Some(summary) = artifacts.summary.present() {
        let markdown = summary.to_markdown(&run.job().title());
        written.push(("summary", dir.join("summary.md"), markdown.into_bytes()));
    }

    let count = written.len();
    for (role, path, bytes) in written {
        write_atomic(&path, &bytes).await?;
        run.artifacts.files.insert(role, path);
    }
    Ok(count)
}

async fn write_metadata(run: &PipelineRun, dir: &Path) -> StageResult<PathBuf> {
    let job = run.job();
    let verdict = run.verdict();
    let metadata = RunMetadata {
        run_id: run.run_id(),
        job: JobMetadata {
            name: job.name(),
            protein: &job.protein,
            variant: job.variant.as_deref(),
            rationale: job.rationale.as_deref(),
            fold_timeout_secs: job.fold_timeout.as_secs(),
        },
        started_at: run.started_at(),
        finished_at: OffsetDateTime::now_utc(),
        verdict: VerdictMetadata::from(&verdict),
        stages: run.records(),
        fold: run.artifacts().fold.as_ref(),
        artifacts: run
            .artifacts()
            .files
            .iter()
            .map(|(role, path)| {
                let relative = path.strip_prefix(dir).unwrap_or(path);
                (*role, relative.to_path_buf())
            })
            .collect(),
    };

    let path = dir.join(METADATA_FILE);
    write_atomic(&path, &to_json(&metadata)?).await?;
    Ok(path)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> StageResult<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| StageError::Persistence(e.to_string()))
}

/// Write through a temporary sibling and rename into place
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> StageResult<()> {
    let persistence = |e: std::io::Error| StageError::Persistence(format!("{}: {}", path.display(), e));

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(persistence)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await.map_err(persistence)?;
    tokio::fs::rename(&tmp, path).await.map_err(persistence)
}
