/*!
 * Processed-Input Disposal
 *
 * Archive: move the input into `<queue>/archive/`, suffixing `-N` before the
 * extension when the name is taken. Marker: write `<stem>.done` next to it.
 */

use super::scan::marker_path;
use super::types::{ProcessedPolicy, QueueError, QueueResult};
use crate::core::limits::ARCHIVE_DIR_NAME;
use crate::pipeline::{RunReport, Verdict};
use serde::Serialize;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

/// Contents of a `.done` marker
#[derive(Debug, Serialize)]
struct DoneMarker<'a> {
    input: &'a Path,
    run_id: Uuid,
    job: &'a str,
    succeeded: bool,
    error: Option<String>,
    results_dir: &'a Path,
    #[serde(with = "time::serde::rfc3339")]
    finished_at: OffsetDateTime,
}

/// Dispose of a processed input. Returns where it (or its marker) now is.
pub fn dispose(input: &Path, policy: ProcessedPolicy, report: &RunReport) -> QueueResult<PathBuf> {
    match policy {
        ProcessedPolicy::Archive => archive(input),
        ProcessedPolicy::Marker => mark(input, report),
    }
}

fn archive(input: &Path) -> QueueResult<PathBuf> {
    let archive_error = |reason: String| QueueError::Archive {
        path: input.to_path_buf(),
        reason,
    };
    let parent = input
        .parent()
        .ok_or_else(|| archive_error("input has no parent directory".to_string()))?;
    let archive_dir = parent.join(ARCHIVE_DIR_NAME);
    std::fs::create_dir_all(&archive_dir)
        .map_err(|e| archive_error(format!("{}: {}", archive_dir.display(), e)))?;

    let target = unique_target(&archive_dir, input);
    std::fs::rename(input, &target).map_err(|e| archive_error(e.to_string()))?;
    debug!(from = %input.display(), to = %target.display(), "Input archived");
    Ok(target)
}

/// First free `name`, `stem-1.ext`, `stem-2.ext`, ... in `dir`
fn unique_target(dir: &Path, input: &Path) -> PathBuf {
    let file_name = input.file_name().unwrap_or_default();
    let first = dir.join(file_name);
    if !first.exists() {
        return first;
    }

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (1u32..)
        .map(|n| dir.join(format!("{}-{}{}", stem, n, ext)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

fn mark(input: &Path, report: &RunReport) -> QueueResult<PathBuf> {
    let marker = marker_path(input);
    let marker_error = |reason: String| QueueError::Marker {
        path: input.to_path_buf(),
        reason,
    };
    let error = match &report.verdict {
        Verdict::Succeeded => None,
        Verdict::Failed { error, .. } => Some(error.to_string()),
    };
    let body = DoneMarker {
        input,
        run_id: report.run_id,
        job: &report.job_name,
        succeeded: report.is_success(),
        error,
        results_dir: &report.results_dir,
        finished_at: OffsetDateTime::now_utc(),
    };
    let json = serde_json::to_vec_pretty(&body).map_err(|e| marker_error(e.to_string()))?;

    let mut tmp = marker.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, json).map_err(|e| marker_error(e.to_string()))?;
    std::fs::rename(&tmp, &marker).map_err(|e| marker_error(e.to_string()))?;
    debug!(marker = %marker.display(), "Done marker written");
    Ok(marker)
}
