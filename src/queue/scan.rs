/*!
 * Queue Directory Scan
 */

use super::naming::parse_name;
use super::order::sort_entries;
use super::types::{EntryState, NameError, QueueEntry, QueueError, QueueResult};
use crate::core::limits::DONE_MARKER_EXT;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::trace;

/// Eligible files from one scan, already in processing order
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub entries: Vec<QueueEntry>,
    pub unparseable: Vec<(PathBuf, NameError)>,
}

/// Scan `dir` for inputs. Files in `seen` were handled earlier in this queue
/// lifetime and are ignored.
pub fn scan(dir: &Path, extensions: &[String], seen: &HashSet<PathBuf>) -> QueueResult<ScanOutcome> {
    let scan_error = |source| QueueError::Scan {
        dir: dir.to_path_buf(),
        source,
    };
    let listing = std::fs::read_dir(dir).map_err(scan_error)?;

    let mut outcome = ScanOutcome::default();
    for item in listing {
        let item = item.map_err(scan_error)?;
        let path = item.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if file_name.starts_with('.') || seen.contains(&path) {
            continue;
        }
        if !has_extension(&path, extensions) {
            continue;
        }
        // Follows symlinks; vanished files are skipped
        let Ok(metadata) = std::fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        if marker_path(&path).exists() {
            trace!(path = %path.display(), "Done marker present, skipping");
            continue;
        }

        match parse_name(&file_name) {
            Ok(parsed) => outcome.entries.push(QueueEntry {
                path,
                file_name,
                protein: parsed.protein,
                variant: parsed.variant,
                key: parsed.key,
                modified: metadata.modified().unwrap_or(std::time::UNIX_EPOCH),
                discovered_at: OffsetDateTime::now_utc(),
                state: EntryState::Discovered,
            }),
            Err(e) => outcome.unparseable.push((path, e)),
        }
    }

    sort_entries(&mut outcome.entries);
    Ok(outcome)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|want| want.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// `<dir>/<stem>.done`
pub fn marker_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}.{}", stem, DONE_MARKER_EXT))
}
