/*!
 * Backend File Lookup
 * PATH resolution and output-file discovery without shelling out
 */

use std::path::{Path, PathBuf};

/// Resolve a program name the way a shell would. Names containing a path
/// separator are checked directly.
pub fn which(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| is_executable(full))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Regular files under `dir` whose name satisfies `matches`, sorted by path.
/// Descends into subdirectories when `recursive` is set.
pub fn find_files<F>(dir: &Path, recursive: bool, matches: F) -> Vec<PathBuf>
where
    F: Fn(&str) -> bool,
{
    let mut found = Vec::new();
    collect(dir, recursive, &matches, &mut found);
    found.sort();
    found
}

fn collect<F>(dir: &Path, recursive: bool, matches: &F, found: &mut Vec<PathBuf>)
where
    F: Fn(&str) -> bool,
{
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(kind) = entry.file_type() else {
            continue;
        };
        if kind.is_dir() {
            if recursive {
                collect(&path, recursive, matches, found);
            }
        } else if kind.is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if matches(name) {
                    found.push(path.clone());
                }
            }
        }
    }
}

/// First match of the first pattern that matches anything
pub fn first_match(
    dir: &Path,
    recursive: bool,
    patterns: &[&dyn Fn(&str) -> bool],
) -> Option<PathBuf> {
    patterns
        .iter()
        .find_map(|pattern| find_files(dir, recursive, pattern).into_iter().next())
}

/// Residue count of a FASTA file: every non-header character that is not whitespace
pub fn fasta_residue_count(fasta: &Path) -> usize {
    std::fs::read_to_string(fasta)
        .map(|text| {
            text.lines()
                .filter(|line| !line.starts_with('>'))
                .map(|line| line.chars().filter(|c| !c.is_whitespace()).count())
                .sum()
        })
        .unwrap_or(0)
}
