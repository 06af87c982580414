/*!
 * Results Lock
 *
 * One run per job name. The lock is an exclusive flock(2) on a file in the
 * results directory that also records the owner's pid for diagnostics. The
 * kernel drops the flock when its owner dies, so a lock left behind by a
 * crashed run is simply reacquired. The file is unlinked on drop; an
 * acquirer that locked an inode which has since been unlinked retries.
 */

use super::types::{StageError, StageResult};
use crate::core::limits::RESULTS_LOCK_FILE;
use crate::core::types::Pid;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[cfg(unix)]
type LockHandle = nix::fcntl::Flock<File>;
#[cfg(not(unix))]
type LockHandle = File;

/// Bound on retries when the lock file is replaced underneath us
const ACQUIRE_ATTEMPTS: usize = 8;

pub struct ResultsLock {
    path: PathBuf,
    _handle: LockHandle,
}

impl std::fmt::Debug for ResultsLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultsLock").field("path", &self.path).finish()
    }
}

impl ResultsLock {
    pub fn acquire(results_dir: &Path, job: &str) -> StageResult<Self> {
        std::fs::create_dir_all(results_dir).map_err(|e| StageError::io(results_dir, e))?;
        let path = results_dir.join(RESULTS_LOCK_FILE);

        for _ in 0..ACQUIRE_ATTEMPTS {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| StageError::io(&path, e))?;

            let Some(mut handle) = try_lock(file, &path)? else {
                return Err(StageError::JobConflict {
                    job: job.to_string(),
                    holder: read_holder(&path).unwrap_or_default(),
                });
            };

            if !still_linked(&handle, &path) {
                debug!(lock = %path.display(), "Lock file replaced while locking, retrying");
                continue;
            }

            let previous = read_holder(&path);
            if previous.is_some() {
                warn!(lock = %path.display(), ?previous, "Taking over lock left by a dead run");
            }
            record_owner(&mut handle, &path)?;
            debug!(lock = %path.display(), "Results lock acquired");
            return Ok(Self {
                path,
                _handle: handle,
            });
        }

        Err(StageError::JobConflict {
            job: job.to_string(),
            holder: read_holder(&path).unwrap_or_default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ResultsLock {
    fn drop(&mut self) {
        // Unlink while still holding the flock
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "Failed to remove results lock");
        }
    }
}

/// `Ok(None)` when another open file description holds the lock
#[cfg(unix)]
fn try_lock(file: File, path: &Path) -> StageResult<Option<LockHandle>> {
    use nix::errno::Errno;
    use nix::fcntl::{Flock, FlockArg};

    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(handle) => Ok(Some(handle)),
        Err((_, Errno::EWOULDBLOCK)) => Ok(None),
        Err((_, errno)) => Err(StageError::io(path, std::io::Error::from(errno))),
    }
}

#[cfg(not(unix))]
fn try_lock(file: File, _path: &Path) -> StageResult<Option<LockHandle>> {
    Ok(Some(file))
}

/// The locked inode is still the one at `path`
#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> bool {
    path.exists()
}

fn record_owner(file: &mut File, path: &Path) -> StageResult<()> {
    file.set_len(0).map_err(|e| StageError::io(path, e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| StageError::io(path, e))?;
    write!(file, "{}", std::process::id()).map_err(|e| StageError::io(path, e))?;
    file.flush().map_err(|e| StageError::io(path, e))
}

fn read_holder(path: &Path) -> Option<Pid> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}
