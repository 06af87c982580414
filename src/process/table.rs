/*!
 * Process Table Capability
 *
 * Narrow interface over host process inspection and process-group signalling.
 * The supervisor and the stale-process reaper only ever touch the OS through
 * this trait, so both can be driven by a fake table in tests.
 */

use super::types::{GroupTermination, ProcessError, ProcessResult};
use crate::core::limits::GROUP_POLL_INTERVAL;
use crate::core::types::{Pgid, Pid};
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{killpg, Signal as UnixSignal};
#[cfg(unix)]
use nix::unistd::Pid as NixPid;

/// Signals the supervisor sends to a process group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// SIGTERM: ask the group to exit
    Terminate,
    /// SIGKILL: force the group down
    Kill,
}

/// One row of the host process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub ppid: Pid,
    pub pgid: Pgid,
    pub sid: Pid,
    /// Full command line with arguments joined by spaces
    pub cmdline: String,
}

/// Identity of the current process, used to exclude our own tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: Pid,
    pub ppid: Pid,
    pub pgid: Pgid,
    pub sid: Pid,
}

/// Host process inspection and group signalling
#[cfg_attr(test, mockall::automock)]
pub trait ProcessTable: Send + Sync {
    /// Enumerate running processes
    fn list(&self) -> ProcessResult<Vec<ProcessEntry>>;

    /// Send a signal to every member of a process group.
    /// Returns `false` when the group no longer exists.
    fn signal_group(&self, pgid: Pgid, signal: GroupSignal) -> ProcessResult<bool>;

    /// Whether any member of the group is still alive
    fn group_alive(&self, pgid: Pgid) -> bool;

    /// Identity of the calling process
    fn current(&self) -> ProcessIdentity;
}

/// Linux implementation reading /proc and signalling with killpg(2)
#[derive(Debug, Clone, Default)]
pub struct ProcfsTable;

impl ProcfsTable {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl ProcessTable for ProcfsTable {
    fn list(&self) -> ProcessResult<Vec<ProcessEntry>> {
        let dir = std::fs::read_dir("/proc")
            .map_err(|e| ProcessError::TableUnavailable(format!("/proc: {}", e)))?;

        let mut entries = Vec::new();
        for item in dir.flatten() {
            let name = item.file_name();
            let Some(pid) = name.to_str().and_then(|s| s.parse::<Pid>().ok()) else {
                continue;
            };

            // Processes can vanish between readdir and open; skip quietly.
            let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) else {
                continue;
            };
            let Some((ppid, pgid, sid)) = parse_stat(&stat) else {
                continue;
            };
            let cmdline = std::fs::read(format!("/proc/{}/cmdline", pid))
                .map(|raw| render_cmdline(&raw))
                .unwrap_or_default();

            entries.push(ProcessEntry {
                pid,
                ppid,
                pgid,
                sid,
                cmdline,
            });
        }
        Ok(entries)
    }

    fn signal_group(&self, pgid: Pgid, signal: GroupSignal) -> ProcessResult<bool> {
        if pgid <= 1 {
            return Err(ProcessError::Signal {
                pgid,
                reason: "refusing to signal init or every process".to_string(),
            });
        }
        let sig = match signal {
            GroupSignal::Terminate => UnixSignal::SIGTERM,
            GroupSignal::Kill => UnixSignal::SIGKILL,
        };
        match killpg(NixPid::from_raw(pgid), sig) {
            Ok(()) => {
                debug!(pgid, signal = ?sig, "Signalled process group");
                Ok(true)
            }
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(ProcessError::Signal {
                pgid,
                reason: e.to_string(),
            }),
        }
    }

    fn group_alive(&self, pgid: Pgid) -> bool {
        if pgid <= 1 {
            return false;
        }
        match killpg(NixPid::from_raw(pgid), None::<UnixSignal>) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn current(&self) -> ProcessIdentity {
        let pid = nix::unistd::getpid().as_raw();
        ProcessIdentity {
            pid,
            ppid: nix::unistd::getppid().as_raw(),
            pgid: nix::unistd::getpgrp().as_raw(),
            sid: nix::unistd::getsid(None).map(|p| p.as_raw()).unwrap_or(pid),
        }
    }
}

#[cfg(not(unix))]
impl ProcessTable for ProcfsTable {
    fn list(&self) -> ProcessResult<Vec<ProcessEntry>> {
        Err(ProcessError::TableUnavailable(
            "process enumeration requires /proc".to_string(),
        ))
    }

    fn signal_group(&self, pgid: Pgid, _signal: GroupSignal) -> ProcessResult<bool> {
        Err(ProcessError::Signal {
            pgid,
            reason: "process groups not supported on this platform".to_string(),
        })
    }

    fn group_alive(&self, _pgid: Pgid) -> bool {
        false
    }

    fn current(&self) -> ProcessIdentity {
        let pid = std::process::id() as Pid;
        ProcessIdentity {
            pid,
            ppid: 0,
            pgid: pid,
            sid: pid,
        }
    }
}

/// Parse ppid, pgrp and session out of /proc/<pid>/stat.
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so fields are split after the last ')'.
pub fn parse_stat(stat: &str) -> Option<(Pid, Pgid, Pid)> {
    let close = stat.rfind(')')?;
    let mut fields = stat[close + 1..].split_whitespace();
    let _state = fields.next()?;
    let ppid = fields.next()?.parse().ok()?;
    let pgid = fields.next()?.parse().ok()?;
    let sid = fields.next()?.parse().ok()?;
    Some((ppid, pgid, sid))
}

/// NUL-separated argv into a single space-joined string
pub fn render_cmdline(raw: &[u8]) -> String {
    raw.split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// SIGTERM a whole process group, then SIGKILL it if any member is still
/// alive once `grace` has elapsed.
pub async fn terminate_group(
    table: &dyn ProcessTable,
    pgid: Pgid,
    grace: Duration,
) -> ProcessResult<GroupTermination> {
    if !table.group_alive(pgid) {
        return Ok(GroupTermination::AlreadyGone);
    }

    if !table.signal_group(pgid, GroupSignal::Terminate)? {
        return Ok(GroupTermination::AlreadyGone);
    }

    if wait_group_gone(table, pgid, grace).await {
        debug!(pgid, "Process group exited after SIGTERM");
        return Ok(GroupTermination::Graceful);
    }

    warn!(
        pgid,
        grace_ms = grace.as_millis() as u64,
        "Process group ignored SIGTERM, escalating to SIGKILL"
    );
    table.signal_group(pgid, GroupSignal::Kill)?;

    if wait_group_gone(table, pgid, grace.max(GROUP_POLL_INTERVAL * 10)).await {
        Ok(GroupTermination::Forced)
    } else {
        Err(ProcessError::Unkillable(pgid))
    }
}

/// Poll until the group disappears or the deadline passes
async fn wait_group_gone(table: &dyn ProcessTable, pgid: Pgid, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if !table.group_alive(pgid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(GROUP_POLL_INTERVAL).await;
    }
}
