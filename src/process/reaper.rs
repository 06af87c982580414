/*!
 * Stale Process Reaper
 *
 * Finds backend processes orphaned by an earlier crashed run and takes their
 * process groups down with the same SIGTERM/SIGKILL sequence the supervisor
 * uses.
 *
 * A backend process is orphaned when its nearest non-backend ancestor is
 * gone, is init, or is a service manager that adopted it. A backend whose
 * launcher is still alive (another foldhost run, a user's shell, a container
 * shim) is left alone.
 */

use super::supervisor::ActiveGroups;
use super::table::{terminate_group, ProcessEntry, ProcessIdentity, ProcessTable};
use super::types::{ProcessError, ProcessResult};
use crate::core::limits::{DEFAULT_TERMINATE_GRACE, MAX_ANCESTRY_DEPTH, SUBREAPER_NAMES};
use crate::core::types::{Pgid, Pid};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct StaleProcessReaper {
    table: Arc<dyn ProcessTable>,
    signatures: Vec<String>,
    grace: Duration,
    active: Option<ActiveGroups>,
}

impl StaleProcessReaper {
    pub fn new(table: Arc<dyn ProcessTable>, signatures: Vec<String>) -> Self {
        Self {
            table,
            signatures,
            grace: DEFAULT_TERMINATE_GRACE,
            active: None,
        }
    }

    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Never touch groups registered here
    #[must_use]
    pub fn with_active_groups(mut self, active: ActiveGroups) -> Self {
        self.active = Some(active);
        self
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    /// Terminate orphaned backend processes. Returns how many matching
    /// processes were found in groups that were taken down.
    pub async fn reap(&self) -> ProcessResult<usize> {
        if self.signatures.is_empty() {
            return Ok(0);
        }

        let me = self.table.current();
        let entries = self.table.list()?;

        let by_pid: HashMap<Pid, &ProcessEntry> = entries.iter().map(|e| (e.pid, e)).collect();

        let mut groups: BTreeMap<Pgid, Vec<&ProcessEntry>> = BTreeMap::new();
        for entry in entries.iter().filter(|e| self.is_stale(e, &me, &by_pid)) {
            groups.entry(entry.pgid).or_default().push(entry);
        }

        if groups.is_empty() {
            debug!("No stale backend processes found");
            return Ok(0);
        }

        let mut terminated = 0;
        for (pgid, members) in groups {
            info!(
                pgid,
                processes = members.len(),
                cmdline = %members[0].cmdline,
                "Terminating stale backend process group"
            );
            match terminate_group(self.table.as_ref(), pgid, self.grace).await {
                Ok(outcome) => {
                    debug!(pgid, ?outcome, "Stale group terminated");
                    terminated += members.len();
                }
                Err(ProcessError::Unkillable(pgid)) => {
                    warn!(pgid, "Stale group survived SIGKILL, leaving it");
                }
                Err(e) => {
                    warn!(pgid, error = %e, "Failed to terminate stale group");
                }
            }
        }

        if terminated > 0 {
            info!(count = terminated, "Reaped stale backend processes");
        }
        Ok(terminated)
    }

    fn is_stale<'a>(
        &self,
        entry: &'a ProcessEntry,
        me: &ProcessIdentity,
        by_pid: &HashMap<Pid, &'a ProcessEntry>,
    ) -> bool {
        if entry.pid == me.pid || entry.pid == me.ppid {
            return false;
        }
        if entry.pgid <= 1 || entry.pgid == me.pgid {
            return false;
        }
        if let Some(active) = &self.active {
            if active.contains_key(&entry.pgid) {
                return false;
            }
        }
        if !self.matches_signature(&entry.cmdline) {
            return false;
        }
        self.is_orphaned(entry, me, by_pid)
    }

    /// Walk up through backend processes to the first non-backend ancestor
    fn is_orphaned<'a>(
        &self,
        entry: &'a ProcessEntry,
        me: &ProcessIdentity,
        by_pid: &HashMap<Pid, &'a ProcessEntry>,
    ) -> bool {
        let mut current = entry;
        for _ in 0..MAX_ANCESTRY_DEPTH {
            if current.ppid <= 1 {
                return true;
            }
            if current.ppid == me.pid {
                return false;
            }
            match by_pid.get(&current.ppid).copied() {
                None => return true,
                Some(parent) if self.matches_signature(&parent.cmdline) => current = parent,
                Some(parent) => return is_subreaper(&parent.cmdline),
            }
        }
        false
    }

    fn matches_signature(&self, cmdline: &str) -> bool {
        !cmdline.is_empty() && self.signatures.iter().any(|sig| cmdline.contains(sig.as_str()))
    }
}

/// init or a service manager, judged by the program name
fn is_subreaper(cmdline: &str) -> bool {
    let program = cmdline.split_whitespace().next().unwrap_or_default();
    let name = program.rsplit('/').next().unwrap_or(program);
    SUBREAPER_NAMES.contains(&name)
}
