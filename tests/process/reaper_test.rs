/*!
 * Reaper Tests
 * Stale-process reaping and the preflight retry, driven by a scripted process table
 */

use crate::common::ScriptedMonitor;
use foldhost::core::types::{Pgid, GIB};
use foldhost::monitoring::{PreflightError, PreflightGate, ResourceMonitor};
use foldhost::process::{
    GroupSignal, ProcessEntry, ProcessIdentity, ProcessResult, ProcessSupervisor, ProcessTable,
    StaleProcessReaper,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const ME: ProcessIdentity = ProcessIdentity {
    pid: 4000,
    ppid: 3999,
    pgid: 4000,
    sid: 3000,
};

/// Process table whose groups die on SIGTERM unless marked stubborn
struct ScriptedTable {
    entries: Vec<ProcessEntry>,
    alive: Mutex<HashSet<Pgid>>,
    stubborn: HashSet<Pgid>,
    sent: Mutex<Vec<(Pgid, GroupSignal)>>,
}

impl ScriptedTable {
    fn new(entries: Vec<ProcessEntry>) -> Self {
        let alive = entries.iter().map(|e| e.pgid).collect();
        Self {
            entries,
            alive: Mutex::new(alive),
            stubborn: HashSet::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn stubborn(mut self, pgid: Pgid) -> Self {
        self.stubborn.insert(pgid);
        self
    }

    fn sent(&self) -> Vec<(Pgid, GroupSignal)> {
        self.sent.lock().clone()
    }
}

impl ProcessTable for ScriptedTable {
    fn list(&self) -> ProcessResult<Vec<ProcessEntry>> {
        let alive = self.alive.lock();
        Ok(self
            .entries
            .iter()
            .filter(|e| alive.contains(&e.pgid))
            .cloned()
            .collect())
    }

    fn signal_group(&self, pgid: Pgid, signal: GroupSignal) -> ProcessResult<bool> {
        self.sent.lock().push((pgid, signal));
        let mut alive = self.alive.lock();
        if !alive.contains(&pgid) {
            return Ok(false);
        }
        if signal == GroupSignal::Kill || !self.stubborn.contains(&pgid) {
            alive.remove(&pgid);
        }
        Ok(true)
    }

    fn group_alive(&self, pgid: Pgid) -> bool {
        self.alive.lock().contains(&pgid)
    }

    fn current(&self) -> ProcessIdentity {
        ME
    }
}

fn entry(pid: i32, ppid: i32, pgid: Pgid, sid: i32, cmdline: &str) -> ProcessEntry {
    ProcessEntry {
        pid,
        ppid,
        pgid,
        sid,
        cmdline: cmdline.to_string(),
    }
}

fn host() -> Vec<ProcessEntry> {
    vec![
        // Orphaned colabfold run from a crashed session
        entry(500, 1, 500, 500, "python colabfold_batch in.fasta out"),
        entry(501, 500, 500, 500, "python -m jax worker colabfold_batch"),
        // Unrelated orphan
        entry(600, 1, 600, 600, "postgres: writer"),
        // Our own live fold, same session
        entry(700, ME.pid, 700, ME.sid, "colabfold_batch current.fasta out"),
        // Another terminal's live watch queue and its fold
        entry(750, 1, 750, 750, "foldhost watch /queue"),
        entry(800, 750, 800, 750, "run_alphafold.py --fasta_paths=x"),
        // Launcher exited without reaping
        entry(850, 840, 850, 840, "colabfold_batch lost.fasta out"),
        // Adopted by the user's service manager
        entry(880, 1, 880, 880, "/lib/systemd/systemd --user"),
        entry(900, 880, 900, 900, "run_alphafold.py --fasta_paths=y"),
        // Started by hand from a shell that is still open
        entry(940, 1, 940, 940, "-bash"),
        entry(950, 940, 950, 940, "colabfold_batch manual.fasta out"),
    ]
}

fn signatures() -> Vec<String> {
    vec!["colabfold_batch".to_string(), "run_alphafold".to_string()]
}

#[tokio::test]
async fn test_reaps_only_orphaned_backend_groups() {
    let table = Arc::new(ScriptedTable::new(host()));
    let reaper = StaleProcessReaper::new(table.clone() as Arc<dyn ProcessTable>, signatures())
        .with_grace(Duration::from_millis(50));

    assert_eq!(reaper.reap().await.unwrap(), 4);
    assert_eq!(
        table.sent(),
        vec![
            (500, GroupSignal::Terminate),
            (850, GroupSignal::Terminate),
            (900, GroupSignal::Terminate),
        ]
    );
    for live in [600, 700, 750, 800, 880, 950] {
        assert!(table.group_alive(live), "group {} was touched", live);
    }

    // Nothing left on a second pass
    assert_eq!(reaper.reap().await.unwrap(), 0);
}

#[tokio::test]
async fn test_stubborn_group_gets_sigkill() {
    let table = Arc::new(ScriptedTable::new(host()).stubborn(500));
    let reaper = StaleProcessReaper::new(table.clone() as Arc<dyn ProcessTable>, signatures())
        .with_grace(Duration::from_millis(50));

    reaper.reap().await.unwrap();
    let sent = table.sent();
    assert!(sent.contains(&(500, GroupSignal::Terminate)));
    assert!(sent.contains(&(500, GroupSignal::Kill)));
    assert!(!sent.contains(&(850, GroupSignal::Kill)));
    assert!(sent.iter().all(|(pgid, _)| *pgid != 800));
}

#[tokio::test]
async fn test_supervised_groups_are_never_reaped() {
    let table = Arc::new(ScriptedTable::new(host()));
    let supervisor = ProcessSupervisor::new(table.clone() as Arc<dyn ProcessTable>);
    supervisor
        .active_groups()
        .insert(850, "colabfold_batch".to_string());

    let reaper = StaleProcessReaper::new(table.clone() as Arc<dyn ProcessTable>, signatures())
        .with_grace(Duration::from_millis(50))
        .with_active_groups(supervisor.active_groups());

    assert_eq!(reaper.reap().await.unwrap(), 3);
    assert!(table.group_alive(850));
}

#[tokio::test]
async fn test_fold_of_live_run_in_other_session_is_kept() {
    let table = Arc::new(ScriptedTable::new(vec![
        entry(750, 1, 750, 750, "foldhost watch /queue"),
        entry(800, 750, 750, 750, "colabfold_batch in.fasta out"),
    ]));
    let reaper = StaleProcessReaper::new(table.clone() as Arc<dyn ProcessTable>, signatures())
        .with_grace(Duration::from_millis(50));

    assert_eq!(reaper.reap().await.unwrap(), 0);
    assert!(table.sent().is_empty());
}

#[tokio::test]
async fn test_preflight_retries_after_reaping() {
    let table = Arc::new(ScriptedTable::new(host()));
    let reaper = Arc::new(
        StaleProcessReaper::new(table.clone() as Arc<dyn ProcessTable>, signatures())
            .with_grace(Duration::from_millis(50)),
    );
    let monitor = ScriptedMonitor::scripted(vec![Ok(3 * GIB), Ok(24 * GIB)], 0);

    let gate = PreflightGate::new(monitor.clone() as Arc<dyn ResourceMonitor>).with_reaper(reaper);
    assert_eq!(gate.check(16 * GIB).await.unwrap(), 24 * GIB);
    assert_eq!(monitor.calls(), 2);
    assert!(!table.group_alive(500));
}

#[tokio::test]
async fn test_preflight_rejects_when_nothing_to_reap() {
    let table = Arc::new(ScriptedTable::new(Vec::new()));
    let reaper = Arc::new(StaleProcessReaper::new(
        table as Arc<dyn ProcessTable>,
        signatures(),
    ));
    let monitor = ScriptedMonitor::constant(3 * GIB);

    let gate = PreflightGate::new(monitor.clone() as Arc<dyn ResourceMonitor>).with_reaper(reaper);
    match gate.check(16 * GIB).await {
        Err(PreflightError::InsufficientResources {
            required,
            available,
        }) => {
            assert_eq!(required.bytes(), 16 * GIB);
            assert_eq!(available.bytes(), 3 * GIB);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    // No second reading without a reap
    assert_eq!(monitor.calls(), 1);
}

#[tokio::test]
async fn test_preflight_sensor_failure_rejects() {
    let monitor = crate::common::ScriptedMonitor::scripted(vec![crate::common::sensor_failure()], 64 * GIB);
    let gate = PreflightGate::new(monitor as Arc<dyn ResourceMonitor>);
    assert!(matches!(
        gate.check(GIB).await,
        Err(PreflightError::ResourceQuery(_))
    ));
}
