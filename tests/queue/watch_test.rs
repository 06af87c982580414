/*!
 * Watch Queue Tests
 * Ordering, disposal and draining with a recording job runner
 */

use async_trait::async_trait;
use foldhost::pipeline::{FoldJob, RunReport, SequenceSource, StageError, Verdict};
use foldhost::queue::{
    marker_path, EntryState, JobRunner, ProcessedPolicy, QueueError, QueueSettings, WatchQueue,
};
use foldhost::signals::{CancelSource, CancelToken};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Records every job; fails jobs whose protein is "BROKEN"
#[derive(Default)]
struct RecordingRunner {
    jobs: Mutex<Vec<FoldJob>>,
    /// Cancelled after the first job, to simulate a shutdown mid-tick
    drain_after_first: Option<Arc<CancelSource>>,
    /// Deletes the input while "running" so disposal fails
    remove_input: bool,
}

impl RecordingRunner {
    fn names(&self) -> Vec<String> {
        self.jobs.lock().iter().map(|j| j.name()).collect()
    }
}

#[async_trait]
impl JobRunner for RecordingRunner {
    async fn run_job(&self, job: FoldJob, _cancel: CancelToken) -> RunReport {
        if self.remove_input {
            if let Some(SequenceSource::File(path)) = &job.sequence {
                let _ = std::fs::remove_file(path);
            }
        }
        let verdict = if job.protein == "BROKEN" {
            Verdict::Failed {
                stage: None,
                error: StageError::ExternalSignal,
            }
        } else {
            Verdict::Succeeded
        };
        let report = RunReport {
            run_id: Uuid::new_v4(),
            job_name: job.name(),
            verdict,
            stages: Vec::new(),
            results_dir: job.results_dir(),
            persisted: true,
        };
        self.jobs.lock().push(job);
        if let Some(drain) = &self.drain_after_first {
            drain.cancel();
        }
        report
    }
}

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, ">x\nMKV\n").unwrap();
    path
}

fn settings(dir: &Path, policy: ProcessedPolicy) -> QueueSettings {
    let mut settings = QueueSettings::new(dir, dir.join("results"));
    settings.policy = policy;
    settings.poll_interval = Duration::from_millis(50);
    settings
}

#[tokio::test]
async fn test_entries_run_in_queue_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in [
        "zeta_Q1.fasta",
        "10_TP53_R175H.fasta",
        "2_SOD1_A4V.fa",
        "alpha.FASTA",
        "notes.txt",
    ] {
        touch(dir.path(), name);
    }

    let runner = RecordingRunner::default();
    let mut queue = WatchQueue::new(settings(dir.path(), ProcessedPolicy::Archive));
    let report = queue
        .tick(&runner, &CancelToken::never(), &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.discovered, 4);
    assert_eq!(report.succeeded, 4);
    assert_eq!(
        runner.names(),
        vec!["SOD1_A4V", "TP53_R175H", "alpha", "zeta_Q1"]
    );

    let jobs = runner.jobs.lock();
    let first = &jobs[0];
    assert_eq!(first.variant.as_deref(), Some("A4V"));
    assert_eq!(first.output_root, dir.path().join("results"));
}

#[tokio::test]
async fn test_archive_runs_each_input_at_most_once() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "SOD1_A4V.fasta");
    // A previous run left an archived file with the same name
    std::fs::create_dir_all(dir.path().join("archive")).unwrap();
    std::fs::write(dir.path().join("archive").join("SOD1_A4V.fasta"), "old").unwrap();

    let runner = RecordingRunner::default();
    let mut queue = WatchQueue::new(settings(dir.path(), ProcessedPolicy::Archive));
    queue
        .tick(&runner, &CancelToken::never(), &CancelToken::never())
        .await
        .unwrap();

    assert!(!input.exists());
    assert!(dir.path().join("archive").join("SOD1_A4V-1.fasta").is_file());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("archive").join("SOD1_A4V.fasta")).unwrap(),
        "old"
    );
    assert_eq!(queue.state(&input), Some(EntryState::Done));

    // Later ticks, and a fresh queue after a restart, find nothing
    let again = queue
        .tick(&runner, &CancelToken::never(), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(again.ran(), 0);
    let mut restarted = WatchQueue::new(settings(dir.path(), ProcessedPolicy::Archive));
    let after_restart = restarted
        .tick(&runner, &CancelToken::never(), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(after_restart.ran(), 0);
    assert_eq!(runner.names().len(), 1);
}

#[tokio::test]
async fn test_marker_policy_leaves_input_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let good = touch(dir.path(), "1_HBB_E6V.fasta");
    let bad = touch(dir.path(), "2_BROKEN.fasta");

    let runner = RecordingRunner::default();
    let mut queue = WatchQueue::new(settings(dir.path(), ProcessedPolicy::Marker));
    let report = queue
        .tick(&runner, &CancelToken::never(), &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert!(good.exists());
    assert_eq!(queue.state(&good), Some(EntryState::Done));
    assert_eq!(queue.state(&bad), Some(EntryState::Failed));

    let marker: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(marker_path(&bad)).unwrap()).unwrap();
    assert_eq!(marker["succeeded"], false);
    assert_eq!(marker["job"], "BROKEN");
    assert!(marker["error"].as_str().unwrap().contains("external signal"));

    // Markers survive a restart
    let mut restarted = WatchQueue::new(settings(dir.path(), ProcessedPolicy::Marker));
    let after_restart = restarted
        .tick(&runner, &CancelToken::never(), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(after_restart.discovered, 0);
    assert_eq!(runner.names().len(), 2);
}

#[tokio::test]
async fn test_unparseable_names_are_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    let odd = touch(dir.path(), "_orphan.fasta");
    touch(dir.path(), "APP.fasta");

    let runner = RecordingRunner::default();
    let mut queue = WatchQueue::new(settings(dir.path(), ProcessedPolicy::Archive));
    let first = queue
        .tick(&runner, &CancelToken::never(), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(first.unparseable, vec![odd.clone()]);
    assert_eq!(runner.names(), vec!["APP"]);

    let second = queue
        .tick(&runner, &CancelToken::never(), &CancelToken::never())
        .await
        .unwrap();
    assert!(second.unparseable.is_empty());
    // Never touched
    assert!(odd.exists());
    assert_eq!(queue.state(&odd), None);
}

#[tokio::test]
async fn test_drain_finishes_current_entry_only() {
    let dir = tempfile::tempdir().unwrap();
    let first = touch(dir.path(), "1_A.fasta");
    let second = touch(dir.path(), "2_B.fasta");
    let third = touch(dir.path(), "3_C.fasta");

    let drain = Arc::new(CancelSource::new());
    let runner = RecordingRunner {
        drain_after_first: Some(Arc::clone(&drain)),
        ..RecordingRunner::default()
    };
    let mut queue = WatchQueue::new(settings(dir.path(), ProcessedPolicy::Archive));
    let report = queue
        .tick(&runner, &drain.token(), &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(runner.names(), vec!["A"]);
    assert_eq!(report.deferred, 2);
    assert!(!first.exists());
    assert!(second.exists());
    assert!(third.exists());
    assert_eq!(queue.state(&second), None);
}

#[tokio::test]
async fn test_disposal_failure_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "MAPT_P301L.fasta");

    let runner = RecordingRunner {
        remove_input: true,
        ..RecordingRunner::default()
    };
    let mut queue = WatchQueue::new(settings(dir.path(), ProcessedPolicy::Archive));
    let report = queue
        .tick(&runner, &CancelToken::never(), &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.disposal_errors.len(), 1);
    assert!(matches!(
        report.disposal_errors[0],
        QueueError::Archive { .. }
    ));
    assert_eq!(queue.state(&input), Some(EntryState::Processing));

    // Reappearing under the same path in this lifetime does not rerun it
    touch(dir.path(), "MAPT_P301L.fasta");
    let again = queue
        .tick(&runner, &CancelToken::never(), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(again.ran(), 0);
    assert_eq!(runner.names().len(), 1);
}

#[tokio::test]
async fn test_run_loop_stops_on_drain() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "SOD1.fasta");

    let drain = CancelSource::new();
    let runner = RecordingRunner::default();
    let mut queue = WatchQueue::new(settings(dir.path(), ProcessedPolicy::Archive));

    let token = drain.token();
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        drain.cancel();
    });
    tokio::time::timeout(
        Duration::from_secs(5),
        queue.run(&runner, token, CancelToken::never()),
    )
    .await
    .expect("run loop returns after drain");
    stopper.await.unwrap();

    assert_eq!(runner.names(), vec!["SOD1"]);
}

#[tokio::test]
async fn test_missing_queue_directory_is_a_scan_error() {
    let dir = tempfile::tempdir().unwrap();
    let runner = RecordingRunner::default();
    let mut queue = WatchQueue::new(settings(
        &dir.path().join("does-not-exist"),
        ProcessedPolicy::Archive,
    ));
    let err = queue
        .tick(&runner, &CancelToken::never(), &CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Scan { .. }));
}
