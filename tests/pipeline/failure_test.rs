/*!
 * Failure Tests
 * How fold and collaborator failures surface in the verdict and metadata
 */

use crate::common::{
    self, FailingAnalyzer, FailingLiterature, FailingSummarizer, ScriptedMonitor, ShellBackend,
    StalledClinical, StalledSummarizer, StaticLiterature,
};
use foldhost::backend::{FoldBackend, StructureFiles};
use foldhost::core::types::GIB;
use foldhost::monitoring::ResourceMonitor;
use foldhost::pipeline::{
    FoldJob, FoldPipeline, ResultsLock, RunReport, SequenceSource, SkipFlags, Stage, StageError,
    StageStatus, Verdict, METADATA_FILE,
};
use foldhost::process::LaunchSpec;
use foldhost::signals::{CancelSource, CancelToken};
use foldhost::summary::TemplateSummarizer;
use pretty_assertions::assert_eq;
use serde_json::Value;
use serial_test::serial;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SEQUENCE: &str = "MDVFMKGLSKAKEGVVAAAEKTKQGVAEAAGKTKEGVLYVGSKTKEGVVHGVATVAEKTKEQVTNVGGAVVTGVTAVAQKTVEGAGSIAAATGFVKKDQLGKNEEGAPQEGILEDMPVDPDNEAYEMPSEEGYQDYEPEA";

fn job(out: &Path) -> FoldJob {
    FoldJob::new("SNCA", out)
        .with_variant(Some("A53T".to_string()))
        .with_sequence(SequenceSource::Inline(SEQUENCE.to_string()))
        .with_fold_timeout(Duration::from_secs(30))
}

fn build(backend: Arc<dyn FoldBackend>, monitor: Arc<ScriptedMonitor>) -> FoldPipeline {
    FoldPipeline::builder(common::fast_settings(), backend)
        .with_monitor(monitor as Arc<dyn ResourceMonitor>)
        .with_supervisor(common::supervisor(Duration::from_millis(300)))
        .build()
}

fn failed_with(report: &RunReport) -> (Option<Stage>, StageError) {
    match &report.verdict {
        Verdict::Failed { stage, error } => (*stage, error.clone()),
        Verdict::Succeeded => panic!("run unexpectedly succeeded"),
    }
}

fn metadata(report: &RunReport) -> Value {
    let text = std::fs::read_to_string(report.results_dir.join(METADATA_FILE)).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn assert_downstream_skipped(report: &RunReport, after: Stage) {
    for stage in Stage::ALL
        .into_iter()
        .filter(|s| *s > after && *s != Stage::Persist)
    {
        assert_eq!(report.status(stage), StageStatus::Skipped, "{}", stage);
    }
}

#[tokio::test]
#[serial]
async fn test_preflight_rejection_launches_nothing() {
    let work = tempfile::tempdir().unwrap();
    let backend = ShellBackend::new("touch \"$2/launched\"");
    let pipeline = build(backend, ScriptedMonitor::constant(GIB));

    let report = pipeline.run(job(work.path()), CancelToken::never()).await;

    let (stage, error) = failed_with(&report);
    assert_eq!(stage, Some(Stage::Fold));
    assert!(matches!(error, StageError::InsufficientResources { .. }));
    assert!(!report.results_dir.join("structure").join("launched").exists());
    assert!(pipeline.supervisor().active_groups().is_empty());
    assert_downstream_skipped(&report, Stage::Fold);

    // Failed runs still persist what they have
    assert!(report.persisted);
    assert_eq!(report.status(Stage::Persist), StageStatus::Succeeded);
    let meta = metadata(&report);
    assert_eq!(meta["verdict"]["status"], "failed");
    assert_eq!(meta["verdict"]["stage"], "fold");
    assert_eq!(meta["verdict"]["error_kind"], "insufficient_resources");
    assert!(report.results_dir.join("input.fasta").is_file());
}

#[tokio::test]
#[serial]
async fn test_watchdog_termination_is_low_memory() {
    let work = tempfile::tempdir().unwrap();
    // Preflight sees plenty, the watchdog then sees 1 GiB
    let monitor = ScriptedMonitor::scripted(vec![Ok(32 * GIB)], GIB);
    let pipeline = build(ShellBackend::new("exec sleep 30"), monitor);

    let started = Instant::now();
    let report = pipeline.run(job(work.path()), CancelToken::never()).await;

    let (stage, error) = failed_with(&report);
    assert_eq!(stage, Some(Stage::Fold));
    assert_eq!(error, StageError::LowMemoryTermination);
    assert!(started.elapsed() < Duration::from_secs(15));

    let meta = metadata(&report);
    assert_eq!(meta["fold"]["watchdog_triggered"], true);
    assert_eq!(meta["fold"]["exit"]["terminated"], "low_memory");
    assert_eq!(meta["verdict"]["error_kind"], "low_memory_termination");
}

#[tokio::test]
#[serial]
async fn test_clean_exit_after_watchdog_is_still_low_memory() {
    let work = tempfile::tempdir().unwrap();
    let model = common::write_model(work.path(), &[90.0]);
    let monitor = ScriptedMonitor::scripted(vec![Ok(32 * GIB)], GIB);
    // Writes a model and exits 0 on SIGTERM
    let script = format!(
        "trap 'cp \"{}\" \"$2/ranked_0.pdb\"; exit 0' TERM; while :; do sleep 0.05; done",
        model.display()
    );
    let pipeline = build(ShellBackend::new(script), monitor);

    let report = pipeline.run(job(work.path()), CancelToken::never()).await;

    let (stage, error) = failed_with(&report);
    assert_eq!(stage, Some(Stage::Fold));
    assert_eq!(error, StageError::LowMemoryTermination);
    assert_eq!(report.status(Stage::Analyze), StageStatus::Skipped);
}

#[tokio::test]
#[serial]
async fn test_non_zero_exit_carries_output_tail() {
    let work = tempfile::tempdir().unwrap();
    let backend = ShellBackend::new("echo 'Running model_1'; echo 'CUDA error: out of memory' >&2; exit 3");
    let pipeline = build(backend, ScriptedMonitor::constant(32 * GIB));

    let report = pipeline.run(job(work.path()), CancelToken::never()).await;

    match failed_with(&report) {
        (Some(Stage::Fold), StageError::NonZeroExit { code, tail }) => {
            assert_eq!(code, 3);
            assert!(tail.iter().any(|l| l.contains("CUDA error")), "{:?}", tail);
        }
        other => panic!("unexpected failure {:?}", other),
    }
    let log = std::fs::read_to_string(report.results_dir.join("logs/backend.log")).unwrap();
    assert!(log.contains("[err] CUDA error: out of memory"));
}

#[tokio::test]
#[serial]
async fn test_exit_zero_without_model_is_missing_structure() {
    let work = tempfile::tempdir().unwrap();
    let pipeline = build(ShellBackend::new("exit 0"), ScriptedMonitor::constant(32 * GIB));

    let report = pipeline.run(job(work.path()), CancelToken::never()).await;

    let (stage, error) = failed_with(&report);
    assert_eq!(stage, Some(Stage::Fold));
    assert!(matches!(error, StageError::MissingStructure { .. }));
}

#[tokio::test]
#[serial]
async fn test_fold_timeout() {
    let work = tempfile::tempdir().unwrap();
    let pipeline = build(ShellBackend::new("exec sleep 30"), ScriptedMonitor::constant(32 * GIB));

    let job = job(work.path()).with_fold_timeout(Duration::from_millis(300));
    let started = Instant::now();
    let report = pipeline.run(job, CancelToken::never()).await;

    let (stage, error) = failed_with(&report);
    assert_eq!(stage, Some(Stage::Fold));
    assert!(matches!(error, StageError::TimedOut { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(metadata(&report)["fold"]["exit"]["terminated"], "timeout");
}

#[tokio::test]
#[serial]
async fn test_cancellation_stops_the_fold() {
    let work = tempfile::tempdir().unwrap();
    let pipeline = build(ShellBackend::new("exec sleep 30"), ScriptedMonitor::constant(32 * GIB));
    let source = CancelSource::new();
    let token = source.token();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        source.cancel();
    });
    let started = Instant::now();
    let report = pipeline.run(job(work.path()), token).await;
    canceller.await.unwrap();

    let (stage, error) = failed_with(&report);
    assert_eq!(stage, Some(Stage::Fold));
    assert_eq!(error, StageError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(pipeline.supervisor().active_groups().is_empty());
    assert!(report.persisted);
}

#[tokio::test]
#[serial]
async fn test_cancelled_before_start() {
    let work = tempfile::tempdir().unwrap();
    let pipeline = build(ShellBackend::new("exit 0"), ScriptedMonitor::constant(32 * GIB));
    let source = CancelSource::new();
    source.cancel();

    let report = pipeline.run(job(work.path()), source.token()).await;

    let (stage, error) = failed_with(&report);
    assert_eq!(stage, Some(Stage::ResolveSequence));
    assert_eq!(error, StageError::Cancelled);
    assert_downstream_skipped(&report, Stage::ResolveSequence);
}

#[tokio::test]
#[serial]
async fn test_second_run_on_same_job_conflicts() {
    let work = tempfile::tempdir().unwrap();
    let pipeline = build(ShellBackend::new("exit 0"), ScriptedMonitor::constant(32 * GIB));
    let job = job(work.path());
    let _held = ResultsLock::acquire(&job.results_dir(), &job.name()).unwrap();

    let report = pipeline.run(job, CancelToken::never()).await;

    match failed_with(&report) {
        (None, StageError::JobConflict { holder, .. }) => {
            assert_eq!(holder, std::process::id() as i32);
        }
        other => panic!("unexpected failure {:?}", other),
    }
    assert!(!report.persisted);
    assert!(!report.results_dir.join(METADATA_FILE).exists());
    assert!(!report.results_dir.join("input.fasta").exists());
}

#[tokio::test]
#[serial]
async fn test_best_effort_failures_keep_the_run_successful() {
    let work = tempfile::tempdir().unwrap();
    let model = common::write_model(work.path(), &[85.0, 86.0]);
    let pipeline = FoldPipeline::builder(common::fast_settings(), ShellBackend::copying(&model))
        .with_monitor(ScriptedMonitor::constant(32 * GIB) as Arc<dyn ResourceMonitor>)
        .with_supervisor(common::supervisor(Duration::from_millis(300)))
        .with_clinical(Arc::new(StalledClinical))
        .with_literature(Arc::new(FailingLiterature))
        .with_summarizer(Arc::new(TemplateSummarizer::new()))
        .build();

    let started = Instant::now();
    let report = pipeline.run(job(work.path()), CancelToken::never()).await;

    assert!(report.is_success(), "{:?}", report.verdict);
    assert!(started.elapsed() < Duration::from_secs(15));
    assert_eq!(report.status(Stage::ClinicalLookup), StageStatus::Failed);
    assert_eq!(report.status(Stage::LiteratureSearch), StageStatus::Failed);
    assert_eq!(report.status(Stage::Summarize), StageStatus::Succeeded);
    assert!(!report.results_dir.join("clinical/clinical.json").exists());
    assert!(!report.results_dir.join("papers/papers.json").exists());
    assert!(report.results_dir.join("summary.md").is_file());

    let meta = metadata(&report);
    let stages = meta["stages"].as_array().unwrap();
    let clinical = stages
        .iter()
        .find(|s| s["stage"] == "clinical_lookup")
        .unwrap();
    assert_eq!(clinical["error_kind"], "recoverable_collaborator_failure");
}

#[tokio::test]
#[serial]
async fn test_clinical_skipped_without_variant() {
    let work = tempfile::tempdir().unwrap();
    let model = common::write_model(work.path(), &[85.0]);
    let pipeline = FoldPipeline::builder(common::fast_settings(), ShellBackend::copying(&model))
        .with_monitor(ScriptedMonitor::constant(32 * GIB) as Arc<dyn ResourceMonitor>)
        .with_clinical(Arc::new(StalledClinical))
        .with_literature(Arc::new(StaticLiterature(vec![common::paper("Tau")])))
        .build();

    let job = FoldJob::new("MAPT", work.path())
        .with_sequence(SequenceSource::Inline(SEQUENCE.to_string()));
    let report = pipeline.run(job, CancelToken::never()).await;

    assert!(report.is_success());
    assert_eq!(report.status(Stage::ClinicalLookup), StageStatus::Skipped);
    assert_eq!(report.status(Stage::LiteratureSearch), StageStatus::Succeeded);
}

#[tokio::test]
#[serial]
async fn test_missing_sequence_fails_first_stage() {
    let work = tempfile::tempdir().unwrap();
    let pipeline = build(ShellBackend::new("exit 0"), ScriptedMonitor::constant(32 * GIB));

    let report = pipeline
        .run(FoldJob::new("SNCA", work.path()), CancelToken::never())
        .await;

    let (stage, error) = failed_with(&report);
    assert_eq!(stage, Some(Stage::ResolveSequence));
    assert!(matches!(error, StageError::SequenceUnavailable { .. }));
}

struct UninstalledBackend;

impl FoldBackend for UninstalledBackend {
    fn name(&self) -> &'static str {
        "colabfold"
    }

    fn availability(&self) -> Result<String, String> {
        Err("colabfold_batch not found on PATH".to_string())
    }

    fn launch_spec(&self, _fasta: &Path, _out_dir: &Path) -> LaunchSpec {
        LaunchSpec::new("colabfold_batch")
    }

    fn signatures(&self) -> Vec<String> {
        vec!["colabfold_batch".to_string()]
    }

    fn collect(&self, _out_dir: &Path) -> Option<StructureFiles> {
        None
    }
}

#[tokio::test]
#[serial]
async fn test_unavailable_backend() {
    let work = tempfile::tempdir().unwrap();
    let monitor = ScriptedMonitor::constant(32 * GIB);
    let pipeline = build(Arc::new(UninstalledBackend), monitor.clone());

    let report = pipeline.run(job(work.path()), CancelToken::never()).await;

    match failed_with(&report) {
        (Some(Stage::Fold), StageError::BackendUnavailable { backend, reason }) => {
            assert_eq!(backend, "colabfold");
            assert!(reason.contains("PATH"));
        }
        other => panic!("unexpected failure {:?}", other),
    }
    // Rejected before the preflight
    assert_eq!(monitor.calls(), 0);
}

#[tokio::test]
#[serial]
async fn test_analysis_failure_after_fold_is_fatal() {
    let work = tempfile::tempdir().unwrap();
    let model = common::write_model(work.path(), &[85.0]);
    let pipeline = FoldPipeline::builder(common::fast_settings(), ShellBackend::copying(&model))
        .with_monitor(ScriptedMonitor::constant(32 * GIB) as Arc<dyn ResourceMonitor>)
        .with_supervisor(common::supervisor(Duration::from_millis(300)))
        .with_analyzer(Arc::new(FailingAnalyzer))
        .with_summarizer(Arc::new(TemplateSummarizer::new()))
        .build();

    let report = pipeline.run(job(work.path()), CancelToken::never()).await;

    let (stage, error) = failed_with(&report);
    assert_eq!(stage, Some(Stage::Analyze));
    assert!(matches!(error, StageError::Analysis(_)), "{:?}", error);
    assert_eq!(report.status(Stage::Fold), StageStatus::Succeeded);
    assert_downstream_skipped(&report, Stage::Analyze);

    let meta = metadata(&report);
    assert_eq!(meta["verdict"]["stage"], "analyze");
    assert_eq!(meta["verdict"]["error_kind"], "analysis");
    assert!(!report.results_dir.join("summary.md").exists());
}

#[tokio::test]
#[serial]
async fn test_analysis_failure_on_supplied_structure_is_fatal() {
    let work = tempfile::tempdir().unwrap();
    let model = common::write_model(work.path(), &[85.0]);
    let pipeline = FoldPipeline::builder(common::fast_settings(), ShellBackend::new("exit 9"))
        .with_monitor(ScriptedMonitor::constant(0) as Arc<dyn ResourceMonitor>)
        .with_analyzer(Arc::new(FailingAnalyzer))
        .build();

    let job = job(work.path())
        .with_skip(SkipFlags {
            fold: true,
            ..SkipFlags::default()
        })
        .with_existing_structure(StructureFiles {
            pdb: model,
            scores: None,
        });
    let report = pipeline.run(job, CancelToken::never()).await;

    let (stage, error) = failed_with(&report);
    assert_eq!(stage, Some(Stage::Analyze));
    assert!(matches!(error, StageError::Analysis(_)), "{:?}", error);
    assert_eq!(report.status(Stage::Fold), StageStatus::Skipped);
}

#[tokio::test]
#[serial]
async fn test_summary_failure_keeps_the_run_successful() {
    let work = tempfile::tempdir().unwrap();
    let model = common::write_model(work.path(), &[85.0]);
    let pipeline = FoldPipeline::builder(common::fast_settings(), ShellBackend::copying(&model))
        .with_monitor(ScriptedMonitor::constant(32 * GIB) as Arc<dyn ResourceMonitor>)
        .with_supervisor(common::supervisor(Duration::from_millis(300)))
        .with_summarizer(Arc::new(FailingSummarizer))
        .build();

    let report = pipeline.run(job(work.path()), CancelToken::never()).await;

    assert!(report.is_success(), "{:?}", report.verdict);
    assert_eq!(report.status(Stage::Summarize), StageStatus::Failed);
    assert_eq!(report.status(Stage::Persist), StageStatus::Succeeded);
    assert!(!report.results_dir.join("summary.md").exists());
    assert!(report.results_dir.join("analysis/confidence.json").is_file());

    let meta = metadata(&report);
    assert_eq!(meta["verdict"]["status"], "succeeded");
    let summarize = meta["stages"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["stage"] == "summarize")
        .cloned()
        .unwrap();
    assert_eq!(summarize["status"], "failed");
}

#[tokio::test]
#[serial]
async fn test_summary_timeout_keeps_the_run_successful() {
    let work = tempfile::tempdir().unwrap();
    let model = common::write_model(work.path(), &[85.0]);
    let mut settings = common::fast_settings();
    settings.summary_timeout = Duration::from_millis(200);
    let pipeline = FoldPipeline::builder(settings, ShellBackend::copying(&model))
        .with_monitor(ScriptedMonitor::constant(32 * GIB) as Arc<dyn ResourceMonitor>)
        .with_supervisor(common::supervisor(Duration::from_millis(300)))
        .with_summarizer(Arc::new(StalledSummarizer))
        .build();

    let started = Instant::now();
    let report = pipeline.run(job(work.path()), CancelToken::never()).await;

    assert!(report.is_success(), "{:?}", report.verdict);
    assert!(started.elapsed() < Duration::from_secs(15));
    assert_eq!(report.status(Stage::Summarize), StageStatus::Failed);
    assert!(report.persisted);
    assert_eq!(metadata(&report)["verdict"]["status"], "succeeded");
}

#[tokio::test]
#[serial]
async fn test_unwritable_artifact_fails_persist() {
    let work = tempfile::tempdir().unwrap();
    let model = common::write_model(work.path(), &[85.0]);
    let pipeline = FoldPipeline::builder(common::fast_settings(), ShellBackend::copying(&model))
        .with_monitor(ScriptedMonitor::constant(32 * GIB) as Arc<dyn ResourceMonitor>)
        .with_supervisor(common::supervisor(Duration::from_millis(300)))
        .build();

    let job = job(work.path());
    // A plain file where the analysis directory belongs
    let results = job.results_dir();
    std::fs::create_dir_all(&results).unwrap();
    std::fs::write(results.join("analysis"), "not a directory").unwrap();

    let report = pipeline.run(job, CancelToken::never()).await;

    let (stage, error) = failed_with(&report);
    assert_eq!(stage, Some(Stage::Persist));
    assert!(matches!(error, StageError::Persistence(_)), "{:?}", error);
    assert_eq!(report.status(Stage::Analyze), StageStatus::Succeeded);
    assert_eq!(report.status(Stage::Persist), StageStatus::Failed);

    let meta = metadata(&report);
    assert_eq!(meta["verdict"]["stage"], "persist");
    assert_eq!(meta["verdict"]["error_kind"], "persistence");
}
