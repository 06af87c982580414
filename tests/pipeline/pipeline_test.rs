/*!
 * Pipeline Tests
 * Successful and partially skipped runs end to end
 */

use crate::common::{self, ScriptedMonitor, ShellBackend, StaticClinical, StaticLiterature};
use foldhost::backend::{FoldBackend, StructureFiles};
use foldhost::core::types::GIB;
use foldhost::monitoring::ResourceMonitor;
use foldhost::pipeline::{
    FoldJob, FoldPipeline, SequenceSource, SkipFlags, Stage, StageStatus, METADATA_FILE,
};
use foldhost::signals::CancelToken;
use foldhost::summary::TemplateSummarizer;
use pretty_assertions::assert_eq;
use serde_json::Value;
use serial_test::serial;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SEQUENCE: &str = "MATKAVCVLKGDGPVQGIINFEQKESNGPVKVWGSIKGLTEGLHGFHVHEFGDNTAGCTSAGPHFNPLSRKHGGPKDEERHVGDLGNVTADKDGVADVSIEDSVISLSGDHCIIGRTLVVHEKADDLGKGGNEESTKTGNAGSRLACGVIGIAQ";

fn metadata(dir: &Path) -> Value {
    let text = std::fs::read_to_string(dir.join(METADATA_FILE)).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn pipeline(backend: Arc<dyn FoldBackend>, available: u64) -> FoldPipeline {
    FoldPipeline::builder(common::fast_settings(), backend)
        .with_monitor(ScriptedMonitor::constant(available) as Arc<dyn ResourceMonitor>)
        .with_supervisor(common::supervisor(Duration::from_millis(300)))
        .with_clinical(Arc::new(StaticClinical(Some(common::pathogenic()))))
        .with_literature(Arc::new(StaticLiterature(vec![
            common::paper("SOD1 A4V destabilises the dimer interface"),
            common::paper("Aggregation of mutant SOD1"),
        ])))
        .with_summarizer(Arc::new(TemplateSummarizer::new()))
        .build()
}

#[tokio::test]
#[serial]
async fn test_full_run_writes_every_artifact() {
    let work = tempfile::tempdir().unwrap();
    let model = common::write_model(work.path(), &[95.0, 92.0, 55.0, 40.0, 88.0]);
    let out = work.path().join("results");

    let pipeline = pipeline(ShellBackend::copying(&model), 32 * GIB);
    let job = FoldJob::new("SOD1", &out)
        .with_variant(Some("A4V".to_string()))
        .with_sequence(SequenceSource::Inline(SEQUENCE.to_string()))
        .with_rationale(Some("ALS-linked variant".to_string()))
        .with_fold_timeout(Duration::from_secs(30));

    let report = pipeline.run(job, CancelToken::never()).await;

    assert!(report.is_success(), "{:?}", report.verdict);
    assert!(report.persisted);
    for stage in Stage::ALL {
        assert_eq!(report.status(stage), StageStatus::Succeeded, "{}", stage);
    }

    let dir = out.join("SOD1_A4V");
    assert_eq!(report.results_dir, dir);
    for file in [
        "input.fasta",
        "structure/ranked_0.pdb",
        "logs/backend.log",
        "analysis/confidence.json",
        "clinical/clinical.json",
        "papers/papers.json",
        "summary.md",
        METADATA_FILE,
    ] {
        assert!(dir.join(file).is_file(), "missing {}", file);
    }
    assert!(!dir.join(".foldhost.lock").exists());

    let fasta = std::fs::read_to_string(dir.join("input.fasta")).unwrap();
    assert!(fasta.starts_with(">SOD1_A4V"));

    let confidence: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("analysis/confidence.json")).unwrap())
            .unwrap();
    assert_eq!(confidence["residues"], 5);
    assert_eq!(confidence["destabilized_residues"], 2);

    let summary = std::fs::read_to_string(dir.join("summary.md")).unwrap();
    assert!(summary.contains("SOD1"));
    assert!(summary.contains("Pathogenic"));

    let meta = metadata(&dir);
    assert_eq!(meta["verdict"]["status"], "succeeded");
    assert_eq!(meta["run_id"], report.run_id.to_string());
    assert_eq!(meta["job"]["variant"], "A4V");
    assert_eq!(meta["fold"]["backend"], "shell");
    assert_eq!(meta["fold"]["exit"]["exited"], 0);
    assert_eq!(meta["fold"]["watchdog_triggered"], false);
    assert_eq!(meta["stages"].as_array().unwrap().len(), 7);
    assert_eq!(meta["artifacts"]["summary"], "summary.md");
}

#[tokio::test]
#[serial]
async fn test_all_skipped_still_writes_metadata() {
    let work = tempfile::tempdir().unwrap();
    let out = work.path().join("results");
    let backend = ShellBackend::new("touch \"$2/launched\"");
    let pipeline = FoldPipeline::builder(common::fast_settings(), backend)
        .with_monitor(ScriptedMonitor::constant(0) as Arc<dyn ResourceMonitor>)
        .build();

    let mut skip = SkipFlags::all();
    skip.persist = false;
    let job = FoldJob::new("TP53", &out).with_skip(skip);
    let report = pipeline.run(job, CancelToken::never()).await;

    assert!(report.is_success(), "{:?}", report.verdict);
    assert_eq!(report.status(Stage::ResolveSequence), StageStatus::Succeeded);
    for stage in [
        Stage::Fold,
        Stage::Analyze,
        Stage::ClinicalLookup,
        Stage::LiteratureSearch,
        Stage::Summarize,
    ] {
        assert_eq!(report.status(stage), StageStatus::Skipped, "{}", stage);
    }
    assert_eq!(report.status(Stage::Persist), StageStatus::Succeeded);

    let dir = out.join("TP53");
    assert!(!dir.join("structure").join("launched").exists());
    let meta = metadata(&dir);
    assert_eq!(meta["verdict"]["status"], "succeeded");
    assert!(meta["fold"].is_null());
}

#[tokio::test]
#[serial]
async fn test_skip_persist_keeps_metadata() {
    let work = tempfile::tempdir().unwrap();
    let out = work.path().join("results");
    let pipeline = FoldPipeline::builder(common::fast_settings(), ShellBackend::new("exit 0"))
        .with_monitor(ScriptedMonitor::constant(0) as Arc<dyn ResourceMonitor>)
        .build();

    let job = FoldJob::new("TP53", &out).with_skip(SkipFlags::all());
    let report = pipeline.run(job, CancelToken::never()).await;

    assert!(report.is_success());
    assert_eq!(report.status(Stage::Persist), StageStatus::Skipped);
    assert!(report.persisted);
    assert!(out.join("TP53").join(METADATA_FILE).is_file());
}

#[tokio::test]
#[serial]
async fn test_supplied_structure_is_analyzed_without_folding() {
    let work = tempfile::tempdir().unwrap();
    let model = common::write_model(work.path(), &[91.0, 93.0, 97.0]);
    let out = work.path().join("results");
    let monitor = ScriptedMonitor::constant(0);

    let pipeline = FoldPipeline::builder(common::fast_settings(), ShellBackend::new("exit 9"))
        .with_monitor(monitor.clone() as Arc<dyn ResourceMonitor>)
        .build();

    let skip = SkipFlags {
        fold: true,
        ..SkipFlags::default()
    };
    let job = FoldJob::new("HBB", &out)
        .with_skip(skip)
        .with_existing_structure(StructureFiles {
            pdb: model.clone(),
            scores: None,
        });
    let report = pipeline.run(job, CancelToken::never()).await;

    assert!(report.is_success(), "{:?}", report.verdict);
    assert_eq!(report.status(Stage::Fold), StageStatus::Skipped);
    assert_eq!(report.status(Stage::Analyze), StageStatus::Succeeded);
    // No preflight, no watchdog
    assert_eq!(monitor.calls(), 0);
    // Not configured
    assert_eq!(report.status(Stage::ClinicalLookup), StageStatus::Skipped);
    assert_eq!(report.status(Stage::Summarize), StageStatus::Skipped);
    assert!(out.join("HBB").join("analysis/confidence.json").is_file());
}

#[tokio::test]
#[serial]
async fn test_skip_fold_reanalyses_earlier_results() {
    let work = tempfile::tempdir().unwrap();
    let out = work.path().join("results");
    // Left behind by an earlier fold of the same job
    let structure = out.join("HBB_E6V").join("structure");
    std::fs::create_dir_all(&structure).unwrap();
    std::fs::write(structure.join("ranked_0.pdb"), common::pdb_with_plddt(&[72.0, 64.0])).unwrap();
    let monitor = ScriptedMonitor::constant(0);

    let pipeline = FoldPipeline::builder(common::fast_settings(), ShellBackend::new("exit 9"))
        .with_monitor(monitor.clone() as Arc<dyn ResourceMonitor>)
        .build();
    let job = FoldJob::new("HBB", &out)
        .with_variant(Some("E6V".to_string()))
        .with_sequence(SequenceSource::Inline(SEQUENCE.to_string()))
        .with_skip(SkipFlags {
            fold: true,
            ..SkipFlags::default()
        });
    let report = pipeline.run(job, CancelToken::never()).await;

    assert!(report.is_success(), "{:?}", report.verdict);
    assert_eq!(report.status(Stage::Fold), StageStatus::Skipped);
    assert_eq!(report.status(Stage::Analyze), StageStatus::Succeeded);
    assert_eq!(monitor.calls(), 0);

    let dir = out.join("HBB_E6V");
    let confidence: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("analysis/confidence.json")).unwrap())
            .unwrap();
    assert_eq!(confidence["residues"], 2);
    let meta = metadata(&dir);
    assert_eq!(meta["artifacts"]["structure"], "structure/ranked_0.pdb");
}

#[tokio::test]
#[serial]
async fn test_analyze_skipped_when_fold_skipped_without_structure() {
    let work = tempfile::tempdir().unwrap();
    let out = work.path().join("results");
    let pipeline = FoldPipeline::builder(common::fast_settings(), ShellBackend::new("exit 0"))
        .with_monitor(ScriptedMonitor::constant(0) as Arc<dyn ResourceMonitor>)
        .with_summarizer(Arc::new(TemplateSummarizer::new()))
        .build();

    let skip = SkipFlags {
        fold: true,
        ..SkipFlags::default()
    };
    let job = FoldJob::new("APP", &out)
        .with_sequence(SequenceSource::Inline(SEQUENCE.to_string()))
        .with_skip(skip);
    let report = pipeline.run(job, CancelToken::never()).await;

    assert!(report.is_success());
    assert_eq!(report.status(Stage::Analyze), StageStatus::Skipped);
    assert_eq!(report.status(Stage::Summarize), StageStatus::Succeeded);
    let summary = std::fs::read_to_string(out.join("APP").join("summary.md")).unwrap();
    assert!(summary.contains("No structure was produced"));
}

#[tokio::test]
#[serial]
async fn test_fasta_file_is_used_in_place() {
    let work = tempfile::tempdir().unwrap();
    let fasta = work.path().join("01_SOD1_G93A.fasta");
    std::fs::write(&fasta, format!(">sp|P00441|SOD1\n{}\n", SEQUENCE)).unwrap();
    let model = common::write_model(work.path(), &[80.0]);
    let out = work.path().join("results");

    // The backend only succeeds when handed the queue file itself
    let script = format!(
        "test \"$1\" = '{}' && cp '{}' \"$2/model.pdb\"",
        fasta.display(),
        model.display()
    );
    let pipeline = pipeline(ShellBackend::new(script), 32 * GIB);
    let job = FoldJob::new("SOD1", &out)
        .with_variant(Some("G93A".to_string()))
        .with_sequence(SequenceSource::File(fasta.clone()));
    let report = pipeline.run(job, CancelToken::never()).await;

    assert!(report.is_success(), "{:?}", report.verdict);
    assert!(!out.join("SOD1_G93A").join("input.fasta").exists());
}
