use crate::cli::FoldArgs;
use foldhost::backend::StructureFiles;
use foldhost::config::{validate, Config};
use foldhost::core::{FoldhostError, FoldhostResult};
use foldhost::pipeline::{FoldJob, FoldPipeline, RunReport, SequenceSource, SkipFlags, Verdict};
use foldhost::queue::parse_name;
use foldhost::signals::spawn_signal_listener;
use std::path::Path;
use tracing::info;

pub async fn run(args: FoldArgs, config_path: Option<&Path>) -> FoldhostResult<()> {
    let (_, mut config) = super::load_config(config_path)?;
    if let Some(output) = &args.output {
        config.output.results_dir = output.clone();
    }
    if let Some(hours) = args.timeout_hours {
        config.folding.timeout_hours = hours;
    }
    validate(&config)?;

    let job = build_job(&args, &config)?;
    let pipeline = FoldPipeline::from_config(&config);
    super::reap_on_startup(&config, &pipeline).await;

    let signals = spawn_signal_listener()?;
    info!(job = %job.name(), backend = pipeline.backend().name(), "Dispatching fold");
    let report = pipeline.run(job, signals.drain.clone()).await;

    print_report(&report);
    match report.verdict {
        Verdict::Succeeded => Ok(()),
        Verdict::Failed { stage, error } => Err(FoldhostError::Run {
            job: report.job_name,
            stage,
            source: error,
        }),
    }
}

fn build_job(args: &FoldArgs, config: &Config) -> FoldhostResult<FoldJob> {
    let (protein, variant) = match (&args.protein, &args.fasta) {
        (Some(protein), _) => (protein.clone(), args.variant.clone()),
        (None, Some(fasta)) => {
            let file_name = fasta
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let parsed = parse_name(file_name).map_err(|e| {
                FoldhostError::Argument(format!(
                    "cannot derive a protein name from {}: {}",
                    fasta.display(),
                    e
                ))
            })?;
            (parsed.protein, parsed.variant)
        }
        (None, None) => {
            return Err(FoldhostError::Argument(
                "give a PROTEIN or a --fasta file to take it from".to_string(),
            ))
        }
    };

    let mut skip = SkipFlags::from(args.skip);
    let mut job = FoldJob::new(protein, config.output.results_dir.clone())
        .with_variant(variant)
        .with_rationale(args.rationale.clone())
        .with_fold_timeout(config.fold_timeout());

    if let Some(fasta) = &args.fasta {
        job = job.with_sequence(SequenceSource::File(fasta.clone()));
    } else if let Some(sequence) = &args.sequence {
        job = job.with_sequence(SequenceSource::Inline(sequence.clone()));
    }
    if let Some(pdb) = &args.structure {
        if !pdb.is_file() {
            return Err(FoldhostError::Argument(format!(
                "structure {} does not exist",
                pdb.display()
            )));
        }
        skip.fold = true;
        job = job.with_existing_structure(StructureFiles {
            pdb: pdb.clone(),
            scores: None,
        });
    }
    Ok(job.with_skip(skip))
}

fn print_report(report: &RunReport) {
    println!("{}  run {}", report.job_name, report.run_id);
    for record in &report.stages {
        let status = record.status.as_str();
        match &record.note {
            Some(note) => println!("  {:<18} {:<10} {}", record.stage, status, note),
            None => println!("  {:<18} {}", record.stage, status),
        }
    }
    println!("  results: {}", report.results_dir.display());
}
