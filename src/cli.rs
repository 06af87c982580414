use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use foldhost::pipeline::SkipFlags;

#[derive(Parser, Debug)]
#[command(
    name = "foldhost",
    version,
    about = "Run protein structure predictions without taking the machine down with them.",
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Configuration file (default: $FOLDHOST_CONFIG or ~/.foldhost/config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fold one protein (or variant) and analyse the result
    Fold(FoldArgs),
    /// Watch a directory and fold every input dropped into it
    Watch(WatchArgs),
    /// Terminate orphaned backend processes left by earlier crashes
    Reap,
    /// Show the effective configuration, backend availability and free memory
    Status,
    /// Write a commented default configuration file
    Init(InitArgs),
}

/// Stage switches shared by `fold` and `watch`
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct SkipArgs {
    /// Do not run the folding backend; analyse results of an earlier fold if present
    #[arg(long)]
    pub skip_fold: bool,

    /// Do not analyse the structure
    #[arg(long)]
    pub skip_analysis: bool,

    /// Do not look up clinical annotations
    #[arg(long)]
    pub skip_clinical: bool,

    /// Do not search the literature
    #[arg(long)]
    pub skip_papers: bool,

    /// Do not write a summary
    #[arg(long)]
    pub skip_summary: bool,
}

impl From<SkipArgs> for SkipFlags {
    fn from(args: SkipArgs) -> Self {
        SkipFlags {
            fold: args.skip_fold,
            analysis: args.skip_analysis,
            clinical: args.skip_clinical,
            literature: args.skip_papers,
            summary: args.skip_summary,
            persist: false,
        }
    }
}

#[derive(Args, Debug)]
pub struct FoldArgs {
    /// Protein identifier, e.g. SOD1. Derived from the FASTA filename when omitted.
    pub protein: Option<String>,

    /// Variant label, e.g. A4V
    pub variant: Option<String>,

    /// FASTA file with the sequence to fold
    #[arg(long, value_name = "PATH", conflicts_with = "sequence")]
    pub fasta: Option<PathBuf>,

    /// Sequence given inline (residues or FASTA text)
    #[arg(long, value_name = "SEQ")]
    pub sequence: Option<String>,

    /// Existing model to analyse instead of folding (implies --skip-fold)
    #[arg(long, value_name = "PATH")]
    pub structure: Option<PathBuf>,

    /// Why this target is interesting; passed to the summary
    #[arg(long, value_name = "TEXT")]
    pub rationale: Option<String>,

    /// Results root directory (overrides output.results_dir)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Fold timeout in hours (overrides folding.timeout_hours)
    #[arg(long, value_name = "HOURS")]
    pub timeout_hours: Option<f64>,

    #[command(flatten)]
    pub skip: SkipArgs,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Directory to watch for input files
    pub dir: PathBuf,

    /// Poll interval in seconds (overrides watch.poll_interval)
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Results root directory (overrides output.results_dir)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Leave processed inputs in place with a .done marker instead of archiving them
    #[arg(long)]
    pub marker: bool,

    #[command(flatten)]
    pub skip: SkipArgs,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
