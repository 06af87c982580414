/*!
 * Fold Pipeline
 *
 * Sequential stage machine for one job:
 * ResolveSequence -> Fold -> Analyze -> ClinicalLookup -> LiteratureSearch
 * -> Summarize -> Persist
 */

mod builder;
mod driver;
mod lock;
pub mod run;
mod stages;
pub mod types;

pub use builder::FoldPipelineBuilder;
pub use driver::FoldPipeline;
pub use lock::ResultsLock;
pub use run::{Artifacts, FoldRecord, PipelineRun};
pub use stages::{write_atomic, METADATA_FILE};
pub use types::{
    FoldJob, PipelineSettings, RunReport, SequenceSource, SkipFlags, Stage, StageError,
    StageOutput, StageRecord, StageResult, StageStatus, Verdict,
};
