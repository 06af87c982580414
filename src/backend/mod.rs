/*!
 * Folding Backends
 *
 * Adapters that turn "fold this FASTA into that directory" into a concrete
 * command line, and locate the resulting model files afterwards. The backend
 * never runs anything itself; the pipeline hands its `LaunchSpec` to the
 * process supervisor.
 */

mod alphafold;
mod colabfold;
pub mod locate;

pub use alphafold::{AlphaFoldBackend, AlphaFoldMode};
pub use colabfold::ColabFoldBackend;

use crate::config::{BackendKind, FoldingConfig};
use crate::process::LaunchSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Model files produced by a successful fold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureFiles {
    /// Best-ranked model
    pub pdb: PathBuf,
    /// Per-residue score JSON, when the backend writes one
    pub scores: Option<PathBuf>,
}

/// A structure prediction program
pub trait FoldBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(detail)` when the program can be run, `Err(reason)` otherwise
    fn availability(&self) -> Result<String, String>;

    /// Command that folds `fasta` into `out_dir`
    fn launch_spec(&self, fasta: &Path, out_dir: &Path) -> LaunchSpec;

    /// Command-line fragments that identify this backend's processes
    fn signatures(&self) -> Vec<String>;

    /// Locate the best model in `out_dir` after a successful exit
    fn collect(&self, out_dir: &Path) -> Option<StructureFiles>;
}

/// Build the configured backend
pub fn from_config(config: &FoldingConfig) -> Arc<dyn FoldBackend> {
    let gpu = Some(config.gpu_device.clone());
    match config.backend {
        BackendKind::Colabfold => Arc::new(
            ColabFoldBackend::new(config.colabfold_path.clone())
                .with_gpu_device(gpu)
                .with_num_models(config.num_models),
        ),
        BackendKind::Alphafold => Arc::new(
            AlphaFoldBackend::new(Some(config.alphafold_path.clone()))
                .with_image(config.alphafold_image.clone())
                .with_gpu_device(gpu),
        ),
    }
}
