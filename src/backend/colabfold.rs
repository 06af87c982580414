/*!
 * ColabFold Adapter
 * Runs `colabfold_batch <fasta> <outdir>` and locates its best-ranked model
 */

use super::locate::{fasta_residue_count, first_match, which};
use super::{FoldBackend, StructureFiles};
use crate::core::limits::{
    DEFAULT_NUM_MODELS, LARGE_PROTEIN_MAX_MSA, LARGE_PROTEIN_MODELS, LARGE_PROTEIN_RESIDUES,
};
use crate::process::LaunchSpec;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ColabFoldBackend {
    binary: String,
    gpu_device: Option<String>,
    num_models: u32,
}

impl ColabFoldBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            gpu_device: None,
            num_models: DEFAULT_NUM_MODELS,
        }
    }

    #[must_use]
    pub fn with_gpu_device(mut self, device: Option<String>) -> Self {
        self.gpu_device = device.filter(|d| !d.is_empty());
        self
    }

    #[must_use]
    pub fn with_num_models(mut self, num_models: u32) -> Self {
        self.num_models = num_models.max(1);
        self
    }

    /// Arguments for a sequence of `residues` residues
    pub fn arguments(&self, fasta: &Path, out_dir: &Path, residues: usize) -> Vec<String> {
        let mut args = vec![
            fasta.display().to_string(),
            out_dir.display().to_string(),
        ];
        if let Some(device) = &self.gpu_device {
            args.push("--gpu-device".into());
            args.push(device.clone());
        }
        if residues > LARGE_PROTEIN_RESIDUES {
            args.extend([
                "--num-models".to_string(),
                LARGE_PROTEIN_MODELS.to_string(),
                "--max-msa".to_string(),
                LARGE_PROTEIN_MAX_MSA.to_string(),
            ]);
        } else {
            args.push("--num-models".into());
            args.push(self.num_models.to_string());
        }
        args
    }
}

impl FoldBackend for ColabFoldBackend {
    fn name(&self) -> &'static str {
        "colabfold"
    }

    fn availability(&self) -> Result<String, String> {
        match which(&self.binary) {
            Some(path) => Ok(format!("ColabFold found at {}", path.display())),
            None => Err(format!(
                "'{}' not found on PATH. Install ColabFold (https://github.com/sokrypton/ColabFold) \
                 or set folding.colabfold_path",
                self.binary
            )),
        }
    }

    fn launch_spec(&self, fasta: &Path, out_dir: &Path) -> LaunchSpec {
        let residues = fasta_residue_count(fasta);
        if residues > LARGE_PROTEIN_RESIDUES {
            info!(residues, "Large protein, reducing model count and MSA depth");
        }
        LaunchSpec::new(self.binary.clone())
            .with_args(self.arguments(fasta, out_dir, residues))
            .with_oom_priority(true)
    }

    fn signatures(&self) -> Vec<String> {
        // colabfold-conda is the wrapper installed by localcolabfold
        let mut signatures = vec!["colabfold_batch".to_string(), "colabfold-conda".to_string()];
        if let Some(base) = Path::new(&self.binary).file_name().and_then(|n| n.to_str()) {
            if !signatures.iter().any(|s| s == base) {
                signatures.push(base.to_string());
            }
        }
        signatures
    }

    fn collect(&self, out_dir: &Path) -> Option<StructureFiles> {
        let pdb = best_model(out_dir)?;
        let scores = first_match(
            out_dir,
            false,
            &[
                &|n: &str| n.contains("scores_rank_001_") && n.ends_with(".json"),
                &|n: &str| n.contains("scores") && n.ends_with(".json"),
            ],
        );
        Some(StructureFiles { pdb, scores })
    }
}

/// Relaxed rank 1, then unrelaxed rank 1, then any model
fn best_model(out_dir: &Path) -> Option<PathBuf> {
    first_match(
        out_dir,
        false,
        &[
            &|n: &str| n.contains("_relaxed_rank_001_") && n.ends_with(".pdb"),
            &|n: &str| n.contains("_unrelaxed_rank_001_") && n.ends_with(".pdb"),
            &|n: &str| n.ends_with(".pdb"),
        ],
    )
}
