/*!
 * AlphaFold Adapter
 * Native `run_alphafold` binary when configured, otherwise the Docker image
 */

use super::locate::{first_match, which};
use super::{FoldBackend, StructureFiles};
use crate::process::LaunchSpec;
use std::path::Path;

const DEFAULT_IMAGE: &str = "alphafold";

#[derive(Debug, Clone)]
pub struct AlphaFoldBackend {
    binary: Option<String>,
    image: String,
    gpu_device: Option<String>,
}

/// How the fold will actually be run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlphaFoldMode {
    Native(String),
    Docker,
}

impl AlphaFoldBackend {
    pub fn new(binary: Option<String>) -> Self {
        Self {
            binary: binary.filter(|b| !b.is_empty()),
            image: DEFAULT_IMAGE.to_string(),
            gpu_device: None,
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        let image = image.into();
        if !image.is_empty() {
            self.image = image;
        }
        self
    }

    #[must_use]
    pub fn with_gpu_device(mut self, device: Option<String>) -> Self {
        self.gpu_device = device.filter(|d| !d.is_empty());
        self
    }

    pub fn mode(&self) -> AlphaFoldMode {
        match &self.binary {
            Some(binary) if which(binary).is_some() => AlphaFoldMode::Native(binary.clone()),
            _ => AlphaFoldMode::Docker,
        }
    }

    fn native_spec(&self, binary: &str, fasta: &Path, out_dir: &Path) -> LaunchSpec {
        let mut spec = LaunchSpec::new(binary)
            .arg(format!("--fasta_paths={}", fasta.display()))
            .arg(format!("--output_dir={}", out_dir.display()))
            .arg("--model_preset=monomer")
            .arg("--db_preset=reduced_dbs");
        if let Some(device) = &self.gpu_device {
            spec = spec.arg(format!("--gpu_devices={}", device));
        }
        spec
    }

    // TODO: run the container under a generated --name so terminate can also
    // `docker stop` it; killing the client group leaves the container running.
    fn docker_spec(&self, fasta: &Path, out_dir: &Path) -> LaunchSpec {
        let input_dir = fasta.parent().unwrap_or_else(|| Path::new("."));
        let file_name = fasta
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        LaunchSpec::new("docker").with_args([
            "run".to_string(),
            "--rm".to_string(),
            "--gpus".to_string(),
            "all".to_string(),
            "-v".to_string(),
            format!("{}:/input", input_dir.display()),
            "-v".to_string(),
            format!("{}:/output", out_dir.display()),
            self.image.clone(),
            format!("--fasta_paths=/input/{}", file_name),
            "--output_dir=/output".to_string(),
            "--model_preset=monomer".to_string(),
            "--db_preset=reduced_dbs".to_string(),
        ])
    }
}

impl FoldBackend for AlphaFoldBackend {
    fn name(&self) -> &'static str {
        "alphafold"
    }

    fn availability(&self) -> Result<String, String> {
        if let Some(binary) = &self.binary {
            if let Some(path) = which(binary) {
                return Ok(format!("AlphaFold found at {}", path.display()));
            }
        }
        if which("docker").is_some() {
            return Ok(format!("Docker available, using image '{}'", self.image));
        }
        Err("AlphaFold not found. Set folding.alphafold_path to the AlphaFold binary \
             or install Docker (https://github.com/google-deepmind/alphafold)"
            .to_string())
    }

    fn launch_spec(&self, fasta: &Path, out_dir: &Path) -> LaunchSpec {
        let spec = match self.mode() {
            AlphaFoldMode::Native(binary) => self.native_spec(&binary, fasta, out_dir),
            AlphaFoldMode::Docker => self.docker_spec(fasta, out_dir),
        };
        spec.with_oom_priority(true)
    }

    fn signatures(&self) -> Vec<String> {
        let mut signatures = vec!["run_alphafold".to_string()];
        if let Some(base) = self
            .binary
            .as_deref()
            .and_then(|b| Path::new(b).file_name())
            .and_then(|n| n.to_str())
        {
            if !signatures.iter().any(|s| s == base) {
                signatures.push(base.to_string());
            }
        }
        signatures
    }

    fn collect(&self, out_dir: &Path) -> Option<StructureFiles> {
        let pdb = first_match(
            out_dir,
            true,
            &[&|n: &str| n == "ranked_0.pdb", &|n: &str| n.ends_with(".pdb")],
        )?;
        Some(StructureFiles { pdb, scores: None })
    }
}
