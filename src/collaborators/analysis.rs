/*!
 * Confidence Analysis
 *
 * Built-in analyzer that summarises per-residue pLDDT. Scores come from the
 * backend's score JSON when present, otherwise from the CA B-factor column of
 * the model (where AlphaFold-family predictors store pLDDT).
 */

use super::{CollabError, CollabResult, StructureAnalyzer};
use crate::backend::StructureFiles;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

const NAME: &str = "confidence analyzer";

/// Residues below this are considered destabilized
const DESTABILIZED_BELOW: f64 = 70.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceBands {
    /// pLDDT >= 90
    pub very_high: usize,
    /// 70 <= pLDDT < 90
    pub confident: usize,
    /// 50 <= pLDDT < 70
    pub low: usize,
    /// pLDDT < 50
    pub very_low: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestabilizedRegion {
    pub start: i64,
    pub end: i64,
    pub length: usize,
    pub mean_plddt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub residues: usize,
    pub mean_plddt: f64,
    pub min_plddt: f64,
    pub max_plddt: f64,
    pub bands: ConfidenceBands,
    pub destabilized_regions: Vec<DestabilizedRegion>,
    pub destabilized_residues: usize,
    pub percent_destabilized: f64,
    /// File the scores were read from
    pub source: PathBuf,
}

impl ConfidenceSummary {
    /// Summarise `(residue_number, plddt)` pairs in chain order
    pub fn from_scores(scores: &[(i64, f64)], source: PathBuf) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }

        let mut bands = ConfidenceBands::default();
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &(_, plddt) in scores {
            sum += plddt;
            min = min.min(plddt);
            max = max.max(plddt);
            match plddt {
                p if p >= 90.0 => bands.very_high += 1,
                p if p >= 70.0 => bands.confident += 1,
                p if p >= 50.0 => bands.low += 1,
                _ => bands.very_low += 1,
            }
        }

        let regions = destabilized_regions(scores);
        let destabilized: usize = regions.iter().map(|r| r.length).sum();

        Some(Self {
            residues: scores.len(),
            mean_plddt: sum / scores.len() as f64,
            min_plddt: min,
            max_plddt: max,
            bands,
            destabilized_regions: regions,
            destabilized_residues: destabilized,
            percent_destabilized: 100.0 * destabilized as f64 / scores.len() as f64,
            source,
        })
    }
}

/// Contiguous runs below the destabilization threshold
fn destabilized_regions(scores: &[(i64, f64)]) -> Vec<DestabilizedRegion> {
    let mut regions = Vec::new();
    let mut start: Option<usize> = None;

    for (i, &(_, plddt)) in scores.iter().enumerate() {
        match (plddt < DESTABILIZED_BELOW, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                regions.push(region(&scores[s..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        regions.push(region(&scores[s..]));
    }
    regions
}

fn region(run: &[(i64, f64)]) -> DestabilizedRegion {
    let total: f64 = run.iter().map(|(_, p)| p).sum();
    DestabilizedRegion {
        start: run.first().map(|(n, _)| *n).unwrap_or_default(),
        end: run.last().map(|(n, _)| *n).unwrap_or_default(),
        length: run.len(),
        mean_plddt: total / run.len().max(1) as f64,
    }
}

/// Per-residue pLDDT from a ColabFold or AlphaFold score document
pub fn scores_from_json(doc: &Value) -> Option<Vec<f64>> {
    let list = |v: &Value| -> Option<Vec<f64>> {
        v.as_array()?.iter().map(Value::as_f64).collect()
    };

    if let Some(v) = doc.get("plddt") {
        return list(v);
    }
    if let Some(v) = doc.get("plddts") {
        return match v {
            // AlphaFold: one array per model, keyed by model name
            Value::Object(models) => models.values().next().and_then(list),
            other => list(other),
        };
    }
    ["plddt_scores", "pLDDT", "confidence"]
        .iter()
        .find_map(|key| doc.get(*key).and_then(list))
}

/// `(residue_number, b_factor)` of every CA atom in the first model
pub fn scores_from_pdb(pdb: &str) -> Vec<(i64, f64)> {
    let mut scores = Vec::new();
    for line in pdb.lines() {
        if line.starts_with("ENDMDL") {
            break;
        }
        if !line.starts_with("ATOM") || line.len() < 66 {
            continue;
        }
        let (Some(atom), Some(resseq), Some(bfactor)) =
            (line.get(12..16), line.get(22..26), line.get(60..66))
        else {
            continue;
        };
        if atom.trim() != "CA" {
            continue;
        }
        if let (Ok(n), Ok(b)) = (resseq.trim().parse::<i64>(), bfactor.trim().parse::<f64>()) {
            scores.push((n, b));
        }
    }
    scores
}

/// Reads pLDDT from the score JSON, falling back to the model's B-factors
#[derive(Debug, Clone, Default)]
pub struct ConfidenceAnalyzer;

impl ConfidenceAnalyzer {
    pub fn new() -> Self {
        Self
    }

    async fn from_score_file(&self, path: &Path) -> CollabResult<Option<ConfidenceSummary>> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CollabError::Io(format!("{}: {}", path.display(), e)))?;
        let doc: Value = serde_json::from_str(&text).map_err(|e| CollabError::invalid(NAME, e))?;
        let Some(values) = scores_from_json(&doc) else {
            debug!(path = %path.display(), "Score file has no pLDDT array");
            return Ok(None);
        };
        let numbered: Vec<(i64, f64)> = values
            .into_iter()
            .enumerate()
            .map(|(i, p)| (i as i64 + 1, p))
            .collect();
        Ok(ConfidenceSummary::from_scores(&numbered, path.to_path_buf()))
    }

    async fn from_model(&self, path: &Path) -> CollabResult<ConfidenceSummary> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CollabError::Io(format!("{}: {}", path.display(), e)))?;
        ConfidenceSummary::from_scores(&scores_from_pdb(&text), path.to_path_buf())
            .ok_or_else(|| CollabError::invalid(NAME, format!("no CA atoms in {}", path.display())))
    }
}

#[async_trait]
impl StructureAnalyzer for ConfidenceAnalyzer {
    async fn analyze(&self, structure: &StructureFiles) -> CollabResult<ConfidenceSummary> {
        if let Some(scores) = &structure.scores {
            if let Some(summary) = self.from_score_file(scores).await? {
                return Ok(summary);
            }
        }
        self.from_model(&structure.pdb).await
    }
}
