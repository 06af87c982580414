/*!
 * Collaborators
 *
 * Interfaces to everything outside the core: structure analysis, sequence,
 * clinical and literature lookups. Each call is request/response; the
 * pipeline wraps every call in a stage-local timeout.
 */

mod analysis;
mod command;

pub use analysis::{ConfidenceAnalyzer, ConfidenceBands, ConfidenceSummary, DestabilizedRegion};
pub use command::{CommandClinicalSource, CommandLiterature, CommandRunner, CommandSequenceLookup};

use crate::backend::StructureFiles;
use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type CollabResult<T> = Result<T, CollabError>;

#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum CollabError {
    #[error("{collaborator} did not answer within {secs}s")]
    #[diagnostic(code(collaborator::timeout))]
    Timeout { collaborator: String, secs: u64 },

    #[error("{collaborator} is unavailable: {reason}")]
    #[diagnostic(code(collaborator::unavailable))]
    Unavailable { collaborator: String, reason: String },

    #[error("{collaborator} failed: {reason}")]
    #[diagnostic(code(collaborator::failed))]
    Failed { collaborator: String, reason: String },

    #[error("{collaborator} returned an unusable response: {reason}")]
    #[diagnostic(code(collaborator::invalid_response))]
    InvalidResponse { collaborator: String, reason: String },

    #[error("I/O error: {0}")]
    #[diagnostic(code(collaborator::io))]
    Io(String),
}

impl CollabError {
    pub fn failed(collaborator: impl Into<String>, reason: impl ToString) -> Self {
        CollabError::Failed {
            collaborator: collaborator.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid(collaborator: impl Into<String>, reason: impl ToString) -> Self {
        CollabError::InvalidResponse {
            collaborator: collaborator.into(),
            reason: reason.to_string(),
        }
    }
}

/// Variant-level clinical annotations (e.g. ClinVar significance, gnomAD frequency)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub significance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allele_frequency: Option<f64>,
    /// Anything else the source reported, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One literature hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paper {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
}

/// Fetches a FASTA sequence for a protein identifier
#[async_trait]
pub trait SequenceLookup: Send + Sync {
    async fn fetch_fasta(&self, protein: &str) -> CollabResult<String>;
}

/// Summarises a predicted structure
#[async_trait]
pub trait StructureAnalyzer: Send + Sync {
    async fn analyze(&self, structure: &StructureFiles) -> CollabResult<ConfidenceSummary>;
}

/// Clinical annotations for a variant. `Ok(None)` means "no entry".
#[async_trait]
pub trait ClinicalSource: Send + Sync {
    async fn lookup(&self, protein: &str, variant: &str) -> CollabResult<Option<ClinicalRecord>>;
}

/// Related papers for a protein (and variant)
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    async fn search(&self, protein: &str, variant: Option<&str>) -> CollabResult<Vec<Paper>>;
}
