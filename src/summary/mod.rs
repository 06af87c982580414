/*!
 * Summaries
 *
 * Turns whatever artifacts a run produced into a short report. The template
 * summarizer works offline; the Ollama summarizer asks a local model; the
 * Anthropic and OpenAI summarizers call hosted models with an API key.
 */

mod anthropic;
mod ollama;
mod openai;
mod prompt;
mod remote;
mod template;

pub use anthropic::AnthropicSummarizer;
pub use ollama::OllamaSummarizer;
pub use openai::OpenAiSummarizer;
pub use prompt::{build_prompt, SYSTEM_PROMPT};
pub use template::TemplateSummarizer;

use crate::backend::StructureFiles;
use crate::collaborators::{ClinicalRecord, CollabResult, ConfidenceSummary, Paper};
use crate::config::{self, SummaryConfig, SummaryProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Everything known about a job by the time it is summarised
#[derive(Debug, Clone, Copy)]
pub struct SummaryInput<'a> {
    pub protein: &'a str,
    pub variant: Option<&'a str>,
    pub rationale: Option<&'a str>,
    pub structure: Option<&'a StructureFiles>,
    pub confidence: Option<&'a ConfidenceSummary>,
    pub clinical: Option<&'a ClinicalRecord>,
    pub papers: &'a [Paper],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub tldr: String,
    pub body: String,
    /// Which summarizer wrote it
    pub generator: String,
}

impl SummaryDocument {
    /// Markdown written to `summary.md`
    pub fn to_markdown(&self, title: &str) -> String {
        format!(
            "# {}\n\n**TL;DR:** {}\n\n{}\n\n---\n_Generated by {}_\n",
            title,
            self.tldr.trim(),
            self.body.trim(),
            self.generator
        )
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(&self, input: &SummaryInput<'_>) -> CollabResult<SummaryDocument>;
}

/// Build the configured summarizer; `None` disables the stage
pub fn from_config(summary: &SummaryConfig) -> Option<Arc<dyn Summarizer>> {
    match summary.provider {
        SummaryProvider::Template => Some(Arc::new(TemplateSummarizer::new())),
        SummaryProvider::Ollama => Some(Arc::new(OllamaSummarizer::new(
            summary.ollama_url.clone(),
            summary.ollama_model.clone(),
        ))),
        SummaryProvider::Anthropic => hosted_key(summary).map(|key| {
            Arc::new(AnthropicSummarizer::new(key, summary.anthropic_model.clone()))
                as Arc<dyn Summarizer>
        }),
        SummaryProvider::OpenAi => hosted_key(summary).map(|key| {
            Arc::new(OpenAiSummarizer::new(key, summary.openai_model.clone()))
                as Arc<dyn Summarizer>
        }),
        SummaryProvider::None => None,
    }
}

fn hosted_key(summary: &SummaryConfig) -> Option<String> {
    let key = config::api_key(summary);
    if key.is_none() {
        warn!(provider = ?summary.provider, "No API key for summary provider, summaries disabled");
    }
    key
}
