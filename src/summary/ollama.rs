/*!
 * Ollama Summarizer
 * POSTs the prompt to a local Ollama server's /api/generate endpoint
 */

use super::prompt::{build_prompt, SYSTEM_PROMPT};
use super::remote::{self, parse_json_reply, MAX_REPLY_TOKENS};
use super::{SummaryDocument, SummaryInput, Summarizer};
use crate::collaborators::{CollabError, CollabResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const NAME: &str = "ollama";

/// Raw replies shorter than this are treated as failures
const MIN_RAW_REPLY: usize = 50;

pub struct OllamaSummarizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: String,
}

impl OllamaSummarizer {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn document(&self, tldr: String, body: String) -> SummaryDocument {
        SummaryDocument {
            tldr,
            body,
            generator: format!("{} ({})", NAME, self.model),
        }
    }

    /// Accepts bare JSON, JSON in a code fence, JSON embedded in prose, and
    /// finally plain prose.
    pub fn parse_reply(&self, text: &str) -> Option<SummaryDocument> {
        if let Some(reply) = parse_json_reply(text) {
            return Some(self.document(reply.tldr, reply.body));
        }

        let text = text.trim();
        if text.len() > MIN_RAW_REPLY {
            warn!("Ollama reply was not JSON, using raw text");
            let tldr = text.lines().next().unwrap_or_default().to_string();
            return Some(self.document(tldr, text.to_string()));
        }
        None
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    fn name(&self) -> &str {
        NAME
    }

    async fn summarize(&self, input: &SummaryInput<'_>) -> CollabResult<SummaryDocument> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": build_prompt(input),
            "system": SYSTEM_PROMPT,
            "stream": false,
            "options": { "temperature": 0.3, "num_predict": MAX_REPLY_TOKENS },
        });
        debug!(url = %url, model = %self.model, "Requesting summary");

        let value = remote::post_json(&self.client, NAME, &url, &[], &body).await?;
        let reply: GenerateReply =
            serde_json::from_value(value).map_err(|e| CollabError::invalid(NAME, e))?;

        self.parse_reply(&reply.response)
            .ok_or_else(|| CollabError::invalid(NAME, "reply too short to use"))
    }
}
