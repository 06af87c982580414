/*!
 * Anthropic Summarizer
 * Messages API with the reply forced through the `generate_summary` tool
 */

use super::prompt::{build_prompt, SYSTEM_PROMPT};
use super::remote::{
    self, parse_json_reply, summary_schema, SummaryReply, MAX_REPLY_TOKENS, SUMMARY_TOOL,
};
use super::{SummaryDocument, SummaryInput, Summarizer};
use crate::collaborators::{CollabError, CollabResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

const NAME: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicSummarizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicSummarizer {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "max_tokens": MAX_REPLY_TOKENS,
            "system": SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": prompt }],
            "tools": [{
                "name": SUMMARY_TOOL,
                "description": "Generate a structured summary of the protein analysis",
                "input_schema": summary_schema(),
            }],
            "tool_choice": { "type": "tool", "name": SUMMARY_TOOL },
        })
    }

    /// The tool call's input; falls back to JSON in a text block
    pub fn parse_response(&self, response: &Value) -> CollabResult<SummaryDocument> {
        let blocks = response["content"]
            .as_array()
            .ok_or_else(|| CollabError::invalid(NAME, "reply has no content blocks"))?;

        let from_tool: Option<SummaryReply> = blocks
            .iter()
            .find(|b| b["type"] == "tool_use" && b["name"] == SUMMARY_TOOL)
            .and_then(|b| serde_json::from_value(b["input"].clone()).ok());
        let from_text = || {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .find_map(|b| b["text"].as_str().and_then(parse_json_reply))
        };

        let reply = from_tool
            .or_else(from_text)
            .ok_or_else(|| CollabError::invalid(NAME, "reply carried no summary"))?;
        Ok(SummaryDocument {
            tldr: reply.tldr,
            body: reply.body,
            generator: format!("{} ({})", NAME, self.model),
        })
    }
}

#[async_trait]
impl Summarizer for AnthropicSummarizer {
    fn name(&self) -> &str {
        NAME
    }

    async fn summarize(&self, input: &SummaryInput<'_>) -> CollabResult<SummaryDocument> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(&build_prompt(input));
        debug!(model = %self.model, "Requesting summary");

        let headers = [
            ("x-api-key", self.api_key.as_str()),
            ("anthropic-version", API_VERSION),
        ];
        let response = remote::post_json(&self.client, NAME, &url, &headers, &body).await?;
        self.parse_response(&response)
    }
}
