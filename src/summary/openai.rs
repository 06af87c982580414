/*!
 * OpenAI Summarizer
 * Chat completions with a forced `generate_summary` function call
 */

use super::prompt::{build_prompt, SYSTEM_PROMPT};
use super::remote::{
    self, parse_json_reply, summary_schema, SummaryReply, MAX_REPLY_TOKENS, SUMMARY_TOOL,
};
use super::{SummaryDocument, SummaryInput, Summarizer};
use crate::collaborators::{CollabError, CollabResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

const NAME: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiSummarizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiSummarizer {
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
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "tools": [{
                "type": "function",
                "function": {
                    "name": SUMMARY_TOOL,
                    "description": "Generate a structured summary of the protein analysis",
                    "parameters": summary_schema(),
                },
            }],
            "tool_choice": { "type": "function", "function": { "name": SUMMARY_TOOL } },
        })
    }

    /// Function call arguments first, then JSON in the message content
    pub fn parse_response(&self, response: &Value) -> CollabResult<SummaryDocument> {
        let message = &response["choices"][0]["message"];
        if message.is_null() {
            return Err(CollabError::invalid(NAME, "reply has no choices"));
        }

        let from_call = message["tool_calls"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|call| call["function"]["name"] == SUMMARY_TOOL)
            .and_then(|call| call["function"]["arguments"].as_str())
            .and_then(|args| match serde_json::from_str::<SummaryReply>(args) {
                Ok(reply) => Some(reply),
                Err(e) => {
                    warn!(error = %e, "Function arguments were not a summary");
                    None
                }
            });

        let reply = from_call
            .or_else(|| message["content"].as_str().and_then(parse_json_reply))
            .ok_or_else(|| CollabError::invalid(NAME, "reply carried no summary"))?;
        Ok(SummaryDocument {
            tldr: reply.tldr,
            body: reply.body,
            generator: format!("{} ({})", NAME, self.model),
        })
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn name(&self) -> &str {
        NAME
    }

    async fn summarize(&self, input: &SummaryInput<'_>) -> CollabResult<SummaryDocument> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.request_body(&build_prompt(input));
        debug!(model = %self.model, "Requesting summary");

        let bearer = format!("Bearer {}", self.api_key);
        let headers = [("authorization", bearer.as_str())];
        let response = remote::post_json(&self.client, NAME, &url, &headers, &body).await?;
        self.parse_response(&response)
    }
}
