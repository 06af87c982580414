/*!
 * Model Replies
 * Request plumbing and reply parsing shared by the model-backed summarizers
 */

use crate::collaborators::{CollabError, CollabResult};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

/// Tool the hosted models are forced to call
pub const SUMMARY_TOOL: &str = "generate_summary";

pub const MAX_REPLY_TOKENS: u32 = 2500;

const SEND_ATTEMPTS: u32 = 3;
const FIRST_BACKOFF: Duration = Duration::from_secs(4);

#[derive(Debug, Deserialize)]
pub struct SummaryReply {
    pub tldr: String,
    #[serde(alias = "detailed_summary")]
    pub body: String,
}

/// JSON schema of the `generate_summary` tool input
pub fn summary_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tldr": {
                "type": "string",
                "description": "2-3 sentence summary a general audience can follow",
            },
            "detailed_summary": {
                "type": "string",
                "description": "Detailed markdown summary with inline citations [N]",
            },
        },
        "required": ["tldr", "detailed_summary"],
    })
}

/// Accepts bare JSON, JSON in a code fence and JSON embedded in prose
pub fn parse_json_reply(text: &str) -> Option<SummaryReply> {
    [Some(text.trim()), fenced_block(text), braces(text)]
        .into_iter()
        .flatten()
        .find_map(|candidate| serde_json::from_str(candidate).ok())
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    let end = after.find("```")?;
    Some(after[..end].trim())
}

fn braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// POST `body` and decode the JSON answer. Transport errors, 429 and 5xx
/// are retried with exponential backoff; other statuses fail at once.
pub async fn post_json(
    client: &reqwest::Client,
    collaborator: &str,
    url: &str,
    headers: &[(&str, &str)],
    body: &Value,
) -> CollabResult<Value> {
    let mut backoff = FIRST_BACKOFF;
    let mut attempt = 1;
    loop {
        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let outcome = match request.send().await {
            Ok(response) if response.status().is_success() => {
                return response
                    .json()
                    .await
                    .map_err(|e| CollabError::invalid(collaborator, e));
            }
            Ok(response) => {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                let err = CollabError::failed(
                    collaborator,
                    format!("HTTP {}: {}", status, detail.trim()),
                );
                if !retryable(status) {
                    return Err(err);
                }
                err
            }
            Err(e) => CollabError::Unavailable {
                collaborator: collaborator.to_string(),
                reason: e.to_string(),
            },
        };

        if attempt >= SEND_ATTEMPTS {
            return Err(outcome);
        }
        warn!(collaborator, attempt, error = %outcome, "Summary request failed, retrying");
        tokio::time::sleep(backoff).await;
        backoff *= 2;
        attempt += 1;
    }
}

fn retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
