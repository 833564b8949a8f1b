//! HTTP proposal oracle backed by the Anthropic Messages API
//!
//! The generation loop is synchronous, so the client owns a small
//! current-thread tokio runtime and blocks on each request. Retries are the
//! controller's business; a failed request is reported once and returned.

use std::time::Duration;

use brawlgen_evolve::{OracleError, ProposalOracle};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tracing::debug;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Environment variables checked for the API key, in order
pub const API_KEY_VARS: [&str; 4] = ["ANTHROPIC_API_KEY", "ANTHROPIC_KEY", "CLAUDE_API_KEY", "CLAUDE_KEY"];

/// Environment variables checked for the model, in order
pub const MODEL_VARS: [&str; 2] = ["ANTHROPIC_MODEL", "CLAUDE_MODEL"];

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: API_URL.to_string(),
            timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct AnthropicOracle {
    client: Client,
    runtime: Runtime,
    config: AnthropicConfig,
}

impl AnthropicOracle {
    pub fn new(config: AnthropicConfig) -> Result<Self, OracleError> {
        if config.api_key.trim().is_empty() {
            return Err(OracleError::MissingCredentials("empty API key".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            runtime,
            config,
        })
    }

    async fn request(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String, OracleError> {
        let body = MessagesRequest {
            model,
            max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.config.base_url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        debug!(status = status.as_u16(), bytes = text.len(), "oracle response");

        if !status.is_success() {
            return Err(OracleError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        completion_text(&text)
    }
}

impl ProposalOracle for AnthropicOracle {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn propose(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String, OracleError> {
        self.runtime.block_on(self.request(prompt, model, max_tokens))
    }
}

/// First non-empty value among `vars`, looked up with `lookup`
pub fn first_set(vars: &[&str], lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    vars.iter()
        .filter_map(|var| lookup(var))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Concatenated text blocks of a successful response
fn completion_text(body: &str) -> Result<String, OracleError> {
    let parsed: MessagesResponse =
        serde_json::from_str(body).map_err(|e| OracleError::Transport(format!("bad response body: {e}")))?;
    let text: String = parsed
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    if text.trim().is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    Ok(text)
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.chars().take(200).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_set_respects_alias_order() {
        let lookup = |var: &str| match var {
            "ANTHROPIC_KEY" => Some("second".to_string()),
            "CLAUDE_KEY" => Some("fourth".to_string()),
            "ANTHROPIC_API_KEY" => Some("  ".to_string()),
            _ => None,
        };
        assert_eq!(first_set(&API_KEY_VARS, lookup).as_deref(), Some("second"));
        assert_eq!(first_set(&MODEL_VARS, |_| None), None);
    }

    #[test]
    fn test_completion_text_joins_text_blocks() {
        let body = r#"{"content":[{"type":"text","text":"a"},{"type":"tool_use"},{"type":"text","text":"b"}]}"#;
        assert_eq!(completion_text(body).unwrap(), "a\nb");
    }

    #[test]
    fn test_completion_text_empty() {
        let body = r#"{"content":[]}"#;
        assert!(matches!(completion_text(body), Err(OracleError::EmptyResponse)));
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(error_message(body), "Overloaded");
        assert_eq!(error_message("gateway down"), "gateway down");
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = AnthropicOracle::new(AnthropicConfig::new(""));
        assert!(matches!(result, Err(OracleError::MissingCredentials(_))));
    }

    #[test]
    fn test_request_shape() {
        let body = MessagesRequest {
            model: "m",
            max_tokens: 10,
            messages: [Message {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 10);
    }
}
