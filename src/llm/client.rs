//! OpenAI-compatible chat completions client
//!
//! Minimal JSON-mode client shared by the extractor and the judge. It knows
//! nothing about profiles; it sends a system and user prompt, returns the
//! message content and converts the reported usage into a priced
//! [`TokenUsage`].

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::{ModelConfig, PricingTable};
use crate::error::{Error, ModelError, Result};
use crate::types::TokenUsage;

/// Longest error body kept in [`ModelError::Api`]
const MAX_ERROR_BODY: usize = 500;

/// Chat message
#[derive(Clone, Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Clone, Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Clone, Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageRaw>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageRaw {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

impl UsageRaw {
    /// Token counts, `None` unless at least one count is non-zero
    fn counts(&self) -> Option<(u64, u64)> {
        let input = self.prompt_tokens.unwrap_or(0);
        let output = self.completion_tokens.unwrap_or(0);
        (input > 0 || output > 0).then_some((input, output))
    }
}

/// Content and usage of one completion
#[derive(Clone, Debug)]
pub struct ChatCompletion {
    /// Message content with any markdown code fence removed
    pub content: String,
    /// Token usage, when the endpoint reported it
    pub usage: Option<TokenUsage>,
}

/// Chat completions client
#[derive(Clone)]
pub struct ChatClient {
    http_client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
    pricing: PricingTable,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ChatClient {
    /// Create a client with an explicit API key
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_key: Option<String>, config: &ModelConfig, pricing: PricingTable) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            http_client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            pricing,
        })
    }

    /// Create a client reading the API key from `config.api_key_env`
    ///
    /// A missing key is not an error here; every call then fails with
    /// [`ModelError::MissingCredentials`], which is never retried.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_env(config: &ModelConfig, pricing: PricingTable) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "Model API key not set, model calls will fail"
            );
        }
        Self::new(api_key, config, pricing)
    }

    /// Base URL of the endpoint
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a JSON-mode chat completion
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] for missing credentials, transport failures,
    /// non-success statuses and responses without message content.
    pub async fn complete_json(
        &self,
        model: &str,
        temperature: f32,
        system_prompt: &str,
        user_prompt: &str,
    ) -> std::result::Result<ChatCompletion, ModelError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::MissingCredentials("API key is not set".to_string()))?;

        let request = ChatRequest {
            model,
            messages: vec![
                Message {
                    role: "system",
                    content: system_prompt,
                },
                Message {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let start = Instant::now();
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(model, status = status.as_u16(), "Model API error");
            if status.as_u16() == 429 {
                return Err(ModelError::RateLimited {
                    status: status.as_u16(),
                });
            }
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let raw: ChatResponseRaw = serde_json::from_str(&body)
            .map_err(|e| ModelError::InvalidOutput(format!("malformed completion envelope: {}", e)))?;

        let content = raw
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::InvalidOutput("completion has no message content".to_string()))?;

        // An empty or all-zero usage block is no data, not a free call
        let usage = raw
            .usage
            .as_ref()
            .and_then(UsageRaw::counts)
            .map(|(input, output)| TokenUsage {
                model: model.to_string(),
                input_tokens: input,
                output_tokens: output,
                cost: self.pricing.cost(model, input, output),
            });
        if usage.is_none() {
            tracing::debug!(model, "Completion carried no usage metadata");
        }

        tracing::debug!(
            model,
            duration_ms = start.elapsed().as_millis() as u64,
            input_tokens = usage.as_ref().map(|u| u.input_tokens),
            output_tokens = usage.as_ref().map(|u| u.output_tokens),
            "Chat completion"
        );

        Ok(ChatCompletion {
            content: strip_code_fence(&content).to_string(),
            usage,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout(self.timeout)
        } else {
            ModelError::Transport(e.to_string())
        }
    }
}

/// Remove a surrounding markdown code fence (```json ... ```)
pub(crate) fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the info string ("json") on the opening fence line
    match rest.split_once('\n') {
        Some((info, body)) if !info.trim_start().starts_with('{') => body.trim(),
        _ => rest.trim(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
