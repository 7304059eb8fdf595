//! Generation backend abstraction.
//!
//! [`GenerationBackend`] turns a fully formatted prompt into text.
//! [`TogetherLlm`] implements it over the Together AI API, using the
//! chat-completions endpoint for chat models and the raw completions
//! endpoint (with an `[INST]`-wrapped prompt) otherwise. Sampling parameters
//! come from [`GenerationConfig`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::error::BackendError;
use crate::prompt::instruction_prompt;

const PROVIDER: &str = "together-llm";

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

pub struct TogetherLlm {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    config: GenerationConfig,
}

impl TogetherLlm {
    pub fn new(config: &GenerationConfig, api_key: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| BackendError::Network {
                provider: PROVIDER.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            config: config.clone(),
        })
    }

    /// Builds the endpoint URL and JSON body for one request.
    fn request_body(&self, prompt: &str) -> (String, serde_json::Value) {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "top_p": self.config.top_p,
            "top_k": self.config.top_k,
            "repetition_penalty": self.config.repetition_penalty,
        });

        if self.config.chat_model {
            body["messages"] = serde_json::json!([{ "role": "user", "content": prompt }]);
            (format!("{}/chat/completions", self.base_url), body)
        } else {
            body["prompt"] = serde_json::json!(instruction_prompt(prompt));
            (format!("{}/completions", self.base_url), body)
        }
    }

    async fn complete_once(&self, prompt: &str) -> Result<String, BackendError> {
        let (url, body) = self.request_body(prompt);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| BackendError::Network {
                provider: PROVIDER.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let parsed: CompletionResponse =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    message: e.to_string(),
                })?;
        parsed.into_text()
    }
}

#[async_trait]
impl GenerationBackend for TogetherLlm {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        debug!(model = %self.config.model, prompt_chars = prompt.len(), "sending completion request");

        let mut attempt = 0;
        loop {
            match self.complete_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                    warn!(error = %e, attempt, ?delay, "completion request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Either response shape: chat (`choices[].message.content`) or completion
/// (`choices[].text`).
#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionResponse {
    fn into_text(self) -> Result<String, BackendError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse {
                provider: PROVIDER.to_string(),
                message: "no choices in response".to_string(),
            })?;

        choice
            .message
            .and_then(|m| m.content)
            .or(choice.text)
            .ok_or_else(|| BackendError::InvalidResponse {
                provider: PROVIDER.to_string(),
                message: "choice has no content".to_string(),
            })
    }
}
