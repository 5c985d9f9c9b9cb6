//! Language-model boundary.
//!
//! The model is a black box: `complete(prompt, context) -> text`. Its output
//! is untrusted free text and must go through the fact guard before use.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Error type for language-model calls
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
}

/// A single completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Standing instructions for the model
    pub system: String,
    /// Fixed factual context the output must stay consistent with
    pub context: String,
    /// The task itself
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>>;

/// Text-generation capability
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    fn complete(&self, request: CompletionRequest) -> CompletionFuture<'_>;
}

// ── OpenAI-compatible request/response types ──

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible chat completion APIs
pub struct HttpLanguageModel {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl HttpLanguageModel {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            api_key,
            model,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn chat(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let user_content = if request.context.is_empty() {
            request.prompt
        } else {
            format!("## Listing facts\n{}\n\n{}", request.context, request.prompt)
        };

        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(check_error(status, text));
        }

        let api: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ModelError::RequestFailed(e.to_string()))?;

        api.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::RequestFailed("response contained no choices".to_string()))
    }
}

/// Map an error status, returning RateLimited for 429
fn check_error(status: reqwest::StatusCode, body: String) -> ModelError {
    if status.as_u16() == 429 {
        ModelError::RateLimited
    } else if status.is_server_error() {
        ModelError::Unavailable(format!("{status}: {body}"))
    } else {
        ModelError::RequestFailed(format!("{status}: {body}"))
    }
}

impl LanguageModel for HttpLanguageModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: CompletionRequest) -> CompletionFuture<'_> {
        Box::pin(self.chat(request))
    }
}
