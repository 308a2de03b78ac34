// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible chat completions adapter.
//!
//! Script and storyboard text is produced through a `/chat/completions`-style
//! endpoint. The raw assistant text is returned as-is; callers run it through
//! `reelflow_core::extract_json` when they expect structured output.

use std::time::Duration;

use reelflow_core::provider::response_error_detail;
use reelflow_core::types::clip;
use reelflow_core::{model_for, ProviderConfig, ReelflowError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const DEFAULT_CHAT_ENDPOINT: &str = "/chat/completions";
const FALLBACK_MODEL: &str = "gpt-3.5-turbo";

/// Generation options beyond the prompt itself.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// HTTP client for OpenAI-compatible chat completion endpoints.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(timeout: Duration) -> Result<Self, ReelflowError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReelflowError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { http })
    }

    /// Generate text from a prompt, optionally with a system prompt.
    pub async fn generate(
        &self,
        config: &ProviderConfig,
        prompt: &str,
        system: Option<&str>,
        options: &ChatOptions,
    ) -> Result<String, ReelflowError> {
        let model = model_for(config, None, FALLBACK_MODEL);
        let url = config.endpoint_url(DEFAULT_CHAT_ENDPOINT);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });
        let body = ChatRequest {
            model: model.clone(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        debug!(url = %clip(&url, 60), model, "chat completion request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReelflowError::Provider {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(status = %status, body = %clip(&raw, 300), "chat completion failed");
            let mut message = format!("text generation request failed: {status}");
            if let Some(detail) = response_error_detail(&raw) {
                message.push_str(" - ");
                message.push_str(&detail);
            }
            return Err(ReelflowError::from_response_status(
                status.as_u16(),
                &config.provider,
                message,
            ));
        }

        let parsed: ChatResponse = serde_json::from_str(&raw).map_err(|e| {
            ReelflowError::Provider {
                message: format!("failed to parse chat response: {e}"),
                source: Some(Box::new(e)),
            }
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ReelflowError::provider("chat response contained no content"))
    }
}
