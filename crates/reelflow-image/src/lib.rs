// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Image generation adapter.
//!
//! Normalizes one logical request (prompt, size, quality, reference images)
//! into whichever wire protocol the resolved provider speaks, and hands back
//! a uniform image location. Adding a provider family means adding a
//! [`Protocol`] variant and its module, not branching deeper into existing
//! request builders.

use std::time::Duration;

use reelflow_core::{model_for, GeneratedImage, ImageRequest, ProviderConfig, ReelflowError};
use reelflow_media::OutboundResolver;

mod dashscope;
mod nanobanana;
mod openai;
pub mod size;

/// Protocol family a provider configuration speaks, resolved once per call
/// from the provider name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// `/images/generations`-style synchronous JSON (openai, chatfire,
    /// volcengine, and the default for unknown names).
    OpenAiCompatible,
    /// Multimodal content-array protocol with sync and streamed responses.
    DashScope,
    /// Callback-oriented submit/poll protocol.
    NanoBanana,
}

impl Protocol {
    pub fn for_provider(provider: &str) -> Self {
        match provider.to_ascii_lowercase().as_str() {
            "dashscope" | "qwen_image" => Protocol::DashScope,
            "nano_banana" => Protocol::NanoBanana,
            _ => Protocol::OpenAiCompatible,
        }
    }

    /// Model used when a configuration lists none.
    fn fallback_model(self) -> &'static str {
        match self {
            Protocol::OpenAiCompatible => "dall-e-3",
            Protocol::DashScope => "wan2.6-image",
            Protocol::NanoBanana => "nano-banana-2",
        }
    }
}

/// Image generation client, shared across worker tasks.
#[derive(Debug, Clone)]
pub struct ImageClient {
    http: reqwest::Client,
    resolver: OutboundResolver,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl ImageClient {
    /// Create a client. Poll budget defaults to 60 attempts at 3 s, the
    /// NanoBanana record-info cadence.
    pub fn new(resolver: OutboundResolver, timeout: Duration) -> Result<Self, ReelflowError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReelflowError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            http,
            resolver,
            poll_attempts: 60,
            poll_interval: Duration::from_secs(3),
        })
    }

    /// Override the submit/poll budget.
    pub fn with_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_interval = interval;
        self
    }

    /// Generate one image through the resolved configuration.
    pub async fn generate(
        &self,
        config: &ProviderConfig,
        request: &ImageRequest,
    ) -> Result<GeneratedImage, ReelflowError> {
        let protocol = Protocol::for_provider(&config.provider);
        let model = model_for(config, request.model.as_deref(), protocol.fallback_model());
        match protocol {
            Protocol::OpenAiCompatible => {
                openai::generate(&self.http, &self.resolver, config, &model, request).await
            }
            Protocol::DashScope => {
                dashscope::generate(&self.http, &self.resolver, config, &model, request).await
            }
            Protocol::NanoBanana => {
                nanobanana::generate(
                    &self.http,
                    &self.resolver,
                    config,
                    &model,
                    request,
                    self.poll_attempts,
                    self.poll_interval,
                )
                .await
            }
        }
    }
}
