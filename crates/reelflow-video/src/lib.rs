// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Video generation adapter.
//!
//! Video latency is high and unpredictable, so long-form generation is
//! always asynchronous: submission returns a task identifier and completion
//! is discovered by bounded polling. Poll exhaustion surfaces as
//! [`ReelflowError::Timeout`], distinct from a provider-reported failure, so
//! external retry policy can tell the two apart.

use std::time::Duration;

use reelflow_core::types::clip;
use reelflow_core::{
    model_for, ProviderConfig, ReelflowError, VideoRequest, VideoSubmission,
};
use reelflow_media::OutboundResolver;
use serde_json::Value;
use tracing::{debug, warn};

mod ark;
mod dashscope;

const DASHSCOPE_QUERY_ENDPOINT: &str = "/api/v1/tasks/{taskId}";
const GENERIC_QUERY_ENDPOINT: &str = "/video/task/{taskId}";

/// Video generation client, shared across worker tasks.
#[derive(Debug, Clone)]
pub struct VideoClient {
    http: reqwest::Client,
    resolver: OutboundResolver,
}

impl VideoClient {
    pub fn new(resolver: OutboundResolver, timeout: Duration) -> Result<Self, ReelflowError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReelflowError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { http, resolver })
    }

    /// Submit one video generation through the resolved configuration.
    pub async fn generate(
        &self,
        config: &ProviderConfig,
        request: &VideoRequest,
    ) -> Result<VideoSubmission, ReelflowError> {
        if config.provider_lower() == "dashscope" {
            let model = model_for(config, request.model.as_deref(), "wan2.2-kf2v-flash");
            dashscope::generate(&self.http, &self.resolver, config, &model, request).await
        } else {
            let model = model_for(config, request.model.as_deref(), "");
            ark::generate(&self.http, &self.resolver, config, &model, request).await
        }
    }

    /// Poll a provider task to a terminal state.
    ///
    /// Transport errors and non-2xx poll responses are skipped, not
    /// terminal: the provider may still finish. Terminates on a
    /// provider-reported terminal status, a video URL, or attempt
    /// exhaustion (a [`ReelflowError::Timeout`]).
    pub async fn poll(
        &self,
        config: &ProviderConfig,
        task_id: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<String, ReelflowError> {
        let is_dashscope = config.provider_lower() == "dashscope";
        let url = build_query_url(config, task_id);
        debug!(url = %clip(&url, 80), task_id, "polling video task");

        for attempt in 0..max_attempts {
            tokio::time::sleep(interval).await;
            let response = match self
                .http
                .get(&url)
                .bearer_auth(&config.api_key)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt, error = %e, "video poll request failed");
                    continue;
                }
            };
            if !response.status().is_success() {
                continue;
            }
            let Ok(data) = response.json::<Value>().await else {
                continue;
            };

            if is_dashscope {
                if let Some(video_url) = dashscope::parse_video_url(&data) {
                    return Ok(video_url);
                }
                let task_status = data
                    .pointer("/output/task_status")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if task_status == "FAILED" || task_status == "CANCELED" {
                    let message = data
                        .get("message")
                        .or_else(|| data.pointer("/output/message"))
                        .and_then(Value::as_str)
                        .unwrap_or(task_status);
                    warn!(task_id, task_status, message, "dashscope video task failed");
                    return Err(ReelflowError::provider(message.to_string()));
                }
                continue;
            }

            if let Some(video_url) = generic_video_url(&data) {
                return Ok(video_url);
            }
            let status = data
                .get("status")
                .or_else(|| data.pointer("/data/status"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let error_message = data.get("error").and_then(|e| {
                e.as_str()
                    .map(str::to_string)
                    .or_else(|| e.get("message").and_then(Value::as_str).map(str::to_string))
            });
            if status == "failed" || status == "error" || error_message.is_some() {
                let message = error_message.unwrap_or_else(|| {
                    if status.is_empty() {
                        "task failed".to_string()
                    } else {
                        status.to_string()
                    }
                });
                return Err(ReelflowError::provider(message));
            }
        }
        Err(ReelflowError::Timeout {
            attempts: max_attempts,
            waited: interval * max_attempts,
        })
    }
}

fn generic_video_url(data: &Value) -> Option<String> {
    data.get("video_url")
        .or_else(|| data.pointer("/data/video_url"))
        .or_else(|| data.pointer("/content/video_url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn build_query_url(config: &ProviderConfig, task_id: &str) -> String {
    let provider = config.provider_lower();
    if ark::is_volc(&provider) {
        return format!("{}{}/{task_id}", ark::volc_base(config), ark::VOLC_TASKS_PATH);
    }
    let default = if provider == "dashscope" {
        DASHSCOPE_QUERY_ENDPOINT
    } else {
        GENERIC_QUERY_ENDPOINT
    };
    let endpoint = config
        .query_endpoint_or(default)
        .replace("{taskId}", task_id)
        .replace("{task_id}", task_id);
    let endpoint = if endpoint.starts_with('/') {
        endpoint
    } else {
        format!("/{endpoint}")
    };
    format!("{}{endpoint}", config.base())
}
