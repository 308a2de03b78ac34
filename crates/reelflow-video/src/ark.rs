// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tasks-style video protocol (Volcengine Ark and compatible proxies).
//!
//! Submission posts a content array (text plus an optional conditioning
//! image) with top-level ratio/duration fields and returns either a task id
//! or, from some proxies, a finished video URL directly. Volcengine only
//! accepts machine model identifiers, so human-readable display names are
//! normalized through an alias table, and its API path is fixed regardless
//! of what the operator typed into base_url.

use reelflow_core::provider::response_error_detail;
use reelflow_core::types::clip;
use reelflow_core::{ProviderConfig, ReelflowError, VideoRequest, VideoSubmission};
use reelflow_media::OutboundResolver;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

pub(crate) const VOLC_TASKS_PATH: &str = "/contents/generations/tasks";
const DEFAULT_ENDPOINT: &str = "/video/generations";
const DEFAULT_VOLC_BASE: &str = "https://ark.cn-beijing.volces.com/api/v3";

/// Display name -> API endpoint id. The API only accepts the
/// lowercase+date-suffix form.
const MODEL_ALIASES: [(&str, &str); 7] = [
    ("doubao-seedance-1.0-pro-fast", "doubao-seedance-1-0-pro-250528"),
    ("doubao-seedance-1.0-pro", "doubao-seedance-1-0-pro-250528"),
    ("doubao-seedance-1-0-pro", "doubao-seedance-1-0-pro-250528"),
    ("doubao-seedance-1.0-lite", "doubao-seedance-1-0-lite-250428"),
    ("doubao-seedance-1-0-lite", "doubao-seedance-1-0-lite-250428"),
    ("doubao-seedance-1.5-pro", "doubao-seedance-1-5-pro-251215"),
    ("doubao-seedance-1-5-pro", "doubao-seedance-1-5-pro-251215"),
];

pub(crate) fn normalize_model(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| name.to_string())
}

pub(crate) fn is_volc(provider: &str) -> bool {
    matches!(provider, "volces" | "volcengine" | "volc")
}

/// Volcengine base URL with stray task sub-paths stripped.
pub(crate) fn volc_base(config: &ProviderConfig) -> String {
    let mut base = config.base().to_string();
    let lower = base.to_ascii_lowercase();
    let cut = ["/contents/", "/video/"]
        .iter()
        .filter_map(|marker| lower.find(marker))
        .min();
    if let Some(idx) = cut {
        base.truncate(idx);
    }
    if base.is_empty() {
        DEFAULT_VOLC_BASE.to_string()
    } else {
        base
    }
}

#[derive(Debug, Serialize)]
struct ArkVideoRequest {
    model: String,
    content: Vec<ContentPart>,
    ratio: String,
    duration: u32,
    watermark: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    camera_fixed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    Image {
        image_url: ImageUrl,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<&'static str>,
    },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

fn direct_video_url(data: &Value) -> Option<String> {
    data.get("video_url")
        .or_else(|| data.pointer("/data/video_url"))
        .or_else(|| data.pointer("/content/video_url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) async fn generate(
    http: &reqwest::Client,
    resolver: &OutboundResolver,
    config: &ProviderConfig,
    model: &str,
    request: &VideoRequest,
) -> Result<VideoSubmission, ReelflowError> {
    let provider = config.provider_lower();
    let volc = is_volc(&provider);
    let final_model = if volc {
        normalize_model(model)
    } else {
        model.to_string()
    };
    let url = if volc {
        format!("{}{VOLC_TASKS_PATH}", volc_base(config))
    } else {
        config.endpoint_url(DEFAULT_ENDPOINT)
    };

    let image = request
        .image_url
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    // seedance-1-5-pro rejects r2v inference; single-image requests must be
    // tagged i2v explicitly and carry no reference_image role.
    let task_type = volc.then(|| if image.is_some() { "i2v" } else { "t2v" });

    let mut content = vec![ContentPart::Text {
        text: request.prompt.clone(),
    }];
    if let Some(image) = image {
        // Localhost URLs are unreachable from the provider; inline them.
        if let Some(resolved) = resolver.resolve(image) {
            content.push(ContentPart::Image {
                image_url: ImageUrl { url: resolved },
                role: if task_type == Some("i2v") {
                    None
                } else {
                    Some("reference_image")
                },
            });
        }
    }

    let body = ArkVideoRequest {
        model: final_model.clone(),
        content,
        ratio: request.aspect_ratio.clone().unwrap_or_else(|| "16:9".to_string()),
        duration: request.duration.unwrap_or(5),
        watermark: request.watermark.unwrap_or(false),
        resolution: request.resolution.clone(),
        seed: request.seed,
        camera_fixed: request.camera_fixed,
        task_type,
    };

    debug!(url = %clip(&url, 60), model = %final_model, task_type = ?task_type, "video generation request");
    let response = http
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
        error!(status = %status, body = %clip(&raw, 300), "video API failed");
        let mut message = format!("video generation request failed: {status}");
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

    let data: Value = serde_json::from_str(&raw).map_err(|e| ReelflowError::Provider {
        message: format!("unexpected video response format: {e}"),
        source: Some(Box::new(e)),
    })?;
    if let Some(video_url) = direct_video_url(&data) {
        return Ok(VideoSubmission::Completed { video_url });
    }
    let task_id = data
        .get("id")
        .or_else(|| data.get("task_id"))
        .or_else(|| data.pointer("/data/id"))
        .and_then(Value::as_str);
    if let Some(task_id) = task_id {
        let status = data
            .get("status")
            .or_else(|| data.pointer("/data/status"))
            .and_then(Value::as_str)
            .unwrap_or("processing");
        return Ok(VideoSubmission::Accepted {
            task_id: task_id.to_string(),
            status: status.to_string(),
        });
    }
    Err(ReelflowError::provider(
        "video submission returned neither a task id nor a video URL",
    ))
}
