// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! DashScope multimodal generation protocol.
//!
//! Requests carry a content array of one text part plus up to ten reference
//! image parts. Responses are synchronous JSON when reference images are
//! present (`enable_interleave` off forces `stream` off) and newline-chunked
//! otherwise, where the adapter scans chunks for the final image field.
//! Qwen-Image models share the endpoint but take a single text part and a
//! fixed size set over the plain synchronous path.

use reelflow_core::types::clip;
use reelflow_core::{GeneratedImage, ImageRequest, ProviderConfig, ReelflowError};
use reelflow_media::OutboundResolver;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::size::{clamp_pixel_window, qwen_fixed_size};

const DEFAULT_ENDPOINT: &str = "/api/v1/services/aigc/multimodal-generation/generation";
const MAX_REFERENCE_IMAGES: usize = 10;

#[derive(Debug, Serialize)]
struct DashScopeRequest {
    model: String,
    input: DashScopeInput,
    parameters: DashScopeParameters,
}

#[derive(Debug, Serialize)]
struct DashScopeInput {
    messages: Vec<DashScopeMessage>,
}

#[derive(Debug, Serialize)]
struct DashScopeMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text { text: String },
    Image { image: String },
}

#[derive(Debug, Serialize)]
struct DashScopeParameters {
    prompt_extend: bool,
    watermark: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_interleave: Option<bool>,
    size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
}

/// Take the first image from `output.choices[].message.content[]`,
/// tolerating parts typed "image" or left untyped.
fn image_from_output(data: &Value) -> Option<String> {
    let choices = data.pointer("/output/choices")?.as_array()?;
    for choice in choices {
        let Some(content) = choice.pointer("/message/content").and_then(Value::as_array) else {
            continue;
        };
        for part in content {
            let typed_ok = match part.get("type").and_then(Value::as_str) {
                Some("image") | None => true,
                Some(_) => false,
            };
            if !typed_ok {
                continue;
            }
            if let Some(image) = part.get("image").and_then(Value::as_str) {
                return Some(image.to_string());
            }
        }
    }
    None
}

fn provider_code_error(data: &Value) -> Option<ReelflowError> {
    let code = data.get("code").and_then(Value::as_str).filter(|c| !c.is_empty())?;
    let message = data
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(code)
        .to_string();
    Some(ReelflowError::provider(message))
}

fn is_qwen_image(config: &ProviderConfig, model: &str) -> bool {
    config.provider_lower() == "qwen_image" || model.to_ascii_lowercase().starts_with("qwen-image")
}

pub(crate) async fn generate(
    http: &reqwest::Client,
    resolver: &OutboundResolver,
    config: &ProviderConfig,
    model: &str,
    request: &ImageRequest,
) -> Result<GeneratedImage, ReelflowError> {
    let url = config.endpoint_url(DEFAULT_ENDPOINT);
    if !url.contains("dashscope") {
        return Err(ReelflowError::Config(
            "DashScope image generation requires a dashscope base_url".to_string(),
        ));
    }

    if is_qwen_image(config, model) {
        return generate_qwen(http, config, model, request, &url).await;
    }

    let mut content = vec![ContentPart::Text {
        text: request.prompt.clone(),
    }];
    for reference in request
        .reference_images
        .iter()
        .filter(|r| !r.trim().is_empty())
        .take(MAX_REFERENCE_IMAGES)
    {
        if let Some(resolved) = resolver.resolve(reference) {
            content.push(ContentPart::Image { image: resolved });
        }
    }
    let has_refs = content.len() > 1;
    // enable_interleave=false requires stream=false.
    let stream = !has_refs;
    let body = DashScopeRequest {
        model: model.to_string(),
        input: DashScopeInput {
            messages: vec![DashScopeMessage {
                role: "user",
                content,
            }],
        },
        parameters: DashScopeParameters {
            prompt_extend: true,
            watermark: false,
            n: Some(1),
            enable_interleave: Some(!has_refs),
            size: clamp_pixel_window(request.size.as_deref()),
            stream: Some(stream),
            negative_prompt: None,
        },
    };

    debug!(
        url = %clip(&url, 70),
        model,
        reference_count = request.reference_images.len(),
        stream,
        "image generation request (dashscope)"
    );
    let mut req = http.post(&url).bearer_auth(&config.api_key).json(&body);
    if stream {
        req = req.header("X-DashScope-Sse", "enable");
    }
    let response = req.send().await.map_err(|e| ReelflowError::Provider {
        message: format!("HTTP request failed: {e}"),
        source: Some(Box::new(e)),
    })?;

    let status = response.status();
    let raw = response.text().await.unwrap_or_default();
    if !status.is_success() {
        error!(status = %status, body = %clip(&raw, 300), "dashscope image create failed");
        let mut message = format!("image generation request failed: {status}");
        if let Some(detail) = reelflow_core::provider::response_error_detail(&raw) {
            message.push_str(" - ");
            message.push_str(&detail);
        }
        return Err(ReelflowError::from_response_status(
            status.as_u16(),
            &config.provider,
            message,
        ));
    }

    if !stream {
        return parse_sync_body(&raw);
    }
    parse_stream_body(&raw)
}

/// Non-streaming response: a single JSON document.
fn parse_sync_body(raw: &str) -> Result<GeneratedImage, ReelflowError> {
    let data: Value = serde_json::from_str(raw).map_err(|e| {
        warn!(raw = %clip(raw, 200), "dashscope sync parse error");
        ReelflowError::Provider {
            message: format!("unexpected image response format: {e}"),
            source: Some(Box::new(e)),
        }
    })?;
    if let Some(err) = provider_code_error(&data) {
        return Err(err);
    }
    image_from_output(&data)
        .map(|image_url| GeneratedImage { image_url })
        .ok_or_else(|| {
            warn!(raw = %clip(raw, 400), "dashscope sync response held no image");
            ReelflowError::provider("image response contained no image URL")
        })
}

/// Streamed response: newline-delimited chunks, either bare JSON or
/// `data: {...}` SSE lines. The final image field wins.
fn parse_stream_body(raw: &str) -> Result<GeneratedImage, ReelflowError> {
    let mut last_image: Option<String> = None;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let json_str = match line.strip_prefix("data:") {
            Some(rest) => {
                let rest = rest.trim();
                if rest.is_empty() || rest == "[DONE]" {
                    continue;
                }
                rest
            }
            None => line,
        };
        let Ok(chunk) = serde_json::from_str::<Value>(json_str) else {
            continue; // non-JSON keepalive lines
        };
        if let Some(err) = provider_code_error(&chunk) {
            return Err(err);
        }
        if let Some(image) = image_from_output(&chunk) {
            last_image = Some(image);
        }
    }
    last_image
        .map(|image_url| GeneratedImage { image_url })
        .ok_or_else(|| {
            warn!(raw = %clip(raw, 400), "dashscope stream held no image");
            ReelflowError::provider("image response contained no image URL")
        })
}

/// Qwen-Image: single text part, fixed size set, plain synchronous response.
async fn generate_qwen(
    http: &reqwest::Client,
    config: &ProviderConfig,
    model: &str,
    request: &ImageRequest,
    url: &str,
) -> Result<GeneratedImage, ReelflowError> {
    let text = clip(request.prompt.trim(), 800);
    let body = DashScopeRequest {
        model: model.to_string(),
        input: DashScopeInput {
            messages: vec![DashScopeMessage {
                role: "user",
                content: vec![ContentPart::Text { text }],
            }],
        },
        parameters: DashScopeParameters {
            prompt_extend: true,
            watermark: false,
            n: None,
            enable_interleave: None,
            size: qwen_fixed_size(request.size.as_deref()).to_string(),
            stream: None,
            negative_prompt: request
                .negative_prompt
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(|n| clip(n, 500)),
        },
    };

    debug!(url = %clip(url, 70), model, "image generation request (qwen-image sync)");
    let response = http
        .post(url)
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
        error!(status = %status, body = %clip(&raw, 300), "qwen-image create failed");
        let mut message = format!("image generation request failed: {status}");
        if let Some(detail) = reelflow_core::provider::response_error_detail(&raw) {
            message.push_str(" - ");
            message.push_str(&detail);
        }
        return Err(ReelflowError::from_response_status(
            status.as_u16(),
            &config.provider,
            message,
        ));
    }
    parse_sync_body(&raw)
}
