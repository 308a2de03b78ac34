// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! DashScope wan-family video generation.
//!
//! Each model maps to its own endpoint and payload shape:
//! - `wan2.2-kf2v-flash`: first+last-frame interpolation (image2video endpoint)
//! - `wan2.6-t2v`: pure text-to-video
//! - `wan2.6-i2v-flash`: single first-frame image-to-video
//! - `wanx2.1-vace-plus`: multi-reference composition, up to 3 images
//! - `wan2.6-r2v-flash`: multi-reference, up to 5 inputs
//!
//! Submission is asynchronous (`X-DashScope-Async: enable`) and returns a
//! task id polled elsewhere.

use reelflow_core::provider::response_error_detail;
use reelflow_core::types::clip;
use reelflow_core::{ProviderConfig, ReelflowError, VideoRequest, VideoSubmission};
use reelflow_media::OutboundResolver;
use serde_json::{json, Value};
use tracing::{debug, error};

const VIDEO_GENERATION_PATH: &str = "/api/v1/services/aigc/video-generation/video-synthesis";
const IMAGE2VIDEO_PATH: &str = "/api/v1/services/aigc/image2video/video-synthesis";

const VACE_MAX_REFERENCES: usize = 3;
const R2V_MAX_REFERENCES: usize = 5;

/// Pull a video URL out of a DashScope response, trying the shapes the
/// wan endpoints are known to produce.
pub(crate) fn parse_video_url(data: &Value) -> Option<String> {
    let output = data.get("output")?;
    if let Some(url) = output.get("video_url").and_then(Value::as_str) {
        return Some(url.to_string());
    }
    if let Some(url) = output.pointer("/output/video_url").and_then(Value::as_str) {
        return Some(url.to_string());
    }
    let results = output.get("results").or_else(|| output.get("result"));
    if let Some(first) = results.and_then(Value::as_array).and_then(|r| r.first()) {
        if let Some(url) = first.get("video_url").and_then(Value::as_str) {
            return Some(url.to_string());
        }
        if let Some(url) = first.pointer("/output/video_url").and_then(Value::as_str) {
            return Some(url.to_string());
        }
    }
    if let Some(first_choice) = output.pointer("/choices/0") {
        let content = first_choice
            .pointer("/message/content")
            .or_else(|| first_choice.get("content"));
        if let Some(parts) = content.and_then(Value::as_array) {
            for part in parts {
                if let Some(url) = part
                    .get("video_url")
                    .or_else(|| part.get("url"))
                    .and_then(Value::as_str)
                {
                    return Some(url.to_string());
                }
            }
        }
    }
    None
}

fn resolve_frame(resolver: &OutboundResolver, value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| resolver.resolve(v))
}

fn resolve_references(
    resolver: &OutboundResolver,
    references: &[String],
    cap: usize,
) -> Vec<String> {
    references
        .iter()
        .filter(|r| !r.trim().is_empty())
        .take(cap)
        .filter_map(|r| resolver.resolve(r))
        .collect()
}

pub(crate) async fn generate(
    http: &reqwest::Client,
    resolver: &OutboundResolver,
    config: &ProviderConfig,
    model: &str,
    request: &VideoRequest,
) -> Result<VideoSubmission, ReelflowError> {
    let base = config.base();
    let duration = request.duration.unwrap_or(10);
    let prompt = request.prompt.clone();

    let (path, body) = match model {
        "wan2.2-kf2v-flash" => {
            let first_raw = request
                .first_frame_url
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .or(request.image_url.as_deref());
            let first = resolve_frame(resolver, first_raw);
            let last = resolve_frame(resolver, request.last_frame_url.as_deref())
                .or_else(|| first.clone());
            let (Some(first), Some(last)) = (first, last) else {
                return Err(ReelflowError::provider(
                    "wan2.2-kf2v-flash requires first and last frame images",
                ));
            };
            (
                IMAGE2VIDEO_PATH,
                json!({
                    "model": model,
                    "input": {"prompt": prompt, "first_frame_url": first, "last_frame_url": last},
                    "parameters": {"resolution": "480P", "prompt_extend": true},
                }),
            )
        }
        "wan2.6-t2v" => (
            VIDEO_GENERATION_PATH,
            json!({
                "model": model,
                "input": {"prompt": prompt},
                "parameters": {
                    "size": "1280*720",
                    "prompt_extend": true,
                    "duration": duration,
                    "shot_type": "multi",
                },
            }),
        ),
        "wan2.6-i2v-flash" => {
            let image_raw = request
                .image_url
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .or(request.first_frame_url.as_deref());
            let Some(image) = resolve_frame(resolver, image_raw) else {
                return Err(ReelflowError::provider(
                    "wan2.6-i2v-flash requires a first-frame image",
                ));
            };
            (
                VIDEO_GENERATION_PATH,
                json!({
                    "model": model,
                    "input": {"prompt": prompt, "img_url": image},
                    "parameters": {
                        "resolution": "720P",
                        "prompt_extend": true,
                        "duration": duration,
                        "shot_type": "multi",
                    },
                }),
            )
        }
        "wanx2.1-vace-plus" => {
            let refs = resolve_references(resolver, &request.reference_urls, VACE_MAX_REFERENCES);
            if refs.is_empty() {
                return Err(ReelflowError::provider(
                    "wanx2.1-vace-plus requires reference images (up to 3)",
                ));
            }
            (
                VIDEO_GENERATION_PATH,
                json!({
                    "model": model,
                    "input": {
                        "function": "image_reference",
                        "prompt": prompt,
                        "ref_images_url": refs,
                    },
                    "parameters": {
                        "prompt_extend": true,
                        "obj_or_bg": ["obj", "bg"],
                        "size": "1280*720",
                    },
                }),
            )
        }
        "wan2.6-r2v-flash" => {
            let refs = resolve_references(resolver, &request.reference_urls, R2V_MAX_REFERENCES);
            if refs.is_empty() {
                return Err(ReelflowError::provider(
                    "wan2.6-r2v-flash requires reference inputs (up to 5)",
                ));
            }
            (
                VIDEO_GENERATION_PATH,
                json!({
                    "model": model,
                    "input": {"prompt": prompt, "reference_urls": refs},
                    "parameters": {"prompt_extend": true},
                }),
            )
        }
        other => {
            return Err(ReelflowError::provider(format!(
                "unsupported DashScope video model: {other}"
            )));
        }
    };

    let url = format!("{base}{path}");
    debug!(url = %clip(&url, 70), model, "video generation request (dashscope)");
    let response = http
        .post(&url)
        .bearer_auth(&config.api_key)
        .header("X-DashScope-Async", "enable")
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
        error!(status = %status, body = %clip(&raw, 300), "dashscope video create failed");
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
    if let Some(code) = data.get("code").and_then(Value::as_str).filter(|c| !c.is_empty()) {
        let message = data.get("message").and_then(Value::as_str).unwrap_or(code);
        return Err(ReelflowError::provider(message.to_string()));
    }
    if let Some(task_id) = data.pointer("/output/task_id").and_then(Value::as_str) {
        return Ok(VideoSubmission::Accepted {
            task_id: task_id.to_string(),
            status: "PENDING".to_string(),
        });
    }
    if let Some(video_url) = parse_video_url(&data) {
        return Ok(VideoSubmission::Completed { video_url });
    }
    Err(ReelflowError::provider(
        "video submission returned neither a task id nor a video URL",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_client, test_resolver, video_config};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn t2v_submission_returns_task_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VIDEO_GENERATION_PATH))
            .and(header("x-dashscope-async", "enable"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": {"task_id": "ds-task-1", "task_status": "PENDING"}
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = video_config(&server.uri(), "dashscope");
        let request = VideoRequest {
            prompt: "a chase through the market".to_string(),
            duration: Some(8),
            ..Default::default()
        };
        let result = generate(&test_client(), &resolver, &config, "wan2.6-t2v", &request)
            .await
            .unwrap();
        assert_eq!(
            result,
            VideoSubmission::Accepted {
                task_id: "ds-task-1".to_string(),
                status: "PENDING".to_string(),
            }
        );

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["parameters"]["duration"], 8);
        assert_eq!(body["parameters"]["shot_type"], "multi");
    }

    #[tokio::test]
    async fn kf2v_defaults_last_frame_to_first() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IMAGE2VIDEO_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": {"task_id": "ds-kf2v"}
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = video_config(&server.uri(), "dashscope");
        let request = VideoRequest {
            prompt: "hold on the doorway".to_string(),
            first_frame_url: Some("https://cdn.example.com/first.png".to_string()),
            ..Default::default()
        };
        generate(&test_client(), &resolver, &config, "wan2.2-kf2v-flash", &request)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["input"]["first_frame_url"], "https://cdn.example.com/first.png");
        assert_eq!(body["input"]["last_frame_url"], "https://cdn.example.com/first.png");
        assert_eq!(body["parameters"]["resolution"], "480P");
    }

    #[tokio::test]
    async fn kf2v_without_frames_is_an_error() {
        let (resolver, _dir) = test_resolver();
        let config = video_config("https://dashscope.example.com/api", "dashscope");
        let err = generate(
            &test_client(),
            &resolver,
            &config,
            "wan2.2-kf2v-flash",
            &VideoRequest::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("first and last frame"));
    }

    #[tokio::test]
    async fn vace_caps_references_at_three() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VIDEO_GENERATION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": {"task_id": "ds-vace"}
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = video_config(&server.uri(), "dashscope");
        let request = VideoRequest {
            prompt: "composite the props".to_string(),
            reference_urls: (0..6)
                .map(|i| format!("https://cdn.example.com/prop{i}.png"))
                .collect(),
            ..Default::default()
        };
        generate(&test_client(), &resolver, &config, "wanx2.1-vace-plus", &request)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["input"]["ref_images_url"].as_array().unwrap().len(), 3);
        assert_eq!(body["input"]["function"], "image_reference");
    }

    #[tokio::test]
    async fn r2v_caps_references_at_five() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VIDEO_GENERATION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": {"task_id": "ds-r2v"}
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = video_config(&server.uri(), "dashscope");
        let request = VideoRequest {
            prompt: "keep the cast consistent".to_string(),
            reference_urls: (0..8)
                .map(|i| format!("https://cdn.example.com/cast{i}.png"))
                .collect(),
            ..Default::default()
        };
        generate(&test_client(), &resolver, &config, "wan2.6-r2v-flash", &request)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["input"]["reference_urls"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn unknown_wan_model_is_rejected() {
        let (resolver, _dir) = test_resolver();
        let config = video_config("https://dashscope.example.com/api", "dashscope");
        let err = generate(
            &test_client(),
            &resolver,
            &config,
            "wan9.9-imaginary",
            &VideoRequest::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("unsupported DashScope video model"));
    }

    #[tokio::test]
    async fn provider_code_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VIDEO_GENERATION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "InvalidApiKey", "message": "invalid key"
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = video_config(&server.uri(), "dashscope");
        let request = VideoRequest {
            prompt: "x".to_string(),
            ..Default::default()
        };
        let err = generate(&test_client(), &resolver, &config, "wan2.6-t2v", &request)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid key"));
    }

    #[test]
    fn video_url_shapes_are_all_recognized() {
        let direct = serde_json::json!({"output": {"video_url": "https://v/1.mp4"}});
        assert_eq!(parse_video_url(&direct).as_deref(), Some("https://v/1.mp4"));

        let nested = serde_json::json!({"output": {"output": {"video_url": "https://v/2.mp4"}}});
        assert_eq!(parse_video_url(&nested).as_deref(), Some("https://v/2.mp4"));

        let results = serde_json::json!({"output": {"results": [{"video_url": "https://v/3.mp4"}]}});
        assert_eq!(parse_video_url(&results).as_deref(), Some("https://v/3.mp4"));

        let choices = serde_json::json!({"output": {"choices": [{"message": {"content": [
            {"video_url": "https://v/4.mp4"}
        ]}}]}});
        assert_eq!(parse_video_url(&choices).as_deref(), Some("https://v/4.mp4"));

        let none = serde_json::json!({"output": {"task_status": "RUNNING"}});
        assert_eq!(parse_video_url(&none), None);
    }
}
