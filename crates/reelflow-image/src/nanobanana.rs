// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! NanoBanana submit/poll protocol.
//!
//! Each model maps to its own submit endpoint; the base model additionally
//! requires a callback URL, which is satisfied with a placeholder because
//! completion is discovered by polling the record-info endpoint, never by
//! callback delivery. A configured endpoint outside the native set switches
//! the adapter to proxy mode with a generic request body, and proxies may
//! answer synchronously with a direct image URL.

use std::time::Duration;

use reelflow_core::provider::response_error_detail;
use reelflow_core::types::clip;
use reelflow_core::{GeneratedImage, ImageRequest, ProviderConfig, ReelflowError};
use reelflow_media::OutboundResolver;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

const DEFAULT_BASE_URL: &str = "https://api.nanobananaapi.ai";
const DEFAULT_QUERY_ENDPOINT: &str = "/api/v1/nanobanana/record-info";
const NATIVE_ENDPOINTS: [&str; 3] = [
    "/api/v1/nanobanana/generate-2",
    "/api/v1/nanobanana/generate-pro",
    "/api/v1/nanobanana/generate",
];
/// Callback delivery is unused; polling discovers completion.
const PLACEHOLDER_CALLBACK: &str = "https://placeholder.no-op/callback";

#[derive(Debug, Serialize)]
struct SubmitBody {
    prompt: String,
    #[serde(rename = "imageUrls")]
    image_urls: Vec<String>,
    #[serde(rename = "aspectRatio", skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<&'static str>,
    #[serde(rename = "outputFormat", skip_serializing_if = "Option::is_none")]
    output_format: Option<&'static str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    task_kind: Option<&'static str>,
    #[serde(rename = "image_size", skip_serializing_if = "Option::is_none")]
    image_size: Option<String>,
    #[serde(rename = "numImages", skip_serializing_if = "Option::is_none")]
    num_images: Option<u32>,
    #[serde(rename = "callBackUrl", skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'static str>,
}

/// Proxies may answer synchronously; the image URL hides in several shapes.
fn direct_image_url(data: &Value) -> Option<String> {
    data.pointer("/images/0/url")
        .or_else(|| data.pointer("/image/url"))
        .or_else(|| data.get("image_url"))
        .or_else(|| data.pointer("/data/url"))
        .or_else(|| data.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn submitted_task_id(data: &Value) -> Option<String> {
    data.pointer("/data/taskId")
        .or_else(|| data.get("request_id"))
        .or_else(|| data.get("taskId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) async fn generate(
    http: &reqwest::Client,
    resolver: &OutboundResolver,
    config: &ProviderConfig,
    model: &str,
    request: &ImageRequest,
    poll_attempts: u32,
    poll_interval: Duration,
) -> Result<GeneratedImage, ReelflowError> {
    let base = if config.base().is_empty() {
        DEFAULT_BASE_URL.to_string()
    } else {
        config.base().to_string()
    };
    let refs: Vec<String> = request
        .reference_images
        .iter()
        .filter_map(|r| resolver.resolve(r))
        .collect();
    let aspect = crate::size::nearest_aspect_ratio(request.size.as_deref());
    let aspect_or_wide = || {
        if aspect == "auto" {
            "16:9".to_string()
        } else {
            aspect.clone()
        }
    };
    let model_lower = model.to_ascii_lowercase();

    let configured_endpoint = {
        let ep = config.endpoint.trim();
        if ep.is_empty() {
            String::new()
        } else if ep.starts_with('/') {
            ep.to_string()
        } else {
            format!("/{ep}")
        }
    };
    // An endpoint outside the native set means an intermediary proxy.
    let proxy_mode =
        !configured_endpoint.is_empty() && !NATIVE_ENDPOINTS.contains(&configured_endpoint.as_str());

    let (submit_url, body) = if proxy_mode {
        (
            format!("{base}{configured_endpoint}"),
            SubmitBody {
                prompt: request.prompt.clone(),
                image_urls: refs,
                aspect_ratio: Some(aspect_or_wide()),
                resolution: Some("1K"),
                output_format: None,
                task_kind: None,
                image_size: None,
                num_images: None,
                callback_url: None,
            },
        )
    } else if model_lower == "nano-banana-pro" {
        (
            format!("{base}/api/v1/nanobanana/generate-pro"),
            SubmitBody {
                prompt: request.prompt.clone(),
                image_urls: refs,
                aspect_ratio: Some(aspect_or_wide()),
                resolution: Some("2K"),
                output_format: None,
                task_kind: None,
                image_size: None,
                num_images: None,
                callback_url: None,
            },
        )
    } else if model_lower == "nano-banana" {
        // Base model: callBackUrl is mandatory on the wire. The misspelled
        // type values are what the API actually accepts.
        let task_kind = if refs.is_empty() {
            "TEXTTOIAMGE"
        } else {
            "IMAGETOIAMGE"
        };
        (
            format!("{base}/api/v1/nanobanana/generate"),
            SubmitBody {
                prompt: request.prompt.clone(),
                image_urls: refs,
                aspect_ratio: None,
                resolution: None,
                output_format: None,
                task_kind: Some(task_kind),
                image_size: Some(aspect_or_wide()),
                num_images: Some(1),
                callback_url: Some(PLACEHOLDER_CALLBACK),
            },
        )
    } else {
        // nano-banana-2 and anything unrecognized.
        (
            format!("{base}/api/v1/nanobanana/generate-2"),
            SubmitBody {
                prompt: request.prompt.clone(),
                image_urls: refs,
                aspect_ratio: Some(aspect.clone()),
                resolution: Some("1K"),
                output_format: Some("jpg"),
                task_kind: None,
                image_size: None,
                num_images: None,
                callback_url: None,
            },
        )
    };

    debug!(
        url = %clip(&submit_url, 80),
        model,
        proxy_mode,
        "image generation request (nanobanana)"
    );
    let response = http
        .post(&submit_url)
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
        error!(status = %status, body = %clip(&raw, 500), "nanobanana submit failed");
        let mut message = format!("image generation request failed: {status}");
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
    let submit_data: Value = serde_json::from_str(&raw).map_err(|e| ReelflowError::Provider {
        message: format!("unexpected submit response format: {e}"),
        source: Some(Box::new(e)),
    })?;

    if let Some(image_url) = direct_image_url(&submit_data) {
        info!("nanobanana answered synchronously (proxy response)");
        return Ok(GeneratedImage { image_url });
    }

    let Some(task_id) = submitted_task_id(&submit_data) else {
        warn!(raw = %clip(&raw, 300), "nanobanana returned no task id");
        let detail = response_error_detail(&raw).unwrap_or_else(|| "no task id returned".to_string());
        return Err(ReelflowError::provider(format!(
            "image submission failed: {detail}"
        )));
    };

    info!(task_id = %task_id, "nanobanana task submitted, polling");
    poll_record(http, config, &base, &task_id, poll_attempts, poll_interval).await
}

/// Poll the record-info endpoint until `successFlag` turns terminal.
///
/// 1 is success, 2 and 3 are provider failures, 0 keeps polling. Transport
/// errors and non-2xx polls are skipped, not terminal.
async fn poll_record(
    http: &reqwest::Client,
    config: &ProviderConfig,
    base: &str,
    task_id: &str,
    attempts: u32,
    interval: Duration,
) -> Result<GeneratedImage, ReelflowError> {
    let query_endpoint = config.query_endpoint_or(DEFAULT_QUERY_ENDPOINT);
    let query_url = if query_endpoint.contains("{taskId}") {
        format!("{base}{}", query_endpoint.replace("{taskId}", task_id))
    } else {
        format!("{base}{query_endpoint}?taskId={task_id}")
    };

    for attempt in 0..attempts {
        tokio::time::sleep(interval).await;
        let response = match http.get(&query_url).bearer_auth(&config.api_key).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(attempt, error = %e, "nanobanana poll request failed");
                continue;
            }
        };
        if !response.status().is_success() {
            continue;
        }
        let Ok(data) = response.json::<Value>().await else {
            continue;
        };
        let success_flag = data.pointer("/data/successFlag").and_then(Value::as_i64);
        match success_flag {
            Some(1) => {
                let image_url = data
                    .pointer("/data/response/resultImageUrl")
                    .or_else(|| data.pointer("/data/response/originImageUrl"))
                    .and_then(Value::as_str);
                return match image_url {
                    Some(url) => {
                        info!(task_id, "nanobanana image completed");
                        Ok(GeneratedImage {
                            image_url: url.to_string(),
                        })
                    }
                    None => Err(ReelflowError::provider(
                        "image task completed without an image URL",
                    )),
                };
            }
            Some(2) | Some(3) => {
                let message = data
                    .pointer("/data/errorMessage")
                    .and_then(Value::as_str)
                    .unwrap_or("task failed");
                warn!(task_id, success_flag, message, "nanobanana task failed");
                return Err(ReelflowError::provider(format!(
                    "image generation failed: {message}"
                )));
            }
            _ => {} // 0 or absent: still running
        }
    }
    Err(ReelflowError::Timeout {
        attempts,
        waited: interval * attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{image_config, test_client, test_resolver};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_poll() -> (u32, Duration) {
        (3, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn submit_then_poll_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/nanobanana/generate-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"taskId": "nb-123"}
            })))
            .mount(&server)
            .await;
        // First poll still running, second succeeds.
        Mock::given(method("GET"))
            .and(path("/api/v1/nanobanana/record-info"))
            .and(query_param("taskId", "nb-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"successFlag": 0}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nanobanana/record-info"))
            .and(query_param("taskId", "nb-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"successFlag": 1, "response": {"resultImageUrl": "https://nb.example/done.jpg"}}
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = image_config(&server.uri(), "nano_banana");
        let (attempts, interval) = fast_poll();
        let request = ImageRequest {
            prompt: "a mascot".to_string(),
            size: Some("1920x1080".to_string()),
            ..Default::default()
        };
        let result = generate(
            &test_client(),
            &resolver,
            &config,
            "nano-banana-2",
            &request,
            attempts,
            interval,
        )
        .await
        .unwrap();
        assert_eq!(result.image_url, "https://nb.example/done.jpg");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        assert_eq!(body["aspectRatio"], "16:9");
        assert_eq!(body["resolution"], "1K");
        assert_eq!(body["outputFormat"], "jpg");
    }

    #[tokio::test]
    async fn base_model_sends_placeholder_callback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/nanobanana/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"taskId": "nb-base"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nanobanana/record-info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"successFlag": 1, "response": {"originImageUrl": "https://nb.example/o.jpg"}}
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = image_config(&server.uri(), "nano_banana");
        let (attempts, interval) = fast_poll();
        let request = ImageRequest {
            prompt: "text only".to_string(),
            ..Default::default()
        };
        let result = generate(
            &test_client(),
            &resolver,
            &config,
            "nano-banana",
            &request,
            attempts,
            interval,
        )
        .await
        .unwrap();
        assert_eq!(result.image_url, "https://nb.example/o.jpg");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        assert_eq!(body["callBackUrl"], PLACEHOLDER_CALLBACK);
        assert_eq!(body["type"], "TEXTTOIAMGE");
        assert_eq!(body["numImages"], 1);
    }

    #[tokio::test]
    async fn provider_reported_failure_is_not_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/nanobanana/generate-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"taskId": "nb-fail"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nanobanana/record-info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"successFlag": 2, "errorMessage": "content policy"}
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = image_config(&server.uri(), "nano_banana");
        let (attempts, interval) = fast_poll();
        let err = generate(
            &test_client(),
            &resolver,
            &config,
            "nano-banana-2",
            &ImageRequest::default(),
            attempts,
            interval,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReelflowError::Provider { .. }), "got {err:?}");
        assert!(err.to_string().contains("content policy"));
    }

    #[tokio::test]
    async fn poll_exhaustion_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/nanobanana/generate-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"taskId": "nb-slow"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nanobanana/record-info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"successFlag": 0}
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = image_config(&server.uri(), "nano_banana");
        let err = generate(
            &test_client(),
            &resolver,
            &config,
            "nano-banana-2",
            &ImageRequest::default(),
            2,
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReelflowError::Timeout { attempts: 2, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn proxy_mode_accepts_synchronous_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/proxy/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "images": [{"url": "https://proxy.example/done.png"}]
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let mut config = image_config(&server.uri(), "nano_banana");
        config.endpoint = "/proxy/generate".to_string();
        let (attempts, interval) = fast_poll();
        let result = generate(
            &test_client(),
            &resolver,
            &config,
            "nano-banana-2",
            &ImageRequest::default(),
            attempts,
            interval,
        )
        .await
        .unwrap();
        assert_eq!(result.image_url, "https://proxy.example/done.png");
    }

    #[tokio::test]
    async fn missing_task_id_is_a_submission_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/nanobanana/generate-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "msg": "invalid prompt"
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = image_config(&server.uri(), "nano_banana");
        let (attempts, interval) = fast_poll();
        let err = generate(
            &test_client(),
            &resolver,
            &config,
            "nano-banana-2",
            &ImageRequest::default(),
            attempts,
            interval,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("invalid prompt"));
    }
}
