// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible `/images/generations` protocol.
//!
//! Also covers Volcengine's image API and doubao-seedream models behind
//! OpenAI-style proxies, which share the request shape but differ in the
//! `n`/`watermark` fields.

use reelflow_core::provider::response_error_detail;
use reelflow_core::types::clip;
use reelflow_core::{GeneratedImage, ImageRequest, ProviderConfig, ReelflowError};
use reelflow_media::OutboundResolver;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

const DEFAULT_ENDPOINT: &str = "/images/generations";

#[derive(Debug, Serialize)]
struct OpenAiImageRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    watermark: Option<bool>,
    /// Reference images, per the seedream image API.
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageResponse {
    #[serde(default)]
    data: Vec<OpenAiImageItem>,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageItem {
    url: Option<String>,
    image_url: Option<String>,
    b64_json: Option<String>,
}

pub(crate) async fn generate(
    http: &reqwest::Client,
    resolver: &OutboundResolver,
    config: &ProviderConfig,
    model: &str,
    request: &ImageRequest,
) -> Result<GeneratedImage, ReelflowError> {
    let url = config.endpoint_url(DEFAULT_ENDPOINT);
    let provider = config.provider_lower();
    let is_volc = matches!(provider.as_str(), "volces" | "volcengine" | "volc");
    let model_lower = model.to_ascii_lowercase();
    let is_seedream = model_lower.contains("seedream") || model_lower.contains("doubao");

    let refs: Vec<String> = request
        .reference_images
        .iter()
        .filter_map(|r| resolver.resolve(r))
        .collect();

    let body = OpenAiImageRequest {
        model: model.to_string(),
        prompt: request.prompt.clone(),
        // The seedream image API rejects n; other OpenAI-compatible
        // endpoints expect it.
        n: if is_seedream { None } else { Some(1) },
        size: request.size.clone(),
        quality: request.quality.clone(),
        // Volcengine defaults watermark to true.
        watermark: if is_volc || is_seedream {
            Some(false)
        } else {
            None
        },
        image: if refs.is_empty() { None } else { Some(refs) },
    };

    debug!(
        url = %clip(&url, 60),
        model,
        ref_count = request.reference_images.len(),
        "image generation request (openai-compatible)"
    );
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
        error!(status = %status, body = %clip(&raw, 300), "image API failed");
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

    let parsed: OpenAiImageResponse = serde_json::from_str(&raw).map_err(|e| {
        warn!(raw = %clip(&raw, 200), "image API response parse error");
        ReelflowError::Provider {
            message: format!("unexpected image response format: {e}"),
            source: Some(Box::new(e)),
        }
    })?;

    let image_url = parsed
        .data
        .into_iter()
        .next()
        .and_then(|item| item.url.or(item.image_url).or(item.b64_json));
    match image_url {
        Some(image_url) => Ok(GeneratedImage { image_url }),
        None => {
            warn!(model, raw = %clip(&raw, 300), "image API returned no image URL");
            Err(ReelflowError::provider("image response contained no image URL"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{image_config, test_client, test_resolver};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn success_returns_first_data_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "dall-e-3", "prompt": "a harbor at dusk", "n": 1
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"url": "https://cdn.example.com/img.png"}]
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = image_config(&server.uri(), "openai");
        let request = ImageRequest {
            prompt: "a harbor at dusk".to_string(),
            ..Default::default()
        };
        let result = generate(&test_client(), &resolver, &config, "dall-e-3", &request)
            .await
            .unwrap();
        assert_eq!(result.image_url, "https://cdn.example.com/img.png");
    }

    #[tokio::test]
    async fn b64_payload_is_accepted_as_image_location() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"b64_json": "aGVsbG8="}]
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = image_config(&server.uri(), "openai");
        let request = ImageRequest::default();
        let result = generate(&test_client(), &resolver, &config, "dall-e-3", &request)
            .await
            .unwrap();
        assert_eq!(result.image_url, "aGVsbG8=");
    }

    #[tokio::test]
    async fn seedream_models_omit_n_and_disable_watermark() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"url": "https://cdn.example.com/s.png"}]
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = image_config(&server.uri(), "openai");
        let request = ImageRequest::default();
        generate(&test_client(), &resolver, &config, "doubao-seedream-4-0", &request)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        assert!(body.get("n").is_none(), "seedream must not send n");
        assert_eq!(body["watermark"], false);
    }

    #[tokio::test]
    async fn reference_images_are_resolved_and_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"url": "https://cdn.example.com/r.png"}]
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = image_config(&server.uri(), "volces");
        let request = ImageRequest {
            reference_images: vec!["https://cdn.example.com/ref1.png".to_string()],
            ..Default::default()
        };
        generate(&test_client(), &resolver, &config, "doubao-seedream-4-0", &request)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        assert_eq!(body["image"][0], "https://cdn.example.com/ref1.png");
    }

    #[tokio::test]
    async fn auth_failure_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"message": "key disabled"}
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = image_config(&server.uri(), "openai");
        let err = generate(&test_client(), &resolver, &config, "dall-e-3", &ImageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReelflowError::Auth { .. }));
        assert!(err.to_string().contains("key disabled"));
    }

    #[tokio::test]
    async fn empty_data_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": []
            })))
            .mount(&server)
            .await;

        let (resolver, _dir) = test_resolver();
        let config = image_config(&server.uri(), "openai");
        let err = generate(&test_client(), &resolver, &config, "dall-e-3", &ImageRequest::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no image URL"));
    }
}
