// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider configuration rows and the selection rules adapters use to
//! pick one active configuration per capability.

use serde::{Deserialize, Serialize};

use crate::types::{clip, Capability};

/// One provider configuration row.
///
/// Rows are owned by an external CRUD surface; this core reads them and
/// relies on the storage layer to reconcile duplicate defaults at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: i64,
    pub capability: Capability,
    /// Protocol-family discriminator, e.g. "openai", "dashscope", "volces".
    pub provider: String,
    /// Operator-facing display name.
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    /// Models this configuration can serve.
    pub models: Vec<String>,
    /// Preferred model within `models`, if the operator pinned one.
    pub default_model: Option<String>,
    /// Submit endpoint override; empty means the protocol default.
    pub endpoint: String,
    /// Poll endpoint override; `{taskId}` is substituted when present.
    pub query_endpoint: String,
    pub priority: i64,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ProviderConfig {
    /// Provider name lowercased for protocol dispatch.
    pub fn provider_lower(&self) -> String {
        self.provider.to_ascii_lowercase()
    }

    /// Base URL with any trailing slash removed.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Full submit URL: configured endpoint if set, else `default_endpoint`.
    pub fn endpoint_url(&self, default_endpoint: &str) -> String {
        let ep = if self.endpoint.trim().is_empty() {
            default_endpoint
        } else {
            self.endpoint.as_str()
        };
        join_url(self.base(), ep)
    }

    /// Configured poll endpoint, or `default` when unset.
    pub fn query_endpoint_or<'a>(&'a self, default: &'a str) -> &'a str {
        if self.query_endpoint.trim().is_empty() {
            default
        } else {
            self.query_endpoint.as_str()
        }
    }
}

/// Join a base URL and an endpoint, normalizing the single slash between them.
pub fn join_url(base: &str, endpoint: &str) -> String {
    let base = base.trim_end_matches('/');
    if endpoint.starts_with('/') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}

/// Select one configuration from a listing already ordered by
/// `is_default DESC, priority DESC, created_at DESC`.
///
/// Order of precedence: active only; narrow to `preferred_provider` when any
/// row matches it; first row whose model list contains `preferred_model`;
/// first explicit default; first remaining row.
pub fn select_config<'a>(
    configs: &'a [ProviderConfig],
    preferred_model: Option<&str>,
    preferred_provider: Option<&str>,
) -> Option<&'a ProviderConfig> {
    let mut active: Vec<&ProviderConfig> = configs.iter().filter(|c| c.is_active).collect();
    if active.is_empty() {
        return None;
    }
    if let Some(p) = preferred_provider.map(str::trim).filter(|p| !p.is_empty()) {
        let want = p.to_ascii_lowercase();
        let by_provider: Vec<&ProviderConfig> = active
            .iter()
            .copied()
            .filter(|c| c.provider.to_ascii_lowercase() == want)
            .collect();
        if !by_provider.is_empty() {
            active = by_provider;
        }
    }
    if let Some(model) = preferred_model.filter(|m| !m.is_empty()) {
        if let Some(found) = active
            .iter()
            .find(|c| c.models.iter().any(|m| m == model))
        {
            return Some(found);
        }
    }
    if let Some(default) = active.iter().find(|c| c.is_default) {
        return Some(default);
    }
    active.first().copied()
}

/// Choose the model identifier to send: the preferred one if this config
/// serves it, else the pinned default, else the first listed, else `fallback`.
pub fn model_for(config: &ProviderConfig, preferred: Option<&str>, fallback: &str) -> String {
    if let Some(p) = preferred {
        if config.models.iter().any(|m| m == p) {
            return p.to_string();
        }
    }
    if let Some(d) = config.default_model.as_deref() {
        if config.models.iter().any(|m| m == d) {
            return d.to_string();
        }
    }
    config
        .models
        .first()
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

/// Default submit/poll endpoints a freshly created configuration gets when
/// the operator left them blank, keyed by provider family and capability.
pub fn default_endpoints(provider: &str, capability: Capability) -> (String, String) {
    let p = provider.to_ascii_lowercase();
    let (endpoint, query) = match (p.as_str(), capability) {
        ("openai", Capability::Text) => ("/chat/completions", ""),
        ("openai", Capability::Image) => ("/images/generations", ""),
        ("openai", Capability::Video) => ("/videos", "/videos/{taskId}"),
        ("dashscope" | "qwen_image", Capability::Image | Capability::StoryboardImage) => (
            "/api/v1/services/aigc/multimodal-generation/generation",
            "",
        ),
        ("dashscope", Capability::Video) => (
            "/api/v1/services/aigc/image2video/video-synthesis",
            "/api/v1/tasks/{taskId}",
        ),
        ("volces" | "volcengine" | "volc", Capability::Video) => (
            "/contents/generations/tasks",
            "/contents/generations/tasks/{taskId}",
        ),
        ("nano_banana", Capability::Image | Capability::StoryboardImage) => (
            "/api/v1/nanobanana/generate-2",
            "/api/v1/nanobanana/record-info",
        ),
        _ => ("", ""),
    };
    (endpoint.to_string(), query.to_string())
}

/// Pull a human-readable detail out of a provider error body, trying the
/// field spellings the supported providers use.
pub fn response_error_detail(raw: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(raw).ok()?;
    let msg = v
        .pointer("/error/message")
        .and_then(serde_json::Value::as_str)
        .or_else(|| v.get("message").and_then(serde_json::Value::as_str))
        .or_else(|| v.get("msg").and_then(serde_json::Value::as_str))
        .or_else(|| v.get("error").and_then(serde_json::Value::as_str))
        .or_else(|| v.get("code").and_then(serde_json::Value::as_str))?;
    Some(clip(msg, 200))
}

/// Render models for storage as a JSON array string.
pub fn models_to_json(models: &[String]) -> String {
    serde_json::to_string(models).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a stored models value. Legacy scalar values become a single-element
/// list; unparseable values are kept verbatim as one entry.
pub fn models_from_json(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
            .collect(),
        Ok(serde_json::Value::String(s)) => vec![s],
        Ok(other) => vec![other.to_string()],
        Err(_) => vec![raw.to_string()],
    }
}
