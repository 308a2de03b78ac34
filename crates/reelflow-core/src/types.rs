// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Reelflow pipeline crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The class of generation a provider configuration serves.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Text,
    Image,
    Video,
    StoryboardImage,
}

/// Lifecycle state of a task ledger entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Completed and failed tasks are terminal and never reopened.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A task ledger entry -- the only state a polling client observes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: String,
    pub status: TaskStatus,
    pub progress: i64,
    pub message: String,
    pub resource_id: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// A reference to a piece of media, in one of the three forms the pipeline
/// moves between: a public URL, a storage-relative path, or inline bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaReference {
    /// An `http(s)://` URL.
    Url(String),
    /// A path relative to the storage root (leading slashes stripped).
    Relative(String),
    /// Base64 payload with its MIME type, as in a `data:` URL.
    Inline { media_type: String, data: String },
}

impl MediaReference {
    /// Classify a raw string value. Returns `None` for empty input.
    pub fn parse(value: &str) -> Option<Self> {
        let s = value.trim();
        if s.is_empty() {
            return None;
        }
        if let Some(rest) = s.strip_prefix("data:") {
            let (media_type, data) = rest.split_once(";base64,")?;
            return Some(MediaReference::Inline {
                media_type: media_type.to_string(),
                data: data.to_string(),
            });
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Some(MediaReference::Url(s.to_string()));
        }
        Some(MediaReference::Relative(
            s.trim_start_matches('/').to_string(),
        ))
    }

    /// Render in the form sent over the wire. Relative paths are returned
    /// as-is; callers must resolve them before an outbound request.
    pub fn to_wire(&self) -> String {
        match self {
            MediaReference::Url(u) => u.clone(),
            MediaReference::Relative(p) => p.clone(),
            MediaReference::Inline { media_type, data } => {
                format!("data:{media_type};base64,{data}")
            }
        }
    }
}

/// A single logical image generation request, independent of provider protocol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    /// Preferred model; the resolver falls back to the config's defaults.
    #[serde(default)]
    pub model: Option<String>,
    /// Preferred provider name (e.g. "dashscope"); narrows selection only.
    #[serde(default)]
    pub provider: Option<String>,
    /// Requested size, "WxH" or "W*H".
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Reference images: URLs, storage-relative paths, or data URLs.
    /// Providers cap how many are forwarded; excess entries are dropped.
    #[serde(default)]
    pub reference_images: Vec<String>,
}

/// A single logical video generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Requested clip length in seconds.
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub camera_fixed: Option<bool>,
    #[serde(default)]
    pub watermark: Option<bool>,
    /// Single conditioning image (image-to-video).
    #[serde(default)]
    pub image_url: Option<String>,
    /// First/last frame pair for interpolation models.
    #[serde(default)]
    pub first_frame_url: Option<String>,
    #[serde(default)]
    pub last_frame_url: Option<String>,
    /// Multi-reference composition inputs; model-specific caps apply.
    #[serde(default)]
    pub reference_urls: Vec<String>,
}

/// Successful image generation: where the provider put the image.
///
/// The URL may be remote and ephemeral or an inline data URL; callers
/// localize it before persisting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub image_url: String,
}

/// Outcome of a video generation submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoSubmission {
    /// The provider answered synchronously with a finished video.
    Completed { video_url: String },
    /// The provider accepted the job; completion is discovered by polling.
    Accepted { task_id: String, status: String },
}

/// Current UTC time as an ISO 8601 string with millisecond precision.
pub fn now_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Clip a string to at most `max` characters, for log/error snippets.
pub fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
