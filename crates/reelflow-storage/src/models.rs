// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for generation records and merge jobs.

use reelflow_core::TaskStatus;
use serde::{Deserialize, Serialize};

/// One image generation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGeneration {
    pub id: i64,
    pub resource_id: String,
    pub provider: String,
    pub prompt: String,
    pub model: Option<String>,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub status: TaskStatus,
    /// Remote or inline URL as returned by the provider.
    pub image_url: Option<String>,
    /// Storage-relative path of the localized copy, when localization succeeded.
    pub local_path: Option<String>,
    pub task_id: String,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// One video generation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoGeneration {
    pub id: i64,
    pub resource_id: String,
    pub provider: String,
    pub prompt: String,
    pub model: Option<String>,
    pub duration: Option<i64>,
    pub aspect_ratio: Option<String>,
    pub status: TaskStatus,
    /// The provider-side task identifier for async submissions.
    pub provider_task_id: Option<String>,
    pub video_url: Option<String>,
    pub local_path: Option<String>,
    pub task_id: String,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// One merge job: immutable segment list in, single terminal status out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeJob {
    pub id: i64,
    pub resource_id: String,
    pub status: TaskStatus,
    /// JSON array of `{source, duration_seconds}` entries.
    pub segments: String,
    pub merged_path: Option<String>,
    pub duration_seconds: Option<f64>,
    pub task_id: String,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}
