// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Video assembly: resolve an ordered list of per-shot clip references to
//! local files and concatenate them into one episode file.
//!
//! Concatenation is an optional post-processing step: when the external
//! tool is missing or fails, the merge degrades to the first resolvable
//! clip and still reports success, with the total duration summed over all
//! declared inputs. Partial functionality beats hard failure here.

use std::path::{Path, PathBuf};

use reelflow_core::ReelflowError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub mod ffmpeg;

pub use ffmpeg::FfmpegLocator;

/// More inputs than this and concatenation is not attempted.
const MAX_CONCAT_CLIPS: usize = 100;

/// One clip in merge order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSegment {
    /// Clip reference: our own static URL, a local/storage-relative path,
    /// or a remote URL.
    pub source: String,
    /// Declared clip length; counted toward the total even when the clip
    /// fails to resolve.
    #[serde(default)]
    pub duration_seconds: f64,
}

/// Outcome of a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedVideo {
    /// Storage-relative path of the concatenated file, or the first
    /// resolvable clip's original reference in the degraded case.
    pub merged_path: String,
    /// Sum of all declared segment durations.
    pub total_duration_seconds: f64,
    /// False when the first-clip fallback was used.
    pub concatenated: bool,
}

/// Resolves clips and drives the concatenation tool.
#[derive(Debug, Clone)]
pub struct Assembler {
    http: reqwest::Client,
    storage_root: PathBuf,
    files_base_url: Option<String>,
    ffmpeg: FfmpegLocator,
}

impl Assembler {
    pub fn new(
        storage_root: PathBuf,
        files_base_url: Option<String>,
        ffmpeg: FfmpegLocator,
    ) -> Result<Self, ReelflowError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| ReelflowError::Media(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            storage_root,
            files_base_url: files_base_url
                .map(|b| b.trim_end_matches('/').to_string())
                .filter(|b| !b.is_empty()),
            ffmpeg,
        })
    }

    /// Whether a concatenation tool is present. Merges still succeed
    /// without one, degraded to the first clip.
    pub fn tool_available(&self) -> bool {
        self.ffmpeg.locate().is_some()
    }

    /// Merge clips in order.
    ///
    /// Fails only when no clip resolves to playable media; every other
    /// problem degrades. Scratch downloads are deleted regardless of
    /// outcome.
    pub async fn merge(&self, segments: &[MergeSegment]) -> Result<MergedVideo, ReelflowError> {
        if segments.is_empty() {
            return Err(ReelflowError::NoValidSegments);
        }
        let total_duration: f64 = segments.iter().map(|s| s.duration_seconds.max(0.0)).sum();

        let scratch = std::env::temp_dir().join("reelflow-merge");
        if let Err(e) = tokio::fs::create_dir_all(&scratch).await {
            return Err(ReelflowError::Media(format!(
                "cannot create scratch directory: {e}"
            )));
        }

        let mut resolved: Vec<(String, PathBuf)> = Vec::new();
        let mut scratch_files: Vec<PathBuf> = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            match self.resolve_clip(&segment.source, index, &scratch).await {
                Some(path) => {
                    if path.starts_with(&scratch) {
                        scratch_files.push(path.clone());
                    }
                    resolved.push((segment.source.clone(), path));
                }
                None => {
                    warn!(index, source = %segment.source, "merge: segment could not be resolved");
                }
            }
        }
        if resolved.is_empty() {
            return Err(ReelflowError::NoValidSegments);
        }

        let mut concatenated_path: Option<String> = None;
        if resolved.len() <= MAX_CONCAT_CLIPS {
            if let Some(binary) = self.ffmpeg.locate() {
                concatenated_path = self.concatenate(&binary, &resolved).await;
            } else {
                debug!("merge: no concatenation tool available, degrading to first clip");
            }
        }

        for file in &scratch_files {
            let _ = tokio::fs::remove_file(file).await;
        }

        match concatenated_path {
            Some(merged_path) => {
                info!(merged_path = %merged_path, "merge completed (concatenated)");
                Ok(MergedVideo {
                    merged_path,
                    total_duration_seconds: total_duration,
                    concatenated: true,
                })
            }
            None => {
                let first = resolved[0].0.clone();
                info!(merged_path = %first, "merge completed (first-clip fallback)");
                Ok(MergedVideo {
                    merged_path: first,
                    total_duration_seconds: total_duration,
                    concatenated: false,
                })
            }
        }
    }

    async fn concatenate(
        &self,
        binary: &Path,
        resolved: &[(String, PathBuf)],
    ) -> Option<String> {
        let merged_dir = self.storage_root.join("videos").join("merged");
        if let Err(e) = tokio::fs::create_dir_all(&merged_dir).await {
            warn!(error = %e, "merge: cannot create merged directory");
            return None;
        }
        let entropy = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!("merged_{}.mp4", &entropy[..12]);
        let output = merged_dir.join(&file_name);
        let inputs: Vec<PathBuf> = resolved.iter().map(|(_, p)| p.clone()).collect();

        let ok = ffmpeg::run_concat(binary, &inputs, &output).await;
        if ok && output.exists() {
            Some(format!("videos/merged/{file_name}"))
        } else {
            None
        }
    }

    /// Resolve one clip reference to a local file, in order: our own static
    /// URL mapped onto storage, an existing absolute path, a
    /// storage-relative path, then a scratch download.
    async fn resolve_clip(&self, source: &str, index: usize, scratch: &Path) -> Option<PathBuf> {
        let value = source.trim();
        if value.is_empty() {
            return None;
        }

        if let Some(base) = &self.files_base_url {
            if let Some(rest) = value.strip_prefix(base.as_str()) {
                let rel = rest.trim_start_matches('/');
                if !rel.is_empty() && !rel.starts_with("http") {
                    let local = self.storage_root.join(rel);
                    if local.exists() {
                        debug!(index, path = %local.display(), "merge: using local static file");
                        return Some(local);
                    }
                }
            }
        }

        let as_path = Path::new(value);
        if as_path.is_absolute() && as_path.exists() {
            debug!(index, path = %value, "merge: using absolute path");
            return Some(as_path.to_path_buf());
        }

        if !value.starts_with("http://") && !value.starts_with("https://") {
            let local = self.storage_root.join(value.trim_start_matches('/'));
            if local.exists() {
                debug!(index, path = %local.display(), "merge: using storage-relative path");
                return Some(local);
            }
            return None;
        }

        // Remote URL: download to scratch.
        let ext = if value.split('?').next().unwrap_or(value).ends_with(".webm") {
            "webm"
        } else {
            "mp4"
        };
        let entropy = uuid::Uuid::new_v4().simple().to_string();
        let dest = scratch.join(format!("dl_{}_{index}.{ext}", &entropy[..8]));
        let response = match self.http.get(value).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(index, error = %e, "merge: download failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(index, status = %response.status(), "merge: download failed");
            return None;
        }
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(index, error = %e, "merge: reading download body failed");
                return None;
            }
        };
        if let Err(e) = tokio::fs::write(&dest, &bytes).await {
            warn!(index, error = %e, "merge: writing scratch download failed");
            return None;
        }
        debug!(index, dest = %dest.display(), "merge: downloaded to scratch");
        Some(dest)
    }
}
