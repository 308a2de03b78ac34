// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable local copies of remote or inline-encoded AI outputs.
//!
//! Provider result URLs expire, so every generated asset is copied under the
//! storage root before its record is persisted. Localization is best-effort
//! by contract: all failures log a warning and return `None`, never an
//! error, and callers keep the remote URL as a fallback reference.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reelflow_core::{MediaReference, ReelflowError};
use tracing::{debug, info, warn};

/// Writes localized media under a storage root.
#[derive(Debug, Clone)]
pub struct MediaStore {
    http: reqwest::Client,
    root: PathBuf,
}

impl MediaStore {
    /// Create a store rooted at `root`, with its own download client.
    pub fn new(root: PathBuf) -> Result<Self, ReelflowError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ReelflowError::Media(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save an image given by URL or `data:` payload under
    /// `<root>/<category>/`, returning the storage-relative path.
    ///
    /// Returns `None` on any failure; never errors.
    pub async fn localize_image(&self, value: &str, category: &str, prefix: &str) -> Option<String> {
        let (bytes, ext) = match MediaReference::parse(value)? {
            MediaReference::Inline { media_type, data } => {
                let Some(format) = media_type.strip_prefix("image/") else {
                    warn!(media_type, "localize: unsupported inline media type");
                    return None;
                };
                let bytes = match STANDARD.decode(data.as_bytes()) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(error = %e, "localize: invalid base64 payload");
                        return None;
                    }
                };
                let ext = if format == "jpeg" { "jpg" } else { format };
                (bytes, ext.to_string())
            }
            MediaReference::Url(url) => {
                let response = match self.http.get(&url).send().await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(error = %e, "localize: image download failed");
                        return None;
                    }
                };
                if !response.status().is_success() {
                    warn!(status = %response.status(), "localize: image download failed");
                    return None;
                }
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let ext = if content_type.contains("png") {
                    "png"
                } else if content_type.contains("webp") {
                    "webp"
                } else {
                    "jpg"
                };
                let bytes = match response.bytes().await {
                    Ok(bytes) => bytes.to_vec(),
                    Err(e) => {
                        warn!(error = %e, "localize: reading image body failed");
                        return None;
                    }
                };
                (bytes, ext.to_string())
            }
            MediaReference::Relative(path) => {
                debug!(path, "localize: value is already a local path");
                return None;
            }
        };
        self.write_bytes(category, prefix, &ext, &bytes).await
    }

    /// Download a remote video into `<root>/videos/`, returning the
    /// storage-relative path. Extension is sniffed from the URL path.
    pub async fn localize_video(&self, url: &str, prefix: &str) -> Option<String> {
        let trimmed = url.trim();
        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            debug!("localize: video value is not a remote URL");
            return None;
        }
        let ext = video_extension(trimmed);
        let response = match self.http.get(trimmed).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "localize: video download failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "localize: video download failed");
            return None;
        }
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                warn!(error = %e, "localize: reading video body failed");
                return None;
            }
        };
        self.write_bytes("videos", prefix, ext, &bytes).await
    }

    async fn write_bytes(
        &self,
        category: &str,
        prefix: &str,
        ext: &str,
        bytes: &[u8],
    ) -> Option<String> {
        let dir = self.root.join(category);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(error = %e, category, "localize: cannot create category directory");
            return None;
        }
        // Random component keeps concurrent writers collision-free.
        let entropy = uuid::Uuid::new_v4().simple().to_string();
        let name = if prefix.is_empty() {
            format!("{}.{ext}", &entropy[..8])
        } else {
            format!("{prefix}_{}.{ext}", &entropy[..8])
        };
        let path = dir.join(&name);
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            warn!(error = %e, path = %path.display(), "localize: write failed");
            return None;
        }
        let relative = format!("{category}/{name}");
        info!(local_path = %relative, "media saved to local storage");
        Some(relative)
    }
}

fn video_extension(url: &str) -> &'static str {
    let path = url.split('?').next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".webm") {
        "webm"
    } else if path.ends_with(".mov") {
        "mov"
    } else {
        "mp4"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn inline_payload_is_decoded_and_written() {
        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf()).unwrap();

        let payload = STANDARD.encode(b"fake png bytes");
        let value = format!("data:image/png;base64,{payload}");
        let rel = store.localize_image(&value, "characters", "ig").await.unwrap();

        assert!(rel.starts_with("characters/ig_"));
        assert!(rel.ends_with(".png"));
        let written = std::fs::read(dir.path().join(&rel)).unwrap();
        assert_eq!(written, b"fake png bytes");
    }

    #[tokio::test]
    async fn jpeg_inline_payload_gets_jpg_extension() {
        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf()).unwrap();

        let value = format!("data:image/jpeg;base64,{}", STANDARD.encode(b"jpg"));
        let rel = store.localize_image(&value, "scenes", "").await.unwrap();
        assert!(rel.ends_with(".jpg"), "got: {rel}");
    }

    #[tokio::test]
    async fn invalid_inline_payload_returns_none() {
        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf()).unwrap();

        assert!(store
            .localize_image("data:image/png;base64,not!!base64", "images", "x")
            .await
            .is_none());
        assert!(store
            .localize_image("data:video/mp4;base64,AAAA", "images", "x")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn remote_image_is_downloaded_with_content_type_extension() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/result.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/webp")
                    .set_body_bytes(b"webp data".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf()).unwrap();
        let rel = store
            .localize_image(&format!("{}/result.bin", server.uri()), "images", "ig")
            .await
            .unwrap();
        assert!(rel.ends_with(".webp"), "got: {rel}");
        assert!(dir.path().join(&rel).exists());
    }

    #[tokio::test]
    async fn failed_download_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store
            .localize_image(&format!("{}/gone.png", server.uri()), "images", "ig")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn video_extension_is_sniffed_from_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.webm"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video".to_vec()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf()).unwrap();
        let rel = store
            .localize_video(&format!("{}/clip.webm?sig=abc", server.uri()), "vg_9")
            .await
            .unwrap();
        assert!(rel.starts_with("videos/vg_9_"));
        assert!(rel.ends_with(".webm"));
    }

    #[tokio::test]
    async fn local_path_input_is_not_relocalized() {
        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store
            .localize_image("characters/existing.png", "characters", "ig")
            .await
            .is_none());
        assert!(store.localize_video("videos/existing.mp4", "vg").await.is_none());
    }
}
