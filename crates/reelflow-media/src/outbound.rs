// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound reference resolution.
//!
//! Several providers run on remote infrastructure that cannot dereference a
//! URL pointing at this system's own static file server, and a bare
//! storage-relative path means nothing to them at all. Before a reference
//! image leaves the process it is therefore rewritten: publicly routable
//! URLs pass through, anything local is read from disk and inlined as a
//! `data:` URL, and unreadable files degrade to best-effort URL
//! reconstruction.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reelflow_core::MediaReference;
use tracing::debug;

/// Rewrites media references into forms an external provider can consume.
#[derive(Debug, Clone)]
pub struct OutboundResolver {
    files_base_url: Option<String>,
    storage_root: PathBuf,
}

impl OutboundResolver {
    pub fn new(files_base_url: Option<String>, storage_root: PathBuf) -> Self {
        let files_base_url =
            files_base_url.map(|b| b.trim_end_matches('/').to_string()).filter(|b| !b.is_empty());
        Self {
            files_base_url,
            storage_root,
        }
    }

    fn base_is_local(&self) -> bool {
        self.files_base_url
            .as_deref()
            .map(|b| {
                let lower = b.to_ascii_lowercase();
                lower.contains("localhost") || lower.contains("127.0.0.1")
            })
            .unwrap_or(false)
    }

    fn to_public_url(&self, value: &str) -> String {
        let s = value.trim();
        if s.starts_with("http://") || s.starts_with("https://") {
            return s.to_string();
        }
        match &self.files_base_url {
            Some(base) => format!("{base}/{}", s.trim_start_matches('/')),
            None => s.to_string(),
        }
    }

    /// Resolve a reference for an outbound provider request.
    ///
    /// Returns `None` only for empty input. A same-host-relative value is
    /// never returned as-is: it becomes inline bytes, or a reconstructed
    /// public URL when the file cannot be read.
    pub fn resolve(&self, value: &str) -> Option<String> {
        let reference = MediaReference::parse(value)?;
        let relative = match reference {
            // Already inline: nothing to do.
            MediaReference::Inline { .. } => return Some(reference.to_wire()),
            MediaReference::Url(url) => {
                if !self.base_is_local() {
                    return Some(url);
                }
                // Our own static server is not reachable from the provider;
                // map the URL back onto local storage.
                match self.relative_from_url(&url) {
                    Some(rel) => rel,
                    None => return Some(url),
                }
            }
            MediaReference::Relative(rel) => rel,
        };

        let file_path = self.storage_root.join(&relative);
        match std::fs::read(&file_path) {
            Ok(bytes) => {
                let mime = mime_for_path(&file_path);
                Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
            }
            Err(e) => {
                debug!(error = %e, path = %file_path.display(), "outbound: local read failed, falling back to URL");
                Some(self.to_public_url(value))
            }
        }
    }

    /// Extract the storage-relative part of a URL that points at our own
    /// static server.
    fn relative_from_url(&self, url: &str) -> Option<String> {
        if let Some(after) = url.split("/static/").nth(1) {
            return Some(after.trim_start_matches('/').to_string());
        }
        let base = self.files_base_url.as_deref()?;
        let rest = url.strip_prefix(base)?;
        let rel = rest.trim_start_matches('/');
        if rel.is_empty() || rel.starts_with("http") {
            None
        } else {
            Some(rel.to_string())
        }
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/png",
    }
}
