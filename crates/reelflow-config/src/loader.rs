// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./reelflow.toml` > `~/.config/reelflow/reelflow.toml`
//! > `/etc/reelflow/reelflow.toml` with environment variable overrides via
//! the `REELFLOW_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ReelflowConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/reelflow/reelflow.toml` (system-wide)
/// 3. `~/.config/reelflow/reelflow.toml` (user XDG config)
/// 4. `./reelflow.toml` (local directory)
/// 5. `REELFLOW_*` environment variables
pub fn load_config() -> Result<ReelflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ReelflowConfig::default()))
        .merge(Toml::file("/etc/reelflow/reelflow.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("reelflow/reelflow.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("reelflow.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no file or env lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<ReelflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ReelflowConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ReelflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ReelflowConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `REELFLOW_STORAGE_BASE_URL` must map to
/// `storage.base_url`, not `storage.base.url`.
fn env_provider() -> Env {
    Env::prefixed("REELFLOW_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("app_", "app.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("ffmpeg_", "ffmpeg.", 1)
            .replacen("generation_", "generation.", 1);
        mapped.into()
    })
}
