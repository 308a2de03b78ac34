// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Reelflow pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Reelflow configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReelflowConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub app: AppConfig,

    /// Database and media storage locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// External concatenation tool settings.
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,

    /// Poll budgets and HTTP timeouts for generation adapters.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Display name of the service.
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_app_name() -> String {
    "reelflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Database and media storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database file path.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Root directory for localized media. Relative paths resolve against
    /// the process working directory.
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Public base URL under which `local_path` is served by an external
    /// static file server. `None` when no such server is configured; a
    /// localhost value here means outbound references must be inlined.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            local_path: default_local_path(),
            base_url: None,
        }
    }
}

impl StorageConfig {
    /// Absolute storage root (relative paths join the working directory).
    pub fn resolved_root(&self) -> PathBuf {
        let p = Path::new(&self.local_path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(p)
        }
    }
}

fn default_database_path() -> String {
    "./data/reelflow.db".to_string()
}

fn default_local_path() -> String {
    "./data/storage".to_string()
}

/// External concatenation tool configuration.
///
/// Binary resolution order at merge time: the `FFMPEG_PATH` environment
/// variable, then `binary_path`, then `tools_dir/ffmpeg[.exe]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FfmpegConfig {
    /// Explicit path to the ffmpeg binary.
    #[serde(default)]
    pub binary_path: Option<String>,

    /// Directory holding a bundled ffmpeg copy.
    #[serde(default = "default_tools_dir")]
    pub tools_dir: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            tools_dir: default_tools_dir(),
        }
    }
}

fn default_tools_dir() -> String {
    "./tools/ffmpeg".to_string()
}

/// Poll budgets and HTTP timeouts for the generation adapters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Poll attempts for async image providers.
    #[serde(default = "default_image_poll_attempts")]
    pub image_poll_attempts: u32,

    /// Seconds between image poll attempts.
    #[serde(default = "default_image_poll_interval_secs")]
    pub image_poll_interval_secs: u64,

    /// Poll attempts for async video providers. Video latency is high and
    /// unpredictable, so the default budget is tens of minutes.
    #[serde(default = "default_video_poll_attempts")]
    pub video_poll_attempts: u32,

    /// Seconds between video poll attempts.
    #[serde(default = "default_video_poll_interval_secs")]
    pub video_poll_interval_secs: u64,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            image_poll_attempts: default_image_poll_attempts(),
            image_poll_interval_secs: default_image_poll_interval_secs(),
            video_poll_attempts: default_video_poll_attempts(),
            video_poll_interval_secs: default_video_poll_interval_secs(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn image_poll_interval(&self) -> Duration {
        Duration::from_secs(self.image_poll_interval_secs)
    }

    pub fn video_poll_interval(&self) -> Duration {
        Duration::from_secs(self.video_poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn default_image_poll_attempts() -> u32 {
    60
}

fn default_image_poll_interval_secs() -> u64 {
    3
}

fn default_video_poll_attempts() -> u32 {
    300
}

fn default_video_poll_interval_secs() -> u64 {
    10
}

fn default_http_timeout_secs() -> u64 {
    300
}
