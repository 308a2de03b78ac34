// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered TOML + environment configuration for the Reelflow pipeline.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{AppConfig, FfmpegConfig, GenerationConfig, ReelflowConfig, StorageConfig};
