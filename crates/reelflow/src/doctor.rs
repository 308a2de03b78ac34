// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Environment and configuration checks.

use reelflow_config::ReelflowConfig;
use reelflow_core::{Capability, ReelflowError};
use reelflow_storage::queries::providers;

pub async fn run(config: &ReelflowConfig) -> Result<(), ReelflowError> {
    println!("reelflow doctor");
    println!("  app.name          {}", config.app.name);
    println!("  database          {}", config.storage.database_path);

    let storage_root = config.storage.resolved_root();
    let storage_state = if storage_root.exists() {
        "exists"
    } else {
        "will be created on first write"
    };
    println!("  storage root      {} ({storage_state})", storage_root.display());
    println!(
        "  files base url    {}",
        config.storage.base_url.as_deref().unwrap_or("(not configured)")
    );

    let pipeline = crate::open_pipeline(config).await?;
    println!("  database open     ok");

    for capability in [
        Capability::Text,
        Capability::Image,
        Capability::StoryboardImage,
        Capability::Video,
    ] {
        let configs = providers::list_configs(pipeline.database(), Some(capability)).await?;
        let active = configs.iter().filter(|c| c.is_active).count();
        let default = configs
            .iter()
            .find(|c| c.is_default)
            .map(|c| c.name.as_str())
            .unwrap_or("-");
        println!(
            "  {capability:<17} {} configured, {active} active, default: {default}",
            configs.len()
        );
    }

    if pipeline.ffmpeg_available() {
        println!("  ffmpeg            available (merges concatenate)");
    } else {
        println!("  ffmpeg            not found (merges degrade to first clip)");
    }
    Ok(())
}
