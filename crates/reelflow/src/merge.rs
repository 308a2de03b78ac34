// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Episode assembly command.

use clap::Args;
use reelflow_assembly::MergeSegment;
use reelflow_config::ReelflowConfig;
use reelflow_core::ReelflowError;
use reelflow_pipeline::MergeRequest;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Clips in merge order, each as SOURCE=SECONDS
    /// (e.g. videos/shot1.mp4=5 https://cdn.example.com/shot2.mp4=3.5).
    #[arg(required = true)]
    segments: Vec<String>,
    #[arg(long, default_value = "")]
    resource: String,
}

fn parse_segment(raw: &str) -> Result<MergeSegment, ReelflowError> {
    // Split on the last '=' so URLs with query strings survive.
    let (source, duration) = raw.rsplit_once('=').ok_or_else(|| {
        ReelflowError::Config(format!("segment '{raw}' is not SOURCE=SECONDS"))
    })?;
    let duration_seconds: f64 = duration.parse().map_err(|_| {
        ReelflowError::Config(format!("segment '{raw}' has a non-numeric duration"))
    })?;
    Ok(MergeSegment {
        source: source.to_string(),
        duration_seconds,
    })
}

pub async fn run(config: &ReelflowConfig, args: &MergeArgs) -> Result<(), ReelflowError> {
    let segments = args
        .segments
        .iter()
        .map(|raw| parse_segment(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let pipeline = crate::open_pipeline(config).await?;
    let submission = pipeline
        .submit_merge(MergeRequest {
            segments,
            resource_id: args.resource.clone(),
        })
        .await?;
    eprintln!("task {} submitted", submission.task.id);
    crate::generate::settle(&pipeline, &submission.task.id).await
}
