// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text, image, and video generation commands.
//!
//! Image and video submissions hand work to the pipeline's background
//! worker, then poll the ledger like any other client until the task
//! settles, printing the final task record as JSON.

use std::time::Duration;

use clap::Args;
use reelflow_config::ReelflowConfig;
use reelflow_core::{
    extract_json, Capability, ImageRequest, ReelflowError, TaskStatus, VideoRequest,
};
use reelflow_pipeline::{ImageJob, Pipeline, VideoJob};
use reelflow_text::ChatOptions;

#[derive(Args, Debug)]
pub struct TextArgs {
    /// User prompt.
    prompt: String,
    /// Optional system prompt.
    #[arg(long)]
    system: Option<String>,
    /// Preferred model.
    #[arg(long)]
    model: Option<String>,
    /// Sampling temperature.
    #[arg(long, default_value_t = 0.7)]
    temperature: f64,
    #[arg(long)]
    max_tokens: Option<u32>,
    /// Extract the embedded JSON value and print it pretty-printed.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
pub struct ImageArgs {
    prompt: String,
    #[arg(long)]
    model: Option<String>,
    /// Narrow provider selection (e.g. dashscope).
    #[arg(long)]
    provider: Option<String>,
    /// Requested size, "WxH" or "W*H".
    #[arg(long)]
    size: Option<String>,
    #[arg(long)]
    quality: Option<String>,
    #[arg(long)]
    negative_prompt: Option<String>,
    /// Reference image (repeatable): URL, storage path, or data URL.
    #[arg(long = "ref")]
    references: Vec<String>,
    /// Use the storyboard-image capability (falls back to image configs).
    #[arg(long, default_value_t = false)]
    storyboard: bool,
    /// Resource this work belongs to (episode, character, shot id).
    #[arg(long, default_value = "")]
    resource: String,
    /// Storage category for the localized copy.
    #[arg(long, default_value = "images")]
    category: String,
}

#[derive(Args, Debug)]
pub struct VideoArgs {
    prompt: String,
    #[arg(long)]
    model: Option<String>,
    /// Clip length in seconds.
    #[arg(long)]
    duration: Option<u32>,
    #[arg(long)]
    ratio: Option<String>,
    #[arg(long)]
    resolution: Option<String>,
    #[arg(long)]
    seed: Option<i64>,
    /// Conditioning image for image-to-video.
    #[arg(long)]
    image: Option<String>,
    /// First/last frame pair for interpolation models.
    #[arg(long)]
    first_frame: Option<String>,
    #[arg(long)]
    last_frame: Option<String>,
    /// Reference input (repeatable) for multi-reference models.
    #[arg(long = "ref")]
    references: Vec<String>,
    #[arg(long, default_value = "")]
    resource: String,
}

pub async fn run_text(config: &ReelflowConfig, args: &TextArgs) -> Result<(), ReelflowError> {
    let pipeline = crate::open_pipeline(config).await?;
    let options = ChatOptions {
        temperature: args.temperature,
        max_tokens: args.max_tokens,
    };
    let text = pipeline
        .generate_text(
            &args.prompt,
            args.system.as_deref(),
            args.model.as_deref(),
            &options,
        )
        .await?;
    if args.json {
        let value = extract_json(&text)?;
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
    } else {
        println!("{text}");
    }
    Ok(())
}

pub async fn run_image(config: &ReelflowConfig, args: &ImageArgs) -> Result<(), ReelflowError> {
    let pipeline = crate::open_pipeline(config).await?;
    let capability = if args.storyboard {
        Capability::StoryboardImage
    } else {
        Capability::Image
    };
    let submission = pipeline
        .submit_image(ImageJob {
            request: ImageRequest {
                prompt: args.prompt.clone(),
                model: args.model.clone(),
                provider: args.provider.clone(),
                size: args.size.clone(),
                quality: args.quality.clone(),
                negative_prompt: args.negative_prompt.clone(),
                reference_images: args.references.clone(),
            },
            capability,
            resource_id: args.resource.clone(),
            category: args.category.clone(),
        })
        .await?;
    eprintln!("task {} submitted", submission.task.id);
    settle(&pipeline, &submission.task.id).await
}

pub async fn run_video(config: &ReelflowConfig, args: &VideoArgs) -> Result<(), ReelflowError> {
    let pipeline = crate::open_pipeline(config).await?;
    let submission = pipeline
        .submit_video(VideoJob {
            request: VideoRequest {
                prompt: args.prompt.clone(),
                model: args.model.clone(),
                duration: args.duration,
                aspect_ratio: args.ratio.clone(),
                resolution: args.resolution.clone(),
                seed: args.seed,
                camera_fixed: None,
                watermark: None,
                image_url: args.image.clone(),
                first_frame_url: args.first_frame.clone(),
                last_frame_url: args.last_frame.clone(),
                reference_urls: args.references.clone(),
            },
            resource_id: args.resource.clone(),
        })
        .await?;
    eprintln!("task {} submitted", submission.task.id);
    settle(&pipeline, &submission.task.id).await
}

/// Wait for a ledger task to settle and print it. Failed tasks exit nonzero
/// so the command composes in scripts.
pub async fn settle(pipeline: &Pipeline, task_id: &str) -> Result<(), ReelflowError> {
    let task = pipeline
        .wait_for_task(task_id, Duration::from_secs(2), Duration::from_secs(4 * 3600))
        .await?;
    println!("{}", serde_json::to_string_pretty(&task).unwrap_or_default());
    if task.status == TaskStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}
