// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker orchestration for the generation pipeline.
//!
//! Callers submit work and get back a ledger task id immediately; a spawned
//! worker drives the adapter, localizes the output, and writes exactly one
//! terminal state through the ledger API. The ledger is the only channel a
//! polling client observes. All collaborators are explicitly constructed
//! and injected here; there is no process-wide state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reelflow_assembly::{Assembler, FfmpegLocator, MergeSegment};
use reelflow_config::ReelflowConfig;
use reelflow_core::{
    select_config, Capability, ImageRequest, ProviderConfig, ReelflowError, Task, TaskStatus,
    VideoRequest, VideoSubmission,
};
use reelflow_image::ImageClient;
use reelflow_media::{MediaStore, OutboundResolver};
use reelflow_storage::queries::{generations, providers, tasks};
use reelflow_storage::Database;
use reelflow_text::{ChatClient, ChatOptions};
use reelflow_video::VideoClient;
use serde_json::json;
use tracing::{error, info};

/// An image generation submission.
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub request: ImageRequest,
    /// Image or StoryboardImage; the latter falls back to plain image
    /// configurations when none is dedicated.
    pub capability: Capability,
    /// External record this work belongs to (episode, character, shot).
    pub resource_id: String,
    /// Storage category for the localized copy.
    pub category: String,
}

/// A video generation submission.
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub request: VideoRequest,
    pub resource_id: String,
}

/// A merge submission: ordered clips for one episode.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub segments: Vec<MergeSegment>,
    pub resource_id: String,
}

/// What a caller gets back synchronously: the generation record id and the
/// ledger task to poll.
#[derive(Debug, Clone)]
pub struct Submission {
    pub record_id: i64,
    pub task: Task,
}

struct Inner {
    db: Database,
    media: MediaStore,
    image: ImageClient,
    video: VideoClient,
    chat: ChatClient,
    assembler: Assembler,
    video_poll_attempts: u32,
    video_poll_interval: Duration,
}

/// The generation pipeline facade.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    /// Wire up all collaborators from configuration and an open database.
    pub fn new(db: Database, config: &ReelflowConfig) -> Result<Self, ReelflowError> {
        let storage_root = config.storage.resolved_root();
        let resolver =
            OutboundResolver::new(config.storage.base_url.clone(), storage_root.clone());
        let media = MediaStore::new(storage_root.clone())?;
        let timeout = config.generation.http_timeout();
        let image = ImageClient::new(resolver.clone(), timeout)?.with_poll(
            config.generation.image_poll_attempts,
            config.generation.image_poll_interval(),
        );
        let video = VideoClient::new(resolver, timeout)?;
        let chat = ChatClient::new(timeout)?;
        let ffmpeg = FfmpegLocator::new(
            config.ffmpeg.binary_path.as_ref().map(PathBuf::from),
            PathBuf::from(&config.ffmpeg.tools_dir),
        );
        let assembler = Assembler::new(storage_root, config.storage.base_url.clone(), ffmpeg)?;
        Ok(Self {
            inner: Arc::new(Inner {
                db,
                media,
                image,
                video,
                chat,
                assembler,
                video_poll_attempts: config.generation.video_poll_attempts,
                video_poll_interval: config.generation.video_poll_interval(),
            }),
        })
    }

    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    /// Whether the concatenation tool is present (merges degrade without it).
    pub fn ffmpeg_available(&self) -> bool {
        self.inner.assembler.tool_available()
    }

    /// Generate text synchronously (no ledger entry; latency is interactive).
    pub async fn generate_text(
        &self,
        prompt: &str,
        system: Option<&str>,
        model: Option<&str>,
        options: &ChatOptions,
    ) -> Result<String, ReelflowError> {
        let configs = providers::list_configs(&self.inner.db, Some(Capability::Text)).await?;
        let config = select_config(&configs, model, None).ok_or(ReelflowError::NotConfigured {
            capability: Capability::Text,
        })?;
        self.inner.chat.generate(config, prompt, system, options).await
    }

    /// Create the ledger entry and generation record for an image job and
    /// hand the work to a background worker. Returns immediately.
    pub async fn submit_image(&self, job: ImageJob) -> Result<Submission, ReelflowError> {
        let task = tasks::create(&self.inner.db, "image_generation", &job.resource_id).await?;
        let record_id = generations::create_image(
            &self.inner.db,
            generations::NewImageGeneration {
                resource_id: job.resource_id.clone(),
                provider: job.request.provider.clone().unwrap_or_default(),
                prompt: job.request.prompt.clone(),
                model: job.request.model.clone(),
                size: job.request.size.clone(),
                quality: job.request.quality.clone(),
                task_id: task.id.clone(),
            },
        )
        .await?;

        let inner = self.inner.clone();
        let task_id = task.id.clone();
        tokio::spawn(async move {
            inner.run_image(record_id, task_id, job).await;
        });
        Ok(Submission { record_id, task })
    }

    /// Create the ledger entry and generation record for a video job and
    /// hand the work to a background worker. Returns immediately.
    pub async fn submit_video(&self, job: VideoJob) -> Result<Submission, ReelflowError> {
        let task = tasks::create(&self.inner.db, "video_generation", &job.resource_id).await?;
        let record_id = generations::create_video(
            &self.inner.db,
            generations::NewVideoGeneration {
                resource_id: job.resource_id.clone(),
                provider: String::new(),
                prompt: job.request.prompt.clone(),
                model: job.request.model.clone(),
                duration: job.request.duration.map(i64::from),
                aspect_ratio: job.request.aspect_ratio.clone(),
                task_id: task.id.clone(),
            },
        )
        .await?;

        let inner = self.inner.clone();
        let task_id = task.id.clone();
        tokio::spawn(async move {
            inner.run_video(record_id, task_id, job).await;
        });
        Ok(Submission { record_id, task })
    }

    /// Create the ledger entry and merge record and hand the work to a
    /// background worker. Returns immediately.
    pub async fn submit_merge(&self, request: MergeRequest) -> Result<Submission, ReelflowError> {
        let task = tasks::create(&self.inner.db, "video_merge", &request.resource_id).await?;
        let segments_json =
            serde_json::to_string(&request.segments).map_err(|e| ReelflowError::Internal(
                format!("cannot serialize merge segments: {e}"),
            ))?;
        let record_id = generations::create_merge(
            &self.inner.db,
            &request.resource_id,
            &segments_json,
            &task.id,
        )
        .await?;

        let inner = self.inner.clone();
        let task_id = task.id.clone();
        tokio::spawn(async move {
            inner.run_merge(record_id, task_id, request.segments).await;
        });
        Ok(Submission { record_id, task })
    }

    /// Ledger passthrough for polling clients.
    pub async fn task(&self, id: &str) -> Result<Option<Task>, ReelflowError> {
        tasks::get(&self.inner.db, id).await
    }

    /// All ledger entries for a resource, newest first.
    pub async fn tasks_for_resource(&self, resource_id: &str) -> Result<Vec<Task>, ReelflowError> {
        tasks::list_for_resource(&self.inner.db, resource_id).await
    }

    /// Poll the ledger until the task is terminal or `timeout` elapses.
    pub async fn wait_for_task(
        &self,
        id: &str,
        poll: Duration,
        timeout: Duration,
    ) -> Result<Task, ReelflowError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(task) = self.task(id).await? {
                if task.status.is_terminal() {
                    return Ok(task);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ReelflowError::Internal(format!(
                    "timed out waiting for task {id}"
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }
}

impl Inner {
    async fn resolve_config(
        &self,
        capability: Capability,
        preferred_model: Option<&str>,
        preferred_provider: Option<&str>,
    ) -> Result<ProviderConfig, ReelflowError> {
        let configs = providers::list_for_generation(&self.db, capability).await?;
        select_config(&configs, preferred_model, preferred_provider)
            .cloned()
            .ok_or(ReelflowError::NotConfigured { capability })
    }

    async fn run_image(&self, record_id: i64, task_id: String, job: ImageJob) {
        if let Err(e) = self.drive_image(record_id, &task_id, &job).await {
            self.record_failure("image", record_id, &task_id, &e).await;
        }
    }

    async fn drive_image(
        &self,
        record_id: i64,
        task_id: &str,
        job: &ImageJob,
    ) -> Result<(), ReelflowError> {
        generations::mark_image_processing(&self.db, record_id).await?;
        tasks::set_status(&self.db, task_id, TaskStatus::Processing, 10, "generating image")
            .await?;

        let config = self
            .resolve_config(
                job.capability,
                job.request.model.as_deref(),
                job.request.provider.as_deref(),
            )
            .await?;
        let generated = self.image.generate(&config, &job.request).await?;

        let prefix = format!("ig_{record_id}");
        let local_path = self
            .media
            .localize_image(&generated.image_url, &job.category, &prefix)
            .await;

        generations::complete_image(
            &self.db,
            record_id,
            &generated.image_url,
            local_path.as_deref(),
        )
        .await?;
        tasks::set_result(
            &self.db,
            task_id,
            &json!({
                "image_generation_id": record_id,
                "image_url": generated.image_url,
                "local_path": local_path,
                "status": "completed",
            }),
        )
        .await?;
        info!(record_id, task_id, "image generation completed");
        Ok(())
    }

    async fn run_video(&self, record_id: i64, task_id: String, job: VideoJob) {
        if let Err(e) = self.drive_video(record_id, &task_id, &job).await {
            self.record_failure("video", record_id, &task_id, &e).await;
        }
    }

    async fn drive_video(
        &self,
        record_id: i64,
        task_id: &str,
        job: &VideoJob,
    ) -> Result<(), ReelflowError> {
        generations::mark_video_processing(&self.db, record_id).await?;
        tasks::set_status(&self.db, task_id, TaskStatus::Processing, 10, "submitting video job")
            .await?;

        let config = self
            .resolve_config(Capability::Video, job.request.model.as_deref(), None)
            .await?;
        let video_url = match self.video.generate(&config, &job.request).await? {
            VideoSubmission::Completed { video_url } => video_url,
            VideoSubmission::Accepted { task_id: provider_task_id, .. } => {
                generations::set_video_provider_task(&self.db, record_id, &provider_task_id)
                    .await?;
                tasks::set_status(
                    &self.db,
                    task_id,
                    TaskStatus::Processing,
                    50,
                    "waiting for provider",
                )
                .await?;
                self.video
                    .poll(
                        &config,
                        &provider_task_id,
                        self.video_poll_attempts,
                        self.video_poll_interval,
                    )
                    .await?
            }
        };

        let local_path = self
            .media
            .localize_video(&video_url, &format!("vg_{record_id}"))
            .await;

        generations::complete_video(&self.db, record_id, &video_url, local_path.as_deref())
            .await?;
        tasks::set_result(
            &self.db,
            task_id,
            &json!({
                "video_generation_id": record_id,
                "video_url": video_url,
                "local_path": local_path,
                "status": "completed",
            }),
        )
        .await?;
        info!(record_id, task_id, "video generation completed");
        Ok(())
    }

    async fn run_merge(&self, record_id: i64, task_id: String, segments: Vec<MergeSegment>) {
        if let Err(e) = self.drive_merge(record_id, &task_id, &segments).await {
            self.record_failure("merge", record_id, &task_id, &e).await;
        }
    }

    async fn drive_merge(
        &self,
        record_id: i64,
        task_id: &str,
        segments: &[MergeSegment],
    ) -> Result<(), ReelflowError> {
        generations::mark_merge_processing(&self.db, record_id).await?;
        tasks::set_status(&self.db, task_id, TaskStatus::Processing, 10, "resolving segments")
            .await?;

        // A degraded (first-clip) merge is still a success; only
        // NoValidSegments propagates as a failure.
        let merged = self.assembler.merge(segments).await?;

        generations::complete_merge(
            &self.db,
            record_id,
            &merged.merged_path,
            merged.total_duration_seconds,
        )
        .await?;
        tasks::set_result(
            &self.db,
            task_id,
            &json!({
                "merge_id": record_id,
                "video_url": merged.merged_path,
                "duration": merged.total_duration_seconds,
                "concatenated": merged.concatenated,
            }),
        )
        .await?;
        info!(record_id, task_id, concatenated = merged.concatenated, "merge completed");
        Ok(())
    }

    /// Write one failure through the ledger; the message is kept verbatim
    /// for display. Storage errors at this point can only be logged.
    async fn record_failure(&self, kind: &str, record_id: i64, task_id: &str, e: &ReelflowError) {
        let message = e.to_string();
        error!(kind, record_id, task_id, error = %message, "generation work failed");
        let record_result = match kind {
            "image" => generations::fail_image(&self.db, record_id, &message).await,
            "video" => generations::fail_video(&self.db, record_id, &message).await,
            _ => generations::fail_merge(&self.db, record_id, &message).await,
        };
        if let Err(storage_err) = record_result {
            error!(record_id, error = %storage_err, "failed to record generation failure");
        }
        if let Err(storage_err) = tasks::set_error(&self.db, task_id, &message).await {
            error!(task_id, error = %storage_err, "failed to record task failure");
        }
    }
}
