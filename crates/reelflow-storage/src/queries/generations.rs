// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation record and merge job queries.
//!
//! Each worker owns its record's lifecycle: pending on creation, processing
//! when work starts, then exactly one terminal write. The same status-guard
//! discipline as the task ledger applies.

use reelflow_core::{now_iso, ReelflowError, TaskStatus};
use rusqlite::params;

use crate::database::Database;
use crate::models::{ImageGeneration, MergeJob, VideoGeneration};

fn parse_status(idx: usize, raw: String) -> Result<TaskStatus, rusqlite::Error> {
    raw.parse().map_err(|e: strum::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// --- Image generations ---

/// Input for a new image generation record.
#[derive(Debug, Clone)]
pub struct NewImageGeneration {
    pub resource_id: String,
    pub provider: String,
    pub prompt: String,
    pub model: Option<String>,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub task_id: String,
}

fn map_image_row(row: &rusqlite::Row<'_>) -> Result<ImageGeneration, rusqlite::Error> {
    Ok(ImageGeneration {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        provider: row.get(2)?,
        prompt: row.get(3)?,
        model: row.get(4)?,
        size: row.get(5)?,
        quality: row.get(6)?,
        status: parse_status(7, row.get(7)?)?,
        image_url: row.get(8)?,
        local_path: row.get(9)?,
        task_id: row.get(10)?,
        error: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        completed_at: row.get(14)?,
    })
}

const IMAGE_COLUMNS: &str = "id, resource_id, provider, prompt, model, size, quality, status,
                             image_url, local_path, task_id, error, created_at, updated_at,
                             completed_at";

/// Create a pending image generation record. Returns its id.
pub async fn create_image(db: &Database, new: NewImageGeneration) -> Result<i64, ReelflowError> {
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO image_generations
                 (resource_id, provider, prompt, model, size, quality, status, task_id,
                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?8)",
                params![
                    new.resource_id,
                    new.provider,
                    new.prompt,
                    new.model,
                    new.size,
                    new.quality,
                    new.task_id,
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch an image generation record.
pub async fn get_image(db: &Database, id: i64) -> Result<Option<ImageGeneration>, ReelflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {IMAGE_COLUMNS} FROM image_generations WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], map_image_row) {
                Ok(item) => Ok(Some(item)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark an image generation as processing.
pub async fn mark_image_processing(db: &Database, id: i64) -> Result<(), ReelflowError> {
    set_generation_status(db, "image_generations", id, TaskStatus::Processing).await
}

/// Record a successful image generation.
pub async fn complete_image(
    db: &Database,
    id: i64,
    image_url: &str,
    local_path: Option<&str>,
) -> Result<(), ReelflowError> {
    let image_url = image_url.to_string();
    let local_path = local_path.map(str::to_string);
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE image_generations
                 SET status = 'completed', image_url = ?2, local_path = ?3,
                     completed_at = ?4, updated_at = ?4
                 WHERE id = ?1 AND status NOT IN ('completed','failed')",
                params![id, image_url, local_path, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a failed image generation.
pub async fn fail_image(db: &Database, id: i64, error: &str) -> Result<(), ReelflowError> {
    fail_generation(db, "image_generations", id, error).await
}

// --- Video generations ---

/// Input for a new video generation record.
#[derive(Debug, Clone)]
pub struct NewVideoGeneration {
    pub resource_id: String,
    pub provider: String,
    pub prompt: String,
    pub model: Option<String>,
    pub duration: Option<i64>,
    pub aspect_ratio: Option<String>,
    pub task_id: String,
}

fn map_video_row(row: &rusqlite::Row<'_>) -> Result<VideoGeneration, rusqlite::Error> {
    Ok(VideoGeneration {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        provider: row.get(2)?,
        prompt: row.get(3)?,
        model: row.get(4)?,
        duration: row.get(5)?,
        aspect_ratio: row.get(6)?,
        status: parse_status(7, row.get(7)?)?,
        provider_task_id: row.get(8)?,
        video_url: row.get(9)?,
        local_path: row.get(10)?,
        task_id: row.get(11)?,
        error: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        completed_at: row.get(15)?,
    })
}

const VIDEO_COLUMNS: &str = "id, resource_id, provider, prompt, model, duration, aspect_ratio,
                             status, provider_task_id, video_url, local_path, task_id, error,
                             created_at, updated_at, completed_at";

/// Create a pending video generation record. Returns its id.
pub async fn create_video(db: &Database, new: NewVideoGeneration) -> Result<i64, ReelflowError> {
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO video_generations
                 (resource_id, provider, prompt, model, duration, aspect_ratio, status, task_id,
                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?8)",
                params![
                    new.resource_id,
                    new.provider,
                    new.prompt,
                    new.model,
                    new.duration,
                    new.aspect_ratio,
                    new.task_id,
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch a video generation record.
pub async fn get_video(db: &Database, id: i64) -> Result<Option<VideoGeneration>, ReelflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VIDEO_COLUMNS} FROM video_generations WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], map_video_row) {
                Ok(item) => Ok(Some(item)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark a video generation as processing.
pub async fn mark_video_processing(db: &Database, id: i64) -> Result<(), ReelflowError> {
    set_generation_status(db, "video_generations", id, TaskStatus::Processing).await
}

/// Store the provider-side task id once an async submission is accepted.
pub async fn set_video_provider_task(
    db: &Database,
    id: i64,
    provider_task_id: &str,
) -> Result<(), ReelflowError> {
    let provider_task_id = provider_task_id.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE video_generations SET provider_task_id = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![id, provider_task_id, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a successful video generation.
pub async fn complete_video(
    db: &Database,
    id: i64,
    video_url: &str,
    local_path: Option<&str>,
) -> Result<(), ReelflowError> {
    let video_url = video_url.to_string();
    let local_path = local_path.map(str::to_string);
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE video_generations
                 SET status = 'completed', video_url = ?2, local_path = ?3,
                     completed_at = ?4, updated_at = ?4
                 WHERE id = ?1 AND status NOT IN ('completed','failed')",
                params![id, video_url, local_path, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a failed video generation.
pub async fn fail_video(db: &Database, id: i64, error: &str) -> Result<(), ReelflowError> {
    fail_generation(db, "video_generations", id, error).await
}

// --- Merge jobs ---

fn map_merge_row(row: &rusqlite::Row<'_>) -> Result<MergeJob, rusqlite::Error> {
    Ok(MergeJob {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        status: parse_status(2, row.get(2)?)?,
        segments: row.get(3)?,
        merged_path: row.get(4)?,
        duration_seconds: row.get(5)?,
        task_id: row.get(6)?,
        error: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

const MERGE_COLUMNS: &str = "id, resource_id, status, segments, merged_path, duration_seconds,
                             task_id, error, created_at, updated_at, completed_at";

/// Create a pending merge job with its immutable segment list (JSON).
pub async fn create_merge(
    db: &Database,
    resource_id: &str,
    segments_json: &str,
    task_id: &str,
) -> Result<i64, ReelflowError> {
    let resource_id = resource_id.to_string();
    let segments_json = segments_json.to_string();
    let task_id = task_id.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO video_merges (resource_id, status, segments, task_id, created_at, updated_at)
                 VALUES (?1, 'pending', ?2, ?3, ?4, ?4)",
                params![resource_id, segments_json, task_id, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch a merge job.
pub async fn get_merge(db: &Database, id: i64) -> Result<Option<MergeJob>, ReelflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MERGE_COLUMNS} FROM video_merges WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], map_merge_row) {
                Ok(item) => Ok(Some(item)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark a merge job as processing.
pub async fn mark_merge_processing(db: &Database, id: i64) -> Result<(), ReelflowError> {
    set_generation_status(db, "video_merges", id, TaskStatus::Processing).await
}

/// Record a finished merge (including degraded first-clip results).
pub async fn complete_merge(
    db: &Database,
    id: i64,
    merged_path: &str,
    duration_seconds: f64,
) -> Result<(), ReelflowError> {
    let merged_path = merged_path.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE video_merges
                 SET status = 'completed', merged_path = ?2, duration_seconds = ?3,
                     error = NULL, completed_at = ?4, updated_at = ?4
                 WHERE id = ?1 AND status NOT IN ('completed','failed')",
                params![id, merged_path, duration_seconds, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a failed merge.
pub async fn fail_merge(db: &Database, id: i64, error: &str) -> Result<(), ReelflowError> {
    fail_generation(db, "video_merges", id, error).await
}

// --- Shared helpers ---

async fn set_generation_status(
    db: &Database,
    table: &'static str,
    id: i64,
    status: TaskStatus,
) -> Result<(), ReelflowError> {
    let status_str = status.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE {table} SET status = ?2, updated_at = ?3
                     WHERE id = ?1 AND status NOT IN ('completed','failed')"
                ),
                params![id, status_str, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

async fn fail_generation(
    db: &Database,
    table: &'static str,
    id: i64,
    error: &str,
) -> Result<(), ReelflowError> {
    let error = reelflow_core::types::clip(error, 500);
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE {table} SET status = 'failed', error = ?2,
                     completed_at = ?3, updated_at = ?3
                     WHERE id = ?1 AND status NOT IN ('completed','failed')"
                ),
                params![id, error, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("generations_test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn image_input(task_id: &str) -> NewImageGeneration {
        NewImageGeneration {
            resource_id: "character_3".to_string(),
            provider: "dashscope".to_string(),
            prompt: "a detective in the rain".to_string(),
            model: Some("wan2.6-image".to_string()),
            size: Some("1024x1024".to_string()),
            quality: None,
            task_id: task_id.to_string(),
        }
    }

    #[tokio::test]
    async fn image_generation_lifecycle() {
        let (db, _dir) = setup_db().await;
        let id = create_image(&db, image_input("t-1")).await.unwrap();

        mark_image_processing(&db, id).await.unwrap();
        let row = get_image(&db, id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Processing);
        assert!(row.completed_at.is_none());

        complete_image(&db, id, "https://cdn.example.com/i.png", Some("characters/ig_a.png"))
            .await
            .unwrap();
        let row = get_image(&db, id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Completed);
        assert_eq!(row.image_url.as_deref(), Some("https://cdn.example.com/i.png"));
        assert_eq!(row.local_path.as_deref(), Some("characters/ig_a.png"));
        assert!(row.completed_at.is_some());

        // Terminal rows ignore later writes.
        fail_image(&db, id, "late").await.unwrap();
        let row = get_image(&db, id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Completed);
        assert!(row.error.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn video_generation_records_provider_task() {
        let (db, _dir) = setup_db().await;
        let id = create_video(
            &db,
            NewVideoGeneration {
                resource_id: "shot_12".to_string(),
                provider: "volces".to_string(),
                prompt: "slow pan across the harbor".to_string(),
                model: Some("doubao-seedance-1.0-pro".to_string()),
                duration: Some(5),
                aspect_ratio: Some("16:9".to_string()),
                task_id: "t-2".to_string(),
            },
        )
        .await
        .unwrap();

        mark_video_processing(&db, id).await.unwrap();
        set_video_provider_task(&db, id, "cgt-20260101-abcdef").await.unwrap();
        let row = get_video(&db, id).await.unwrap().unwrap();
        assert_eq!(row.provider_task_id.as_deref(), Some("cgt-20260101-abcdef"));

        complete_video(&db, id, "https://cdn.example.com/v.mp4", Some("videos/vg_1.mp4"))
            .await
            .unwrap();
        let row = get_video(&db, id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Completed);
        assert_eq!(row.local_path.as_deref(), Some("videos/vg_1.mp4"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_video_keeps_truncated_error() {
        let (db, _dir) = setup_db().await;
        let id = create_video(
            &db,
            NewVideoGeneration {
                resource_id: "shot_1".to_string(),
                provider: "dashscope".to_string(),
                prompt: "p".to_string(),
                model: None,
                duration: None,
                aspect_ratio: None,
                task_id: "t-3".to_string(),
            },
        )
        .await
        .unwrap();

        let long_error = "x".repeat(700);
        fail_video(&db, id, &long_error).await.unwrap();
        let row = get_video(&db, id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Failed);
        assert_eq!(row.error.unwrap().len(), 500);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn merge_job_lifecycle() {
        let (db, _dir) = setup_db().await;
        let segments = r#"[{"source":"videos/a.mp4","duration_seconds":5.0}]"#;
        let id = create_merge(&db, "episode_4", segments, "t-4").await.unwrap();

        let row = get_merge(&db, id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Pending);
        assert_eq!(row.segments, segments);

        mark_merge_processing(&db, id).await.unwrap();
        complete_merge(&db, id, "videos/merged/merged_x.mp4", 12.0).await.unwrap();
        let row = get_merge(&db, id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Completed);
        assert_eq!(row.merged_path.as_deref(), Some("videos/merged/merged_x.mp4"));
        assert_eq!(row.duration_seconds, Some(12.0));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn merge_failure_is_terminal() {
        let (db, _dir) = setup_db().await;
        let id = create_merge(&db, "episode_5", "[]", "t-5").await.unwrap();
        fail_merge(&db, id, "no segment could be resolved to playable media")
            .await
            .unwrap();
        let row = get_merge(&db, id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Failed);

        complete_merge(&db, id, "videos/merged/late.mp4", 1.0).await.unwrap();
        let row = get_merge(&db, id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Failed);
        assert!(row.merged_path.is_none());

        db.close().await.unwrap();
    }
}
