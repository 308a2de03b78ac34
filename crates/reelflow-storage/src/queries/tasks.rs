// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task ledger operations.
//!
//! The ledger is the only channel through which callers observe the progress
//! and outcome of long-running generation work. Transitions are forward-only:
//! every mutating statement carries a `status NOT IN ('completed','failed')`
//! guard, so writes against a terminal task are ignored rather than applied.

use reelflow_core::{now_iso, ReelflowError, Task, TaskStatus};
use rusqlite::params;
use tracing::info;

use crate::database::Database;

fn map_task_row(row: &rusqlite::Row<'_>) -> Result<Task, rusqlite::Error> {
    let status_raw: String = row.get(2)?;
    let status: TaskStatus = status_raw.parse().map_err(|e: strum::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let result_raw: Option<String> = row.get(6)?;
    let result = result_raw.map(|raw| {
        serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
    });
    Ok(Task {
        id: row.get(0)?,
        kind: row.get(1)?,
        status,
        progress: row.get(3)?,
        message: row.get(4)?,
        resource_id: row.get(5)?,
        result,
        error: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

const TASK_COLUMNS: &str = "id, kind, status, progress, message, resource_id, result, error,
                            created_at, updated_at, completed_at";

/// Create a new pending task and return it.
pub async fn create(db: &Database, kind: &str, resource_id: &str) -> Result<Task, ReelflowError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_iso();
    let task = Task {
        id: id.clone(),
        kind: kind.to_string(),
        status: TaskStatus::Pending,
        progress: 0,
        message: String::new(),
        resource_id: resource_id.to_string(),
        result: None,
        error: None,
        created_at: now.clone(),
        updated_at: now.clone(),
        completed_at: None,
    };
    let insert = task.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO tasks (id, kind, status, progress, message, resource_id, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', 0, '', ?3, ?4, ?4)",
                params![insert.id, insert.kind, insert.resource_id, insert.created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    info!(task_id = %task.id, kind, resource_id, "task created");
    Ok(task)
}

/// Get a task by id. Soft-deleted rows are invisible.
pub async fn get(db: &Database, id: &str) -> Result<Option<Task>, ReelflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND deleted_at IS NULL"
            ))?;
            let result = stmt.query_row(params![id], map_task_row);
            match result {
                Ok(task) => Ok(Some(task)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List tasks for a resource, newest first.
pub async fn list_for_resource(
    db: &Database,
    resource_id: &str,
) -> Result<Vec<Task>, ReelflowError> {
    let resource_id = resource_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE resource_id = ?1 AND deleted_at IS NULL
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map(params![resource_id], map_task_row)?;
            let mut tasks = Vec::new();
            for row in rows {
                tasks.push(row?);
            }
            Ok(tasks)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update status, progress, and message on a non-terminal task.
///
/// Terminal statuses stamp `completed_at` exactly once. Returns `false` when
/// the task was already terminal (or missing) and the write was ignored.
pub async fn set_status(
    db: &Database,
    id: &str,
    status: TaskStatus,
    progress: i64,
    message: &str,
) -> Result<bool, ReelflowError> {
    let id = id.to_string();
    let status_str = status.to_string();
    let message = message.to_string();
    let now = now_iso();
    let terminal = status.is_terminal();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE tasks SET status = ?2, progress = ?3, message = ?4, updated_at = ?5,
                 completed_at = CASE WHEN ?6 THEN ?5 ELSE completed_at END
                 WHERE id = ?1 AND deleted_at IS NULL
                   AND status NOT IN ('completed','failed')",
                params![id, status_str, progress, message, now, terminal],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a successful outcome: status completed, progress 100.
///
/// Ignored when the task is already terminal.
pub async fn set_result(
    db: &Database,
    id: &str,
    result: &serde_json::Value,
) -> Result<bool, ReelflowError> {
    let id = id.to_string();
    let result_str = result.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE tasks SET status = 'completed', progress = 100, result = ?2,
                 completed_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND deleted_at IS NULL
                   AND status NOT IN ('completed','failed')",
                params![id, result_str, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a failure: status failed, error message kept verbatim, progress
/// left where it was.
///
/// Ignored when the task is already terminal.
pub async fn set_error(db: &Database, id: &str, message: &str) -> Result<bool, ReelflowError> {
    let id = id.to_string();
    let message = message.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE tasks SET status = 'failed', error = ?2, completed_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND deleted_at IS NULL
                   AND status NOT IN ('completed','failed')",
                params![id, message, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("tasks_test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let (db, _dir) = setup_db().await;

        let task = create(&db, "image_generation", "episode-7").await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert!(task.completed_at.is_none());

        let fetched = get(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, task.id);
        assert_eq!(fetched.kind, "image_generation");
        assert_eq!(fetched.resource_id, "episode-7");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_unknown_id_is_none() {
        let (db, _dir) = setup_db().await;
        assert!(get(&db, "nope").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn full_success_lifecycle() {
        let (db, _dir) = setup_db().await;
        let task = create(&db, "video_generation", "shot-3").await.unwrap();

        assert!(set_status(&db, &task.id, TaskStatus::Processing, 10, "submitting")
            .await
            .unwrap());
        let mid = get(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(mid.status, TaskStatus::Processing);
        assert_eq!(mid.progress, 10);
        assert_eq!(mid.message, "submitting");
        assert!(mid.completed_at.is_none());

        assert!(set_result(&db, &task.id, &json!({"video_url": "videos/a.mp4"}))
            .await
            .unwrap());
        let done = get(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.result.unwrap()["video_url"], "videos/a.mp4");
        assert!(done.completed_at.is_some());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failure_keeps_error_verbatim_and_freezes_progress() {
        let (db, _dir) = setup_db().await;
        let task = create(&db, "image_generation", "shot-1").await.unwrap();
        set_status(&db, &task.id, TaskStatus::Processing, 40, "polling")
            .await
            .unwrap();

        assert!(set_error(&db, &task.id, "provider error: quota exceeded")
            .await
            .unwrap());
        let failed = get(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("provider error: quota exceeded"));
        assert_eq!(failed.progress, 40);
        assert!(failed.completed_at.is_some());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn terminal_tasks_ignore_further_writes() {
        let (db, _dir) = setup_db().await;
        let task = create(&db, "merge", "episode-1").await.unwrap();
        set_result(&db, &task.id, &json!({"ok": true})).await.unwrap();
        let completed_at = get(&db, &task.id).await.unwrap().unwrap().completed_at;

        // None of these may regress a completed task.
        assert!(!set_status(&db, &task.id, TaskStatus::Pending, 0, "")
            .await
            .unwrap());
        assert!(!set_status(&db, &task.id, TaskStatus::Processing, 50, "again")
            .await
            .unwrap());
        assert!(!set_error(&db, &task.id, "late failure").await.unwrap());
        assert!(!set_result(&db, &task.id, &json!({"ok": false})).await.unwrap());

        let after = get(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Completed);
        assert_eq!(after.result.unwrap()["ok"], true);
        assert!(after.error.is_none());
        // completed_at was written exactly once.
        assert_eq!(after.completed_at, completed_at);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_is_also_terminal() {
        let (db, _dir) = setup_db().await;
        let task = create(&db, "merge", "episode-2").await.unwrap();
        set_error(&db, &task.id, "no segments").await.unwrap();

        assert!(!set_result(&db, &task.id, &json!({"late": true})).await.unwrap());
        let after = get(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Failed);
        assert!(after.result.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_for_resource_newest_first() {
        let (db, _dir) = setup_db().await;
        let a = create(&db, "image_generation", "episode-9").await.unwrap();
        let b = create(&db, "video_generation", "episode-9").await.unwrap();
        create(&db, "merge", "other").await.unwrap();

        let tasks = list_for_resource(&db, "episode-9").await.unwrap();
        assert_eq!(tasks.len(), 2);
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert!(ids.contains(&a.id.as_str()));
        assert!(ids.contains(&b.id.as_str()));

        db.close().await.unwrap();
    }
}
