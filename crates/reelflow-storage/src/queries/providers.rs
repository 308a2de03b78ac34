// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider configuration queries.
//!
//! Listings reconcile the "single default per capability" invariant at read
//! time: when several `is_default` rows exist, the highest-priority (then
//! lowest-id) row keeps the flag and the rest are cleared. Mutation beyond
//! that belongs to an external CRUD surface; the insert/remove helpers here
//! exist for the CLI and tests.

use reelflow_core::provider::{default_endpoints, models_from_json, models_to_json};
use reelflow_core::{now_iso, Capability, ProviderConfig, ReelflowError};
use rusqlite::params;
use tracing::info;

use crate::database::Database;

/// Input for a new provider configuration row.
#[derive(Debug, Clone)]
pub struct NewProviderConfig {
    pub capability: Capability,
    pub provider: String,
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub models: Vec<String>,
    pub default_model: Option<String>,
    pub endpoint: Option<String>,
    pub query_endpoint: Option<String>,
    pub priority: i64,
    pub is_default: bool,
}

fn map_config_row(row: &rusqlite::Row<'_>) -> Result<ProviderConfig, rusqlite::Error> {
    let capability_raw: String = row.get(1)?;
    let capability: Capability = capability_raw.parse().map_err(|e: strum::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let models_raw: String = row.get(6)?;
    Ok(ProviderConfig {
        id: row.get(0)?,
        capability,
        provider: row.get(2)?,
        name: row.get(3)?,
        base_url: row.get(4)?,
        api_key: row.get(5)?,
        models: models_from_json(&models_raw),
        default_model: row.get(7)?,
        endpoint: row.get(8)?,
        query_endpoint: row.get(9)?,
        priority: row.get(10)?,
        is_default: row.get::<_, i64>(11)? != 0,
        is_active: row.get::<_, i64>(12)? != 0,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

const CONFIG_COLUMNS: &str = "id, capability, provider, name, base_url, api_key, models,
                              default_model, endpoint, query_endpoint, priority, is_default,
                              is_active, created_at, updated_at";

/// Collapse duplicate defaults: per capability, keep the highest-priority
/// (then lowest-id) `is_default` row and clear the flag on the rest.
fn reconcile_defaults_in(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    for capability in [
        Capability::Text,
        Capability::Image,
        Capability::StoryboardImage,
        Capability::Video,
    ] {
        let cap = capability.to_string();
        let mut stmt = conn.prepare(
            "SELECT id FROM provider_configs
             WHERE deleted_at IS NULL AND capability = ?1 AND is_default = 1
             ORDER BY priority DESC, id ASC",
        )?;
        let ids: Vec<i64> = stmt
            .query_map(params![cap], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        if ids.len() <= 1 {
            continue;
        }
        conn.execute(
            "UPDATE provider_configs SET is_default = 0
             WHERE deleted_at IS NULL AND capability = ?1 AND id != ?2",
            params![cap, ids[0]],
        )?;
    }
    Ok(())
}

/// List configurations, reconciled, ordered by
/// `is_default DESC, priority DESC, created_at DESC`.
pub async fn list_configs(
    db: &Database,
    capability: Option<Capability>,
) -> Result<Vec<ProviderConfig>, ReelflowError> {
    let cap = capability.map(|c| c.to_string());
    db.connection()
        .call(move |conn| {
            reconcile_defaults_in(conn)?;
            let order = "ORDER BY is_default DESC, priority DESC, created_at DESC";
            let mut configs = Vec::new();
            match &cap {
                Some(cap) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {CONFIG_COLUMNS} FROM provider_configs
                         WHERE deleted_at IS NULL AND capability = ?1 {order}"
                    ))?;
                    let rows = stmt.query_map(params![cap], map_config_row)?;
                    for row in rows {
                        configs.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {CONFIG_COLUMNS} FROM provider_configs
                         WHERE deleted_at IS NULL {order}"
                    ))?;
                    let rows = stmt.query_map([], map_config_row)?;
                    for row in rows {
                        configs.push(row?);
                    }
                }
            }
            Ok(configs)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List configurations for a generation capability. Storyboard-image
/// requests fall back to plain image configurations when no dedicated row
/// exists.
pub async fn list_for_generation(
    db: &Database,
    capability: Capability,
) -> Result<Vec<ProviderConfig>, ReelflowError> {
    let configs = list_configs(db, Some(capability)).await?;
    if configs.is_empty() && capability == Capability::StoryboardImage {
        return list_configs(db, Some(Capability::Image)).await;
    }
    Ok(configs)
}

/// Get a configuration by id.
pub async fn get(db: &Database, id: i64) -> Result<Option<ProviderConfig>, ReelflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONFIG_COLUMNS} FROM provider_configs
                 WHERE id = ?1 AND deleted_at IS NULL"
            ))?;
            let result = stmt.query_row(params![id], map_config_row);
            match result {
                Ok(config) => Ok(Some(config)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert a configuration. Blank endpoints receive the provider family's
/// defaults; setting `is_default` clears the flag on sibling rows.
pub async fn insert(
    db: &Database,
    new: NewProviderConfig,
) -> Result<ProviderConfig, ReelflowError> {
    let now = now_iso();
    let (default_ep, default_query_ep) = default_endpoints(&new.provider, new.capability);
    let endpoint = new
        .endpoint
        .filter(|e| !e.trim().is_empty())
        .unwrap_or(default_ep);
    let query_endpoint = new
        .query_endpoint
        .filter(|e| !e.trim().is_empty())
        .unwrap_or(default_query_ep);
    let models = models_to_json(&new.models);
    let cap = new.capability.to_string();
    let provider = new.provider.clone();
    let is_default = new.is_default;

    let id = db
        .connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO provider_configs
                 (capability, provider, name, base_url, api_key, models, default_model,
                  endpoint, query_endpoint, priority, is_default, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12, ?12)",
                params![
                    cap,
                    new.provider,
                    new.name,
                    new.base_url,
                    new.api_key,
                    models,
                    new.default_model,
                    endpoint,
                    query_endpoint,
                    new.priority,
                    is_default as i64,
                    now,
                ],
            )?;
            let id = conn.last_insert_rowid();
            if is_default {
                conn.execute(
                    "UPDATE provider_configs SET is_default = 0
                     WHERE deleted_at IS NULL AND capability = ?1 AND id != ?2",
                    params![cap, id],
                )?;
            }
            Ok(id)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    info!(config_id = id, provider, "provider config created");
    get(db, id).await?.ok_or_else(|| {
        ReelflowError::Internal("provider config vanished after insert".to_string())
    })
}

/// Toggle a configuration's active flag.
pub async fn set_active(db: &Database, id: i64, active: bool) -> Result<bool, ReelflowError> {
    let now = now_iso();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE provider_configs SET is_active = ?2, updated_at = ?3
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![id, active as i64, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Soft-delete a configuration.
pub async fn remove(db: &Database, id: i64) -> Result<bool, ReelflowError> {
    let now = now_iso();
    let removed = db
        .connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE provider_configs SET deleted_at = ?2
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![id, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    if removed {
        info!(config_id = id, "provider config deleted");
    }
    Ok(removed)
}
