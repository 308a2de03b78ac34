// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider configuration management.

use std::str::FromStr;

use clap::{Args, Subcommand};
use reelflow_config::ReelflowConfig;
use reelflow_core::{Capability, ProviderConfig, ReelflowError};
use reelflow_storage::queries::providers;

#[derive(Subcommand, Debug)]
pub enum ProvidersCommand {
    /// List configurations, optionally for one capability.
    List {
        /// text | image | storyboard_image | video
        #[arg(long)]
        capability: Option<String>,
    },
    /// Add a configuration.
    Add(AddArgs),
    /// Soft-delete a configuration.
    Remove { id: i64 },
    /// Re-enable a configuration.
    Enable { id: i64 },
    /// Disable a configuration without deleting it.
    Disable { id: i64 },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// text | image | storyboard_image | video
    #[arg(long)]
    capability: String,
    /// Provider family: openai, dashscope, qwen_image, nano_banana, volces, ...
    #[arg(long)]
    provider: String,
    /// Display name.
    #[arg(long)]
    name: String,
    #[arg(long)]
    base_url: String,
    #[arg(long)]
    api_key: String,
    /// Comma-separated model identifiers.
    #[arg(long, default_value = "")]
    models: String,
    #[arg(long)]
    default_model: Option<String>,
    /// Submit endpoint override (provider defaults apply when omitted).
    #[arg(long)]
    endpoint: Option<String>,
    /// Poll endpoint override, `{taskId}` substituted.
    #[arg(long)]
    query_endpoint: Option<String>,
    #[arg(long, default_value_t = 0)]
    priority: i64,
    /// Make this the capability's default configuration.
    #[arg(long, default_value_t = false)]
    default: bool,
}

fn parse_capability(raw: &str) -> Result<Capability, ReelflowError> {
    Capability::from_str(raw).map_err(|_| {
        ReelflowError::Config(format!(
            "unknown capability '{raw}' (expected text, image, storyboard_image, or video)"
        ))
    })
}

fn print_config(config: &ProviderConfig) {
    let masked_key = if config.api_key.chars().count() > 8 {
        let head: String = config.api_key.chars().take(8).collect();
        format!("{head}...")
    } else {
        "(set)".to_string()
    };
    println!(
        "  [{}] {} {} provider={} base={} key={} models={:?} priority={}{}{}",
        config.id,
        config.capability,
        config.name,
        config.provider,
        config.base_url,
        masked_key,
        config.models,
        config.priority,
        if config.is_default { " default" } else { "" },
        if config.is_active { "" } else { " (inactive)" },
    );
}

pub async fn run(config: &ReelflowConfig, command: &ProvidersCommand) -> Result<(), ReelflowError> {
    let pipeline = crate::open_pipeline(config).await?;
    let db = pipeline.database();

    match command {
        ProvidersCommand::List { capability } => {
            let capability = capability.as_deref().map(parse_capability).transpose()?;
            let configs = providers::list_configs(db, capability).await?;
            if configs.is_empty() {
                println!("no provider configurations");
            }
            for config in &configs {
                print_config(config);
            }
        }
        ProvidersCommand::Add(args) => {
            let capability = parse_capability(&args.capability)?;
            let models: Vec<String> = args
                .models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            let created = providers::insert(
                db,
                providers::NewProviderConfig {
                    capability,
                    provider: args.provider.clone(),
                    name: args.name.clone(),
                    base_url: args.base_url.clone(),
                    api_key: args.api_key.clone(),
                    models,
                    default_model: args.default_model.clone(),
                    endpoint: args.endpoint.clone(),
                    query_endpoint: args.query_endpoint.clone(),
                    priority: args.priority,
                    is_default: args.default,
                },
            )
            .await?;
            println!("created:");
            print_config(&created);
        }
        ProvidersCommand::Remove { id } => {
            if providers::remove(db, *id).await? {
                println!("removed config {id}");
            } else {
                println!("no config with id {id}");
            }
        }
        ProvidersCommand::Enable { id } => {
            if providers::set_active(db, *id, true).await? {
                println!("enabled config {id}");
            } else {
                println!("no config with id {id}");
            }
        }
        ProvidersCommand::Disable { id } => {
            if providers::set_active(db, *id, false).await? {
                println!("disabled config {id}");
            } else {
                println!("no config with id {id}");
            }
        }
    }
    Ok(())
}
