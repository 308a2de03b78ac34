// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ledger inspection command.

use clap::Args;
use reelflow_config::ReelflowConfig;
use reelflow_core::ReelflowError;

#[derive(Args, Debug)]
pub struct TaskArgs {
    /// Task id to show.
    id: Option<String>,
    /// List all tasks for a resource instead.
    #[arg(long, conflicts_with = "id")]
    resource: Option<String>,
}

pub async fn run(config: &ReelflowConfig, args: &TaskArgs) -> Result<(), ReelflowError> {
    let pipeline = crate::open_pipeline(config).await?;
    match (&args.id, &args.resource) {
        (Some(id), _) => match pipeline.task(id).await? {
            Some(task) => {
                println!("{}", serde_json::to_string_pretty(&task).unwrap_or_default());
            }
            None => {
                eprintln!("no task with id {id}");
                std::process::exit(1);
            }
        },
        (None, Some(resource)) => {
            let tasks = pipeline.tasks_for_resource(resource).await?;
            println!("{}", serde_json::to_string_pretty(&tasks).unwrap_or_default());
        }
        (None, None) => {
            return Err(ReelflowError::Config(
                "pass a task id or --resource".to_string(),
            ));
        }
    }
    Ok(())
}
