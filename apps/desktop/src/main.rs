use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, MissingMediaCapability, SeeFoodClient, SubmitOutcome, WorkflowController,
    WorkflowError,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Classify food photos against a SeeFood backend")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload an image and print the predicted label.
    Classify {
        path: PathBuf,
        /// Send this label back as a correction for the same image.
        #[arg(long)]
        correct: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List the foods known to the API.
    Foods {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let args = Args::parse();

    let settings = load_settings()?;
    let client = Arc::new(SeeFoodClient::from_settings(&settings)?);

    match args.command {
        Command::Classify {
            path,
            correct,
            json,
        } => {
            let workflow = WorkflowController::new(Arc::new(MissingMediaCapability), client)
                .with_camera_timeout(settings.camera_start_timeout);
            let staged = workflow.select_path(&path).await.map_err(user_facing)?;
            println!(
                "staged {} ({}, {} bytes, sha256 {})",
                staged.file_name, staged.mime_type, staged.size_bytes, staged.digest
            );

            let prediction = match workflow.submit().await.map_err(user_facing)? {
                SubmitOutcome::Shown(prediction) => prediction,
                SubmitOutcome::Skipped | SubmitOutcome::Superseded => {
                    bail!("no prediction was produced")
                }
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                println!(
                    "prediction: {} (confidence {})",
                    prediction.predicted_class, prediction.confidence
                );
            }

            if let Some(label) = correct {
                workflow.open_correction().await.map_err(user_facing)?;
                workflow
                    .set_correction_label(&label)
                    .await
                    .map_err(user_facing)?;
                let ack = workflow.submit_correction().await.map_err(user_facing)?;
                println!("{ack}");
            }
            workflow.reset().await;
        }
        Command::Foods { json } => {
            let foods = client.list_foods().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&foods)?);
            } else if foods.is_empty() {
                println!("no foods stored");
            } else {
                for food in foods {
                    println!(
                        "{}\t{}\t{}",
                        food.food_id,
                        food.name,
                        food.description.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }

    Ok(())
}

fn user_facing(err: WorkflowError) -> anyhow::Error {
    anyhow!(err.user_message())
}
