use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use storage::Storage;
use tracing::info;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/seefood.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    AddFood {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    ListFoods,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open '{}'", cli.database_url))?;

    match cli.command {
        Command::AddFood { name, description } => {
            let food_id = storage.insert_food(&name, description.as_deref()).await?;
            info!(food_id = food_id.0, %name, "tools: food stored");
            println!("stored food_id={food_id}");
        }
        Command::ListFoods => {
            for food in storage.list_foods().await? {
                println!("{}\t{}\t{}", food.food_id, food.name, food.created_at);
            }
        }
    }

    storage.close().await;
    Ok(())
}
