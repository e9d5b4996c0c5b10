mod extract;
mod fetch;
mod generate;
mod model;
mod pipeline;
mod progress;
mod settings;
mod store;

use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::info;

use fetch::HttpSource;
use generate::{ContentGenerator, OllamaBackend};
use pipeline::Pipeline;
use progress::BarProgress;
use settings::Settings;
use store::RecordStore;

#[derive(Parser)]
#[command(
    name = "staff_directory",
    about = "Scrape the staff directory and add generated haiku and summaries"
)]
struct Cli {
    /// Defaults to `run` when omitted
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync the directory, then generate content
    Run,
    /// Fetch the directory and any people not cached yet
    Sync,
    /// Generate haiku and summaries for synced people
    Enrich,
    /// Show what is stored on disk
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    info!(
        source = %settings.source_url,
        model = %settings.model_id,
        root = %settings.storage_root.display(),
        "Loaded settings"
    );

    let store = RecordStore::new(&settings.storage_root);
    let mut progress = BarProgress::new();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Stats => {
            pipeline::store_stats(&store)?.print();
            return Ok(());
        }
        command => {
            let generator = ContentGenerator::new(
                OllamaBackend::new(&settings.backend_url),
                settings.model_id.clone(),
                settings.max_attempts,
                settings.backoff(),
            );
            let pipeline = Pipeline::new(HttpSource::new()?, store, generator, &settings);

            match command {
                Commands::Sync => pipeline.sync_directory(&mut progress).await?.print(),
                Commands::Enrich => pipeline.enrich(&mut progress).await?.print(),
                _ => {
                    let (synced, enriched) = pipeline.run(&mut progress).await?;
                    synced.print();
                    enriched.print();
                }
            }
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
