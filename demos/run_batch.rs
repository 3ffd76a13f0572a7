//! Batch extraction example
//!
//! Runs a list of profile URLs through the full pipeline and writes the
//! report files:
//! - Loading configuration (or using defaults)
//! - Loading the URL list from a JSON array
//! - Printing progress events
//! - Stopping cleanly on Ctrl+C
//! - Logging metrics and saving reports
//!
//! Usage:
//!
//! ```text
//! cargo run --example run_batch -- urls.json [config.json]
//! ```
//!
//! The model API key is read from the environment variable named by
//! `models.api_key_env` (default `GOOGLE_API_KEY`); a `.env` file is honored.

use profile_extract::{
    BatchRunner, Config, Event, ItemPipeline, ReportWriter, ShutdownSignal, aggregate, load_urls,
    run_with_shutdown,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let urls_path = args.next().unwrap_or_else(|| "urls.json".to_string());
    let config = match args.next() {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };

    let urls = load_urls(&urls_path)?;
    if urls.is_empty() {
        println!("No URLs in {}", urls_path);
        return Ok(());
    }

    let pipeline = ItemPipeline::from_config(&config)?;
    let runner = BatchRunner::new(pipeline, ShutdownSignal::new());

    // Print progress
    let mut events = runner.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::ItemFinished {
                    url,
                    succeeded,
                    completed,
                    total,
                    ..
                } => {
                    let mark = if succeeded { "✓" } else { "✗" };
                    println!("{} [{}/{}] {}", mark, completed, total, url);
                }
                Event::ShutdownObserved { dispatched } => {
                    println!("Stopping after {} dispatched items", dispatched);
                }
                _ => {}
            }
        }
    });

    let outcome = run_with_shutdown(&runner, &urls, config.batch.max_concurrency).await?;

    let metrics = aggregate(&outcome);
    metrics.log_summary();

    let paths = ReportWriter::new(&config.output).write(&outcome, &metrics)?;
    println!("Metrics written to {}", paths.metrics.display());
    if let Some(records) = paths.records {
        println!("Profiles written to {}", records.display());
    }
    if let Some(failures) = paths.failures {
        println!("Failures written to {}", failures.display());
    }

    Ok(())
}
