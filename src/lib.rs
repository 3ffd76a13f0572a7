//! # profile-extract
//!
//! Batch extraction of structured profile records from web pages.
//!
//! Each URL moves through a fixed chain of stages:
//!
//! 1. **Fetch** - download the page (paced, with timeout)
//! 2. **Reduce** - strip boilerplate HTML down to visible main-content text
//! 3. **Extract** - ask a language model for a [`Record`](types::Record)
//! 4. **Validate** - ask a second model call to judge every field
//!
//! A [`BatchRunner`] runs many items concurrently under a fixed worker limit,
//! retries transient stage failures, honors a cooperative [`ShutdownSignal`]
//! and returns terminal states in input order. [`aggregate`] turns the
//! outcome into [`BatchMetrics`], and [`ReportWriter`] writes everything to
//! disk.
//!
//! ## Quick Start
//!
//! ```no_run
//! use profile_extract::{BatchRunner, Config, ItemPipeline, ShutdownSignal, aggregate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let pipeline = ItemPipeline::from_config(&config)?;
//!     let runner = BatchRunner::new(pipeline, ShutdownSignal::new());
//!
//!     // Subscribe to progress events
//!     let mut events = runner.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let urls = vec!["https://example.edu/people/jdoe".to_string()];
//!     let outcome = runner.run(&urls, config.batch.max_concurrency).await?;
//!     aggregate(&outcome).log_summary();
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Batch driver
pub mod batch;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Page fetching
pub mod fetcher;
/// Model-backed extraction and validation
pub mod llm;
/// Batch metrics
pub mod metrics;
/// Per-item stage pipeline
pub mod pipeline;
/// HTML reduction
pub mod reducer;
/// Report files
pub mod report;
/// Retry logic with exponential backoff
pub mod retry;
/// Cooperative shutdown
pub mod shutdown;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use batch::{BatchRunner, load_urls};
pub use config::{Config, ModelConfig, OutputConfig, PricingTable, RetryConfig};
pub use error::{Error, ErrorInfo, FetchError, ModelError, ReduceError, Result};
pub use fetcher::{Fetcher, HttpFetcher};
pub use llm::{ChatClient, Extractor, LlmExtractor, LlmJudge, ModelOutput, Validator};
pub use metrics::{BatchMetrics, Metric, aggregate};
pub use pipeline::ItemPipeline;
pub use reducer::{HtmlReducer, Reducer};
pub use report::{ReportPaths, ReportWriter};
pub use shutdown::ShutdownSignal;
pub use types::{
    BatchOutcome, Event, FieldName, FieldStatus, Item, ItemState, ItemStatus, Record, Stage,
    TokenUsage, VerdictSet,
};

/// Run a batch with graceful OS signal handling.
///
/// Installs a SIGINT/SIGTERM listener on the runner's [`ShutdownSignal`] for
/// the duration of the batch: the first signal stops dispatch and lets
/// in-flight items finish. The listener is removed when the batch returns.
///
/// # Example
///
/// ```no_run
/// use profile_extract::{BatchRunner, Config, ItemPipeline, ShutdownSignal, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let runner = BatchRunner::new(ItemPipeline::from_config(&config)?, ShutdownSignal::new());
///     let urls = vec!["https://example.edu/people/jdoe".to_string()];
///
///     let outcome = run_with_shutdown(&runner, &urls, config.batch.max_concurrency).await?;
///     println!("interrupted: {}", outcome.interrupted);
///
///     Ok(())
/// }
/// ```
///
/// # Errors
///
/// Same as [`BatchRunner::run`].
pub async fn run_with_shutdown(
    runner: &BatchRunner,
    urls: &[String],
    max_concurrency: usize,
) -> Result<BatchOutcome> {
    let _listener = runner.shutdown_signal().listen_for_os_signals();
    runner.run(urls, max_concurrency).await
}
