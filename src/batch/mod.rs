//! Batch driver
//!
//! [`BatchRunner::run`] fans a URL list out over a semaphore-bounded set of
//! spawned workers, each running the [`ItemPipeline`] for one item, and fans
//! the terminal states back in input order.
//!
//! Shutdown is cooperative. The driver checks the [`ShutdownSignal`] before
//! dispatching each item (and while waiting for a free worker slot); once it
//! is set no further item starts, in-flight items run to completion and the
//! outcome is marked `interrupted`.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{Semaphore, broadcast};

use crate::error::{Error, Result};
use crate::pipeline::ItemPipeline;
use crate::shutdown::ShutdownSignal;
use crate::types::{BatchOutcome, Event, Item, ItemState};

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

/// Capacity of the progress event channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Outcome of one worker task
type WorkerResult = std::result::Result<ItemState, String>;

/// Runs batches of URLs through an [`ItemPipeline`]
#[derive(Clone)]
pub struct BatchRunner {
    pipeline: Arc<ItemPipeline>,
    shutdown: ShutdownSignal,
    event_tx: broadcast::Sender<Event>,
    completed: Arc<AtomicUsize>,
}

impl BatchRunner {
    /// Create a runner
    pub fn new(pipeline: ItemPipeline, shutdown: ShutdownSignal) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            pipeline: Arc::new(pipeline),
            shutdown,
            event_tx,
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribe to progress events
    ///
    /// Events are a side channel: a slow subscriber lags and loses events,
    /// it never slows the batch down.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The shutdown signal observed by this runner
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Items completed in the current (or last) batch
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Run every URL through the pipeline with at most `max_concurrency`
    /// items in flight
    ///
    /// Item failures are recorded in the outcome, never returned as errors.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `max_concurrency` is 0
    /// - [`Error::WorkerPool`] if no worker slot can be acquired
    /// - [`Error::WorkerPanicked`] if a worker task panicked
    ///
    /// Driver faults are returned only after every dispatched item drained.
    pub async fn run(&self, urls: &[String], max_concurrency: usize) -> Result<BatchOutcome> {
        if max_concurrency == 0 {
            return Err(Error::config(
                "batch.max_concurrency",
                "max_concurrency must be at least 1",
            ));
        }

        let total = urls.len();
        let started_at = chrono::Utc::now();
        let start = Instant::now();
        self.completed.store(0, Ordering::SeqCst);

        tracing::info!(total, max_concurrency, "Starting batch");
        self.emit(Event::BatchStarted { total });

        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let faulted = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(total);
        let mut interrupted = false;
        let mut pool_error = None;

        for (index, url) in urls.iter().enumerate() {
            if self.shutdown.is_requested() {
                interrupted = true;
                break;
            }
            if faulted.load(Ordering::SeqCst) {
                tracing::error!(index, "Worker fault detected, stopping dispatch");
                break;
            }

            // Wait for a free slot, but stop waiting as soon as shutdown is requested
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.requested() => {
                    interrupted = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        tracing::error!(error = %e, "Worker pool closed");
                        pool_error = Some(Error::WorkerPool(e.to_string()));
                        break;
                    }
                },
            };

            // A worker may have panicked while we waited; its freed slot is not a go-ahead
            if faulted.load(Ordering::SeqCst) {
                tracing::error!(index, "Worker fault detected, stopping dispatch");
                drop(permit);
                break;
            }

            self.emit(Event::ItemStarted {
                index,
                url: url.clone(),
            });

            let pipeline = Arc::clone(&self.pipeline);
            let runner = self.clone();
            let faulted = Arc::clone(&faulted);
            let item = Item::new(index, url.clone());

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let url = item.url.clone();

                let result: WorkerResult = match AssertUnwindSafe(pipeline.run(item))
                    .catch_unwind()
                    .await
                {
                    Ok(state) => Ok(state),
                    Err(panic) => {
                        faulted.store(true, Ordering::SeqCst);
                        Err(panic_message(panic.as_ref()))
                    }
                };

                let completed = runner.completed.fetch_add(1, Ordering::SeqCst) + 1;
                runner.emit(Event::ItemFinished {
                    index,
                    url,
                    succeeded: result.as_ref().is_ok_and(|s| s.is_done()),
                    completed,
                    total,
                });
                result
            });

            workers.push((index, url.clone(), handle));
        }

        if interrupted {
            tracing::warn!(
                dispatched = workers.len(),
                skipped = total - workers.len(),
                "Shutdown requested, waiting for in-flight items"
            );
            self.emit(Event::ShutdownObserved {
                dispatched: workers.len(),
            });
        }

        // Workers were pushed in index order, so draining in order keeps input order
        let mut items = Vec::with_capacity(workers.len());
        let mut fault = pool_error;
        for (index, url, handle) in workers {
            let reason = match handle.await {
                Ok(Ok(state)) => {
                    items.push(state);
                    continue;
                }
                Ok(Err(reason)) => reason,
                Err(join_error) => join_error.to_string(),
            };
            tracing::error!(index, url = %url, reason = %reason, "Worker failed");
            if fault.is_none() {
                fault = Some(Error::WorkerPanicked { index, url, reason });
            }
        }

        let wall_clock = start.elapsed();
        let completed = self.completed();
        self.emit(Event::BatchFinished {
            completed,
            interrupted,
        });

        if let Some(error) = fault {
            return Err(error);
        }

        let outcome = BatchOutcome {
            items,
            interrupted,
            total_urls: total,
            started_at,
            wall_clock,
        };

        tracing::info!(
            processed = outcome.len(),
            succeeded = outcome.successes().count(),
            failed = outcome.failures().count(),
            interrupted,
            wall_clock_ms = wall_clock.as_millis() as u64,
            "Batch finished"
        );

        Ok(outcome)
    }
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("pipeline", &self.pipeline)
            .field("shutdown_requested", &self.shutdown.is_requested())
            .field("completed", &self.completed())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Load the input URL list from a JSON array of strings
///
/// Entries are trimmed and blank entries skipped. Entries are not validated
/// as URLs here; an invalid URL fails its item at the fetch stage.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read, or [`Error::Config`] if
/// it is not a JSON array of strings.
pub fn load_urls(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&contents).map_err(|e| Error::Config {
        message: format!("failed to parse {}: {}", path.display(), e),
        key: None,
    })?;

    let entries = value.as_array().ok_or_else(|| Error::Config {
        message: format!("{} must contain a JSON array of URLs", path.display()),
        key: None,
    })?;

    let mut urls = Vec::with_capacity(entries.len());
    for (position, entry) in entries.iter().enumerate() {
        let url = entry.as_str().ok_or_else(|| Error::Config {
            message: format!(
                "entry {} in {} is not a string: {}",
                position,
                path.display(),
                entry
            ),
            key: None,
        })?;
        let url = url.trim();
        if url.is_empty() {
            tracing::warn!(position, "Skipping blank URL entry");
            continue;
        }
        urls.push(url.to_string());
    }

    tracing::info!(count = urls.len(), path = %path.display(), "Loaded URLs");
    Ok(urls)
}
