//! Per-item extraction state machine
//!
//! [`ItemPipeline::run`] drives one URL through
//! `Fetching → Reducing → Extracting → Validating → Done`. Any stage error moves
//! the item to `Failed` and skips the remaining stages, so a failed fetch or
//! reduce never reaches a model.
//!
//! Each stage call is timed from before its first attempt until its final
//! result, so stage durations include retries, backoff sleeps and the fetch
//! pacing delay. Stage errors are recorded as [`ErrorInfo`] and never escape
//! [`ItemPipeline::run`].

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Config, RetryConfig};
use crate::error::{ErrorInfo, Result, StageFailure};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::llm::{ChatClient, Extractor, LlmExtractor, LlmJudge, Validator};
use crate::reducer::{HtmlReducer, Reducer};
use crate::retry::{IsRetryable, with_retry};
use crate::types::{Item, ItemState, Stage};

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

/// States of the item state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Fetching,
    Reducing,
    Extracting,
    Validating,
    Done,
    Failed,
}

/// Result of one stage call under the retry policy
struct StageRun<T> {
    result: std::result::Result<T, ErrorInfo>,
    attempts: u32,
    elapsed: Duration,
}

/// Runs the four stages for one item
///
/// Cheap to share: the collaborators sit behind `Arc`s, and one pipeline
/// serves every worker of a batch.
#[derive(Clone)]
pub struct ItemPipeline {
    fetcher: Arc<dyn Fetcher>,
    reducer: Arc<dyn Reducer>,
    extractor: Arc<dyn Extractor>,
    validator: Arc<dyn Validator>,
    retry: RetryConfig,
}

impl ItemPipeline {
    /// Assemble a pipeline from explicit collaborators
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        reducer: Arc<dyn Reducer>,
        extractor: Arc<dyn Extractor>,
        validator: Arc<dyn Validator>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            fetcher,
            reducer,
            extractor,
            validator,
            retry,
        }
    }

    /// Assemble the default pipeline: HTTP fetcher, HTML reducer and the
    /// chat-model extractor and judge
    ///
    /// The model API key is read from the environment variable named by
    /// `config.models.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        let chat = ChatClient::from_env(&config.models, config.pricing.clone())?;
        Ok(Self::new(
            Arc::new(HttpFetcher::new(&config.fetch)?),
            Arc::new(HtmlReducer::new(&config.reduce)),
            Arc::new(LlmExtractor::new(chat.clone(), &config.models)),
            Arc::new(LlmJudge::new(chat, &config.models)),
            config.retry.clone(),
        ))
    }

    /// Retry policy applied to every stage
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Run one item to a terminal state
    ///
    /// Never fails: every stage error ends up in [`ItemState::error`].
    pub async fn run(&self, item: Item) -> ItemState {
        let mut state = ItemState::new(item);
        let mut phase = Phase::Fetching;

        tracing::debug!(index = state.index(), url = %state.url(), "Processing item");

        loop {
            phase = match phase {
                Phase::Fetching => {
                    let url = state.item.url.clone();
                    let run = self
                        .stage(Stage::Fetch, || self.fetcher.fetch(&url))
                        .await;
                    match settle(&mut state, Stage::Fetch, run) {
                        Some(raw) => {
                            state.raw_content = Some(raw);
                            Phase::Reducing
                        }
                        None => Phase::Failed,
                    }
                }

                Phase::Reducing => {
                    let raw = state.raw_content.as_deref().unwrap_or_default();
                    let run = self
                        .stage(Stage::Reduce, || std::future::ready(self.reducer.reduce(raw)))
                        .await;
                    match settle(&mut state, Stage::Reduce, run) {
                        Some(text) => {
                            state.reduced_content = Some(text);
                            Phase::Extracting
                        }
                        None => Phase::Failed,
                    }
                }

                Phase::Extracting => {
                    let text = state.reduced_content.as_deref().unwrap_or_default();
                    let run = self
                        .stage(Stage::Extract, || self.extractor.extract(text))
                        .await;
                    match settle(&mut state, Stage::Extract, run) {
                        Some(output) => {
                            let mut record = output.value;
                            record.source_url = state.item.url.clone();
                            state.metrics.extraction_usage = output.usage;
                            state.record = Some(record);
                            Phase::Validating
                        }
                        None => Phase::Failed,
                    }
                }

                Phase::Validating => {
                    let text = state.reduced_content.as_deref().unwrap_or_default();
                    let Some(record) = state.record.as_ref() else {
                        // Extracting only advances with a record in place
                        state.error = Some(ErrorInfo {
                            stage: Stage::Validate,
                            kind: "missing_record".to_string(),
                            message: "no extracted record to validate".to_string(),
                            retriable: false,
                            attempts: 0,
                            status: None,
                        });
                        break;
                    };
                    let run = self
                        .stage(Stage::Validate, || self.validator.judge(text, record))
                        .await;
                    match settle(&mut state, Stage::Validate, run) {
                        Some(output) => {
                            state.metrics.validation_usage = output.usage;
                            state.verdicts = Some(output.value);
                            Phase::Done
                        }
                        None => {
                            // An unvalidated record is not a success
                            state.record = None;
                            Phase::Failed
                        }
                    }
                }

                Phase::Done | Phase::Failed => break,
            };
        }

        match &state.error {
            None => tracing::info!(
                index = state.index(),
                url = %state.url(),
                latency_ms = state.metrics.total_latency().as_millis() as u64,
                fields = state.record.as_ref().map(|r| r.populated_count()).unwrap_or(0),
                "Item done"
            ),
            Some(error) => tracing::warn!(
                index = state.index(),
                url = %state.url(),
                stage = %error.stage,
                kind = %error.kind,
                attempts = error.attempts,
                error = %error.message,
                "Item failed"
            ),
        }

        state
    }

    /// Run one stage call under the retry policy and time it
    async fn stage<T, E, F, Fut>(&self, stage: Stage, operation: F) -> StageRun<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: IsRetryable + StageFailure,
    {
        let start = Instant::now();
        let attempted = with_retry(&self.retry, operation).await;
        let elapsed = start.elapsed();

        let result = attempted.result.map_err(|e| {
            ErrorInfo::from_stage_error(stage, &e, e.is_retryable(), attempted.attempts)
        });

        StageRun {
            result,
            attempts: attempted.attempts,
            elapsed,
        }
    }
}

impl std::fmt::Debug for ItemPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemPipeline")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Record a stage run on the item and return its value on success
fn settle<T>(state: &mut ItemState, stage: Stage, run: StageRun<T>) -> Option<T> {
    state.metrics.stage_durations.insert(stage, run.elapsed);
    state.metrics.stage_attempts.insert(stage, run.attempts);
    state.item.attempt_count += run.attempts;

    match run.result {
        Ok(value) => {
            tracing::debug!(
                index = state.item.index,
                stage = %stage,
                attempts = run.attempts,
                elapsed_ms = run.elapsed.as_millis() as u64,
                "Stage succeeded"
            );
            Some(value)
        }
        Err(info) => {
            state.error = Some(info);
            None
        }
    }
}
