use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::pipeline::test_helpers::*;
use crate::reducer::HtmlReducer;
use crate::types::{FieldStatus, ItemStatus, Stage};

fn urls(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("https://example.edu/people/p{i}"))
        .collect()
}

fn runner_for(stages: &StubStages, shutdown: ShutdownSignal) -> BatchRunner {
    BatchRunner::new(stages.pipeline(fast_retry(3)), shutdown)
}

/// Requests shutdown when it starts fetching `trigger`
struct ShutdownOnFetch {
    inner: StubFetcher,
    trigger: String,
    signal: ShutdownSignal,
}

#[async_trait]
impl Fetcher for ShutdownOnFetch {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        if url == self.trigger {
            self.signal.request();
        }
        self.inner.fetch(url).await
    }
}

/// Panics on one URL
struct PanickingFetcher {
    inner: StubFetcher,
    poison: String,
}

#[async_trait]
impl Fetcher for PanickingFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        if url == self.poison {
            panic!("fetcher bug for {url}");
        }
        self.inner.fetch(url).await
    }
}

fn pipeline_with_fetcher(fetcher: Arc<dyn Fetcher>) -> ItemPipeline {
    let stages = StubStages::happy();
    ItemPipeline::new(
        fetcher,
        Arc::new(HtmlReducer::default()),
        stages.extractor.clone(),
        stages.validator.clone(),
        fast_retry(3),
    )
}

#[tokio::test]
async fn results_follow_input_order_not_completion_order() {
    let input = urls(4);
    let fetcher = StubFetcher::new()
        .with_url_delay(&input[0], Duration::from_millis(80))
        .with_url_delay(&input[1], Duration::from_millis(40))
        .with_url_delay(&input[2], Duration::from_millis(1))
        .with_url_delay(&input[3], Duration::from_millis(20));
    let stages = StubStages::new(
        fetcher,
        StubExtractor::new(sample_record(), None),
        StubValidator::all(FieldStatus::Correct),
    );

    let outcome = runner_for(&stages, ShutdownSignal::new())
        .run(&input, 4)
        .await
        .unwrap();

    let order: Vec<&str> = outcome.items.iter().map(|s| s.url()).collect();
    assert_eq!(order, input.iter().map(String::as_str).collect::<Vec<_>>());
    let indices: Vec<usize> = outcome.items.iter().map(|s| s.index()).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert!(!outcome.interrupted);
    assert_eq!(outcome.total_urls, 4);
}

#[tokio::test]
async fn never_exceeds_max_concurrency() {
    let stages = StubStages::new(
        StubFetcher::new().with_delay(Duration::from_millis(30)),
        StubExtractor::new(sample_record(), None),
        StubValidator::all(FieldStatus::Correct),
    );

    let outcome = runner_for(&stages, ShutdownSignal::new())
        .run(&urls(8), 2)
        .await
        .unwrap();

    assert_eq!(outcome.len(), 8);
    let peak = stages.fetcher.peak_in_flight();
    assert!(peak <= 2, "peak in-flight {peak} exceeds limit");
    assert!(peak >= 1);
}

#[tokio::test]
async fn single_worker_runs_items_sequentially() {
    let stages = StubStages::new(
        StubFetcher::new().with_delay(Duration::from_millis(5)),
        StubExtractor::new(sample_record(), None),
        StubValidator::all(FieldStatus::Correct),
    );

    runner_for(&stages, ShutdownSignal::new())
        .run(&urls(5), 1)
        .await
        .unwrap();

    assert_eq!(stages.fetcher.peak_in_flight(), 1);
}

#[tokio::test]
async fn zero_concurrency_is_rejected() {
    let stages = StubStages::happy();
    let err = runner_for(&stages, ShutdownSignal::new())
        .run(&urls(2), 0)
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "config_error");
    assert_eq!(stages.fetcher.calls(), 0);
}

#[tokio::test]
async fn empty_input_yields_empty_outcome() {
    let stages = StubStages::happy();
    let outcome = runner_for(&stages, ShutdownSignal::new())
        .run(&[], 2)
        .await
        .unwrap();

    assert!(outcome.is_empty());
    assert!(!outcome.interrupted);
    assert_eq!(outcome.total_urls, 0);
}

#[tokio::test]
async fn shutdown_before_start_dispatches_nothing() {
    let stages = StubStages::happy();
    let shutdown = ShutdownSignal::new();
    shutdown.request();

    let outcome = runner_for(&stages, shutdown).run(&urls(3), 2).await.unwrap();

    assert!(outcome.interrupted);
    assert!(outcome.is_empty());
    assert_eq!(outcome.total_urls, 3);
    assert_eq!(stages.fetcher.calls(), 0);
}

#[tokio::test]
async fn shutdown_after_item_k_stops_dispatch_and_drains_in_flight() {
    let input = urls(6);
    let shutdown = ShutdownSignal::new();
    let fetcher = Arc::new(ShutdownOnFetch {
        inner: StubFetcher::new().with_delay(Duration::from_millis(20)),
        trigger: input[2].clone(),
        signal: shutdown.clone(),
    });
    let runner = BatchRunner::new(pipeline_with_fetcher(fetcher.clone()), shutdown);

    let outcome = runner.run(&input, 1).await.unwrap();

    assert!(outcome.interrupted);
    assert_eq!(outcome.len(), 3, "items 0..=2 dispatched, nothing after");
    for (i, state) in outcome.items.iter().enumerate() {
        assert_eq!(state.index(), i);
        assert!(state.is_done(), "in-flight item {i} runs to completion");
    }
    assert_eq!(
        fetcher.inner.fetched_urls(),
        input[..3].to_vec(),
        "no item beyond the in-flight set is started"
    );
}

#[tokio::test]
async fn item_failures_do_not_abort_batch() {
    let input = urls(4);
    let stages = StubStages::new(
        StubFetcher::new()
            .with_page(&input[1], StubPage::Status(404))
            .with_page(&input[2], StubPage::Html(String::new())),
        StubExtractor::new(sample_record(), None),
        StubValidator::all(FieldStatus::Correct),
    );

    let outcome = runner_for(&stages, ShutdownSignal::new())
        .run(&input, 2)
        .await
        .unwrap();

    let statuses: Vec<ItemStatus> = outcome.items.iter().map(|s| s.status()).collect();
    assert_eq!(
        statuses,
        vec![
            ItemStatus::Done,
            ItemStatus::Failed,
            ItemStatus::Failed,
            ItemStatus::Done
        ]
    );
    assert_eq!(outcome.items[1].failed_stage(), Some(Stage::Fetch));
    assert_eq!(outcome.items[2].failed_stage(), Some(Stage::Reduce));
}

#[tokio::test]
async fn three_url_scenario() {
    let input = vec![
        "https://example.edu/people/missing".to_string(),
        "https://example.edu/people/second".to_string(),
        "https://example.edu/people/third".to_string(),
    ];
    let stages = StubStages::new(
        StubFetcher::new().with_page(&input[0], StubPage::Status(404)),
        StubExtractor::new(sample_record(), Some(usage(100, 50))).failing_transiently("third", 1),
        StubValidator::all(FieldStatus::Correct),
    );

    let outcome = runner_for(&stages, ShutdownSignal::new())
        .run(&input, 2)
        .await
        .unwrap();

    assert_eq!(outcome.len(), 3);
    let first = &outcome.items[0];
    assert_eq!(first.status(), ItemStatus::Failed);
    assert_eq!(first.error.as_ref().unwrap().status, Some(404));
    assert_eq!(stages.fetcher.calls_for(&input[0]), 1, "404 is never retried");
    assert!(outcome.items[1].is_done());
    assert!(outcome.items[2].is_done());
    assert_eq!(outcome.items[2].metrics.stage_attempts[&Stage::Extract], 2);
}

#[tokio::test]
async fn worker_panic_is_a_driver_fault_after_drain() {
    let input = urls(3);
    let inner = StubFetcher::new();
    let fetcher = Arc::new(PanickingFetcher {
        inner,
        poison: input[0].clone(),
    });
    let runner = BatchRunner::new(pipeline_with_fetcher(fetcher.clone()), ShutdownSignal::new());

    let err = runner.run(&input, 1).await.unwrap_err();

    match err {
        Error::WorkerPanicked { index, url, reason } => {
            assert_eq!(index, 0);
            assert_eq!(url, input[0]);
            assert!(reason.contains("fetcher bug"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(
        fetcher.inner.fetched_urls().is_empty(),
        "no item is dispatched once a worker panicked"
    );
}

#[tokio::test]
async fn worker_panic_with_spare_slots_stops_later_dispatch() {
    let input = urls(4);
    let fetcher = Arc::new(PanickingFetcher {
        inner: StubFetcher::new().with_delay(Duration::from_millis(50)),
        poison: input[0].clone(),
    });
    let runner = BatchRunner::new(pipeline_with_fetcher(fetcher.clone()), ShutdownSignal::new());

    let err = runner.run(&input, 2).await.unwrap_err();

    assert_eq!(err.error_code(), "worker_panicked");
    // Item 1 was already in flight when item 0 panicked; it drains, nothing after it starts
    assert_eq!(fetcher.inner.fetched_urls(), vec![input[1].clone()]);
}

#[tokio::test]
async fn progress_events_bracket_the_batch() {
    let stages = StubStages::happy();
    let runner = runner_for(&stages, ShutdownSignal::new());
    let mut events = runner.subscribe();

    runner.run(&urls(2), 2).await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert_eq!(received.first(), Some(&Event::BatchStarted { total: 2 }));
    assert_eq!(
        received.last(),
        Some(&Event::BatchFinished {
            completed: 2,
            interrupted: false
        })
    );
    let started = received
        .iter()
        .filter(|e| matches!(e, Event::ItemStarted { .. }))
        .count();
    assert_eq!(started, 2);
    let mut completed: Vec<usize> = received
        .iter()
        .filter_map(|e| match e {
            Event::ItemFinished {
                completed,
                succeeded: true,
                total: 2,
                ..
            } => Some(*completed),
            _ => None,
        })
        .collect();
    completed.sort_unstable();
    assert_eq!(completed, vec![1, 2]);
    assert_eq!(runner.completed(), 2);
}

#[test]
fn load_urls_reads_json_array() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("urls.json");
    std::fs::write(
        &path,
        r#"["https://example.edu/a", "  https://example.edu/b  ", ""]"#,
    )
    .unwrap();

    let urls = load_urls(&path).unwrap();
    assert_eq!(urls, vec!["https://example.edu/a", "https://example.edu/b"]);
}

#[test]
fn load_urls_rejects_non_arrays() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("urls.json");

    std::fs::write(&path, r#"{"urls": []}"#).unwrap();
    assert_eq!(load_urls(&path).unwrap_err().error_code(), "config_error");

    std::fs::write(&path, r#"["https://example.edu/a", 42]"#).unwrap();
    assert_eq!(load_urls(&path).unwrap_err().error_code(), "config_error");

    assert_eq!(
        load_urls(dir.path().join("missing.json")).unwrap_err().error_code(),
        "io_error"
    );
}
