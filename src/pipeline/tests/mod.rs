use super::test_helpers::*;
use crate::types::{FieldStatus, Item, ItemStatus, Stage};

fn item(url: &str) -> Item {
    Item::new(0, url)
}

#[tokio::test]
async fn happy_path_reaches_done_with_record_and_verdicts() {
    let stages = StubStages::happy();
    let pipeline = stages.pipeline(fast_retry(3));

    let state = pipeline.run(item("https://example.edu/people/jdoe")).await;

    assert_eq!(state.status(), ItemStatus::Done);
    assert!(state.error.is_none());
    let record = state.record.as_ref().unwrap();
    assert_eq!(record.source_url, "https://example.edu/people/jdoe");
    assert_eq!(record.email.as_deref(), Some("jdoe@example.edu"));
    assert_eq!(
        state.verdicts.as_ref().unwrap().status(crate::types::FieldName::Email),
        Some(FieldStatus::Correct)
    );
    assert!(state.raw_content.is_some());
    assert!(state.reduced_content.as_deref().unwrap().contains("Professor of Chemistry"));
    assert!(!state.reduced_content.as_deref().unwrap().contains("Directory"));

    for stage in Stage::ALL {
        assert!(state.metrics.stage_durations.contains_key(&stage), "{stage} not timed");
        assert_eq!(state.metrics.stage_attempts[&stage], 1);
    }
    assert_eq!(state.item.attempt_count, 4);
    assert_eq!(state.metrics.token_totals(), (180, 70));
    assert_eq!(stages.extractor.calls(), 1);
    assert_eq!(stages.validator.calls(), 1);
}

#[tokio::test]
async fn permanent_fetch_failure_skips_models_and_is_not_retried() {
    let url = "https://example.edu/people/gone";
    let stages = StubStages::new(
        StubFetcher::new().with_page(url, StubPage::Status(404)),
        StubExtractor::new(sample_record(), None),
        StubValidator::all(FieldStatus::Correct),
    );

    let state = stages.pipeline(fast_retry(3)).run(item(url)).await;

    assert_eq!(state.status(), ItemStatus::Failed);
    assert!(state.record.is_none());
    let error = state.error.as_ref().unwrap();
    assert_eq!(error.stage, Stage::Fetch);
    assert_eq!(error.kind, "http_status");
    assert_eq!(error.status, Some(404));
    assert!(!error.retriable);
    assert_eq!(error.attempts, 1);
    assert_eq!(stages.fetcher.calls_for(url), 1);
    assert_eq!(stages.extractor.calls(), 0, "no model call after fetch failure");
    assert_eq!(stages.validator.calls(), 0);
    assert!(!state.metrics.stage_durations.contains_key(&Stage::Reduce));
}

#[tokio::test]
async fn transient_fetch_failure_is_bounded_by_max_attempts() {
    let url = "https://example.edu/people/flaky";
    let stages = StubStages::new(
        StubFetcher::new().with_page(
            url,
            StubPage::FlakyThen {
                failures: 10,
                body: profile_page("flaky"),
            },
        ),
        StubExtractor::new(sample_record(), None),
        StubValidator::all(FieldStatus::Correct),
    );

    let state = stages.pipeline(fast_retry(3)).run(item(url)).await;

    let error = state.error.as_ref().unwrap();
    assert_eq!(error.stage, Stage::Fetch);
    assert!(error.retriable);
    assert_eq!(error.attempts, 3);
    assert_eq!(stages.fetcher.calls_for(url), 3);
    assert_eq!(state.item.attempt_count, 3);
}

#[tokio::test]
async fn transient_fetch_failure_recovers_within_budget() {
    let url = "https://example.edu/people/recovering";
    let stages = StubStages::new(
        StubFetcher::new().with_page(
            url,
            StubPage::FlakyThen {
                failures: 2,
                body: profile_page("recovering"),
            },
        ),
        StubExtractor::new(sample_record(), None),
        StubValidator::all(FieldStatus::Correct),
    );

    let state = stages.pipeline(fast_retry(3)).run(item(url)).await;

    assert!(state.is_done());
    assert_eq!(state.metrics.stage_attempts[&Stage::Fetch], 3);
    assert_eq!(state.item.attempt_count, 6);
}

#[tokio::test]
async fn empty_page_fails_at_reduce() {
    let url = "https://example.edu/people/blank";
    let stages = StubStages::new(
        StubFetcher::new().with_page(url, StubPage::Html("<html><body><nav>Menu</nav></body></html>".into())),
        StubExtractor::new(sample_record(), None),
        StubValidator::all(FieldStatus::Correct),
    );

    let state = stages.pipeline(fast_retry(3)).run(item(url)).await;

    let error = state.error.as_ref().unwrap();
    assert_eq!(error.stage, Stage::Reduce);
    assert!(!error.retriable);
    assert_eq!(error.attempts, 1);
    assert!(state.raw_content.is_some());
    assert!(state.reduced_content.is_none());
    assert_eq!(stages.extractor.calls(), 0);
}

#[tokio::test]
async fn transient_extract_failure_is_retried() {
    let stages = StubStages::new(
        StubFetcher::new(),
        StubExtractor::new(sample_record(), Some(usage(100, 50))).failing_transiently("third", 1),
        StubValidator::all(FieldStatus::Correct),
    );

    let state = stages
        .pipeline(fast_retry(3))
        .run(item("https://example.edu/people/third"))
        .await;

    assert!(state.is_done());
    assert_eq!(state.metrics.stage_attempts[&Stage::Extract], 2);
    assert_eq!(stages.extractor.calls(), 2);
    assert!(state.metrics.extraction_usage.is_some());
}

#[tokio::test]
async fn invalid_model_output_is_not_retried() {
    let stages = StubStages::new(
        StubFetcher::new(),
        StubExtractor::new(sample_record(), None).invalid_for("garbled"),
        StubValidator::all(FieldStatus::Correct),
    );

    let state = stages
        .pipeline(fast_retry(5))
        .run(item("https://example.edu/people/garbled"))
        .await;

    let error = state.error.as_ref().unwrap();
    assert_eq!(error.stage, Stage::Extract);
    assert_eq!(error.kind, "invalid_output");
    assert!(!error.retriable);
    assert_eq!(stages.extractor.calls(), 1);
    assert_eq!(stages.validator.calls(), 0, "no validation without a record");
    assert!(state.record.is_none());
}

#[tokio::test]
async fn validation_failure_fails_item_and_drops_record() {
    let stages = StubStages::new(
        StubFetcher::new(),
        StubExtractor::new(sample_record(), Some(usage(100, 50))),
        StubValidator::all(FieldStatus::Correct).failing(400),
    );

    let state = stages
        .pipeline(fast_retry(3))
        .run(item("https://example.edu/people/unjudged"))
        .await;

    assert_eq!(state.status(), ItemStatus::Failed);
    assert_eq!(state.failed_stage(), Some(Stage::Validate));
    assert!(state.record.is_none(), "never both record and error");
    assert!(state.verdicts.is_none());
    // Extraction spend is still accounted for
    assert!(state.metrics.extraction_usage.is_some());
}

#[tokio::test]
async fn exactly_one_terminal_slot_is_set() {
    let pages = [
        ("https://example.edu/a", StubPage::Status(404)),
        ("https://example.edu/b", StubPage::Html(String::new())),
        ("https://example.edu/c", StubPage::Html(profile_page("c"))),
    ];
    let mut fetcher = StubFetcher::new();
    for (url, page) in pages.iter().cloned() {
        fetcher = fetcher.with_page(url, page);
    }
    let stages = StubStages::new(
        fetcher,
        StubExtractor::new(sample_record(), None),
        StubValidator::all(FieldStatus::Missing),
    );
    let pipeline = stages.pipeline(fast_retry(2));

    for (url, _) in pages {
        let state = pipeline.run(item(url)).await;
        assert!(
            state.record.is_some() ^ state.error.is_some(),
            "{url}: record={:?} error={:?}",
            state.record,
            state.error
        );
    }
}
