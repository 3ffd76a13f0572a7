//! Batch metrics aggregation
//!
//! [`aggregate`] is a pure reduction over a finished [`BatchOutcome`]: same
//! outcome in, identical [`BatchMetrics`] out. Every ratio is a [`Metric`], so
//! a zero denominator shows up as [`Metric::Undefined`] instead of a
//! misleading `0` or `NaN`.
//!
//! Token, cost, latency and field-accuracy figures are computed over
//! successful items only. Error rates use every processed item.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::types::{BatchOutcome, FieldName, FieldStatus, ItemState, Stage};

/// A ratio that may be undefined
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Metric {
    /// Computed value
    Value(f64),
    /// Denominator was zero (or no data was available)
    Undefined,
}

impl Metric {
    /// `numerator / denominator`, undefined for a zero denominator
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            Metric::Undefined
        } else {
            Metric::Value(numerator / denominator)
        }
    }

    /// The value, if defined
    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Value(v) => Some(*v),
            Metric::Undefined => None,
        }
    }

    /// Whether the metric is undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, Metric::Undefined)
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Value(v) => match f.precision() {
                Some(precision) => write!(f, "{:.*}", precision, v),
                None => write!(f, "{}", v),
            },
            Metric::Undefined => f.write_str("n/a"),
        }
    }
}

// Undefined serializes as null so consumers never mistake it for zero
impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Metric::Value(v) => serializer.serialize_f64(*v),
            Metric::Undefined => serializer.serialize_none(),
        }
    }
}

/// Failures attributed to one stage
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StageErrorStats {
    /// Items for which the stage was invoked
    pub reached: usize,
    /// Items that failed at this stage
    pub failed: usize,
    /// `failed / reached`
    pub error_rate: Metric,
}

/// Token totals across successful items
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TokenStats {
    /// Successful items with usage from at least one model call
    pub items_with_token_data: usize,
    /// Prompt tokens of extraction calls
    pub extraction_input: u64,
    /// Completion tokens of extraction calls
    pub extraction_output: u64,
    /// Prompt tokens of judge calls
    pub validation_input: u64,
    /// Completion tokens of judge calls
    pub validation_output: u64,
    /// All tokens
    pub total: u64,
    /// Mean tokens per item with token data
    pub average_per_item: Metric,
}

/// Cost across successful items
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CostStats {
    /// Successful items with a priced model call
    pub items_with_cost: usize,
    /// Total cost in USD, undefined when no item was priced
    pub total_usd: Metric,
    /// Mean cost per priced item
    pub average_per_item_usd: Metric,
}

/// Timing figures
///
/// Item latency (sum of an item's stage timers) and throughput (successes
/// per second of batch wall clock) use different time bases and are not
/// interchangeable.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LatencyStats {
    /// Mean item latency of successful items, in seconds
    pub average_item_latency_secs: Metric,
    /// Sum of all stage time of successful items, in seconds
    pub total_stage_time_secs: f64,
    /// Stage time of successful items per stage, in seconds
    pub stage_time_secs: BTreeMap<Stage, f64>,
    /// Batch wall clock, in seconds
    pub wall_clock_secs: f64,
    /// Successful items per second of wall clock
    pub throughput_per_sec: Metric,
}

/// Judge verdict counts and derived scores for one field
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldAccuracy {
    /// Correct verdicts
    pub correct: usize,
    /// Incorrect verdicts
    pub incorrect: usize,
    /// Missing verdicts
    pub missing: usize,
    /// Not-applicable verdicts (ignored by the scores)
    pub not_applicable: usize,
    /// `C / (C + I)`
    pub precision: Metric,
    /// `C / (C + I + M)`
    pub recall: Metric,
    /// Harmonic mean of precision and recall
    pub f1: Metric,
}

impl FieldAccuracy {
    fn from_counts(correct: usize, incorrect: usize, missing: usize, not_applicable: usize) -> Self {
        let c = correct as f64;
        let precision = Metric::ratio(c, c + incorrect as f64);
        let recall = Metric::ratio(c, c + incorrect as f64 + missing as f64);
        let f1 = match (precision, recall) {
            (Metric::Value(p), Metric::Value(r)) => Metric::ratio(2.0 * p * r, p + r),
            _ => Metric::Undefined,
        };
        Self {
            correct,
            incorrect,
            missing,
            not_applicable,
            precision,
            recall,
            f1,
        }
    }
}

/// Batch-level statistics
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchMetrics {
    /// URLs in the input list
    pub total_urls: usize,
    /// Items that reached a terminal state
    pub processed: usize,
    /// Items done
    pub succeeded: usize,
    /// Items failed
    pub failed: usize,
    /// Whether the batch was interrupted
    pub interrupted: bool,
    /// `succeeded / processed`
    pub success_rate: Metric,
    /// `failed / processed`
    pub overall_error_rate: Metric,
    /// Failures per stage
    pub stage_errors: BTreeMap<Stage, StageErrorStats>,
    /// Token usage
    pub tokens: TokenStats,
    /// Cost
    pub cost: CostStats,
    /// Latency and throughput
    pub latency: LatencyStats,
    /// Accuracy per extractable field
    pub field_accuracy: BTreeMap<FieldName, FieldAccuracy>,
    /// Mean fraction of populated extractable fields per record
    pub completeness: Metric,
}

/// Reduce a batch outcome into metrics
pub fn aggregate(outcome: &BatchOutcome) -> BatchMetrics {
    let processed = outcome.len();
    let successes: Vec<&ItemState> = outcome.successes().collect();
    let succeeded = successes.len();
    let failed = processed - succeeded;

    BatchMetrics {
        total_urls: outcome.total_urls,
        processed,
        succeeded,
        failed,
        interrupted: outcome.interrupted,
        success_rate: Metric::ratio(succeeded as f64, processed as f64),
        overall_error_rate: Metric::ratio(failed as f64, processed as f64),
        stage_errors: stage_errors(outcome),
        tokens: token_stats(&successes),
        cost: cost_stats(&successes),
        latency: latency_stats(&successes, outcome),
        field_accuracy: field_accuracy(&successes),
        completeness: completeness(&successes),
    }
}

fn stage_errors(outcome: &BatchOutcome) -> BTreeMap<Stage, StageErrorStats> {
    Stage::ALL
        .iter()
        .map(|&stage| {
            let reached = outcome.items.iter().filter(|s| s.reached(stage)).count();
            let failed = outcome
                .items
                .iter()
                .filter(|s| s.failed_stage() == Some(stage))
                .count();
            (
                stage,
                StageErrorStats {
                    reached,
                    failed,
                    error_rate: Metric::ratio(failed as f64, reached as f64),
                },
            )
        })
        .collect()
}

fn token_stats(successes: &[&ItemState]) -> TokenStats {
    let mut stats = TokenStats {
        items_with_token_data: 0,
        extraction_input: 0,
        extraction_output: 0,
        validation_input: 0,
        validation_output: 0,
        total: 0,
        average_per_item: Metric::Undefined,
    };

    for state in successes {
        let metrics = &state.metrics;
        if !metrics.has_token_data() {
            continue;
        }
        stats.items_with_token_data += 1;
        if let Some(u) = &metrics.extraction_usage {
            stats.extraction_input += u.input_tokens;
            stats.extraction_output += u.output_tokens;
        }
        if let Some(u) = &metrics.validation_usage {
            stats.validation_input += u.input_tokens;
            stats.validation_output += u.output_tokens;
        }
    }

    stats.total = stats.extraction_input
        + stats.extraction_output
        + stats.validation_input
        + stats.validation_output;
    stats.average_per_item = Metric::ratio(stats.total as f64, stats.items_with_token_data as f64);
    stats
}

fn cost_stats(successes: &[&ItemState]) -> CostStats {
    let costs: Vec<f64> = successes
        .iter()
        .filter_map(|s| s.metrics.total_cost())
        .collect();
    let items_with_cost = costs.len();
    let total: f64 = costs.iter().sum();

    CostStats {
        items_with_cost,
        total_usd: if items_with_cost == 0 {
            Metric::Undefined
        } else {
            Metric::Value(total)
        },
        average_per_item_usd: Metric::ratio(total, items_with_cost as f64),
    }
}

fn latency_stats(successes: &[&ItemState], outcome: &BatchOutcome) -> LatencyStats {
    let mut stage_time_secs: BTreeMap<Stage, f64> = BTreeMap::new();
    let mut latency_sum = 0.0;
    for state in successes {
        latency_sum += state.metrics.total_latency().as_secs_f64();
        for (stage, duration) in &state.metrics.stage_durations {
            *stage_time_secs.entry(*stage).or_insert(0.0) += duration.as_secs_f64();
        }
    }

    let wall_clock_secs = outcome.wall_clock.as_secs_f64();
    LatencyStats {
        average_item_latency_secs: Metric::ratio(latency_sum, successes.len() as f64),
        total_stage_time_secs: latency_sum,
        stage_time_secs,
        wall_clock_secs,
        throughput_per_sec: Metric::ratio(successes.len() as f64, wall_clock_secs),
    }
}

fn field_accuracy(successes: &[&ItemState]) -> BTreeMap<FieldName, FieldAccuracy> {
    FieldName::ALL
        .iter()
        .map(|&field| {
            let (mut c, mut i, mut m, mut na) = (0, 0, 0, 0);
            for status in successes
                .iter()
                .filter_map(|s| s.verdicts.as_ref())
                .filter_map(|v| v.status(field))
            {
                match status {
                    FieldStatus::Correct => c += 1,
                    FieldStatus::Incorrect => i += 1,
                    FieldStatus::Missing => m += 1,
                    FieldStatus::NotApplicable => na += 1,
                }
            }
            (field, FieldAccuracy::from_counts(c, i, m, na))
        })
        .collect()
}

fn completeness(successes: &[&ItemState]) -> Metric {
    let fractions: Vec<f64> = successes
        .iter()
        .filter_map(|s| s.record.as_ref())
        .map(|r| r.populated_count() as f64 / FieldName::ALL.len() as f64)
        .collect();
    Metric::ratio(fractions.iter().sum(), fractions.len() as f64)
}

impl BatchMetrics {
    /// Emit a human-readable summary through `tracing`
    pub fn log_summary(&self) {
        tracing::info!(
            total_urls = self.total_urls,
            processed = self.processed,
            succeeded = self.succeeded,
            failed = self.failed,
            interrupted = self.interrupted,
            success_rate = %format!("{:.3}", self.success_rate),
            error_rate = %format!("{:.3}", self.overall_error_rate),
            "Batch summary"
        );

        for (stage, stats) in &self.stage_errors {
            if stats.failed > 0 {
                tracing::info!(
                    stage = %stage,
                    failed = stats.failed,
                    reached = stats.reached,
                    error_rate = %format!("{:.3}", stats.error_rate),
                    "Stage errors"
                );
            }
        }

        tracing::info!(
            items_with_token_data = self.tokens.items_with_token_data,
            total_tokens = self.tokens.total,
            average_tokens = %format!("{:.1}", self.tokens.average_per_item),
            total_cost_usd = %format!("{:.6}", self.cost.total_usd),
            average_cost_usd = %format!("{:.6}", self.cost.average_per_item_usd),
            "Token usage"
        );

        tracing::info!(
            average_latency_secs = %format!("{:.2}", self.latency.average_item_latency_secs),
            wall_clock_secs = %format!("{:.2}", self.latency.wall_clock_secs),
            throughput_per_sec = %format!("{:.3}", self.latency.throughput_per_sec),
            completeness = %format!("{:.3}", self.completeness),
            "Timing"
        );

        for (field, accuracy) in &self.field_accuracy {
            tracing::debug!(
                field = %field,
                precision = %format!("{:.3}", accuracy.precision),
                recall = %format!("{:.3}", accuracy.recall),
                f1 = %format!("{:.3}", accuracy.f1),
                "Field accuracy"
            );
        }
    }
}
