//! Report output
//!
//! Projects a [`BatchOutcome`] into flat rows (one per successful record, one
//! per failure) and writes them, together with the [`BatchMetrics`], as JSON
//! files in the configured output directory:
//!
//! - `<stem>.json`: successful records
//! - `<stem>_errors.json`: failures
//! - `<stem>_metrics.json`: batch metrics
//!
//! List fields are flattened to `"; "`-separated text so every row has the
//! same scalar column set.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::OutputConfig;
use crate::error::Result;
use crate::metrics::BatchMetrics;
use crate::types::{BatchOutcome, DegreeInfo, Record, Stage};

/// Separator for flattened list fields
const LIST_SEPARATOR: &str = "; ";

/// One successful record as a flat row
///
/// Scalar fields are copied as-is; `degrees` and `research_focus_areas` are
/// flattened (see [`render_degree`]) and `None` when nothing remains.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordRow {
    pub source_url: String,
    pub photo_url: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub office: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub college_unit: Option<String>,
    pub department_division: Option<String>,
    pub degrees: Option<String>,
    pub research_focus_areas: Option<String>,
}

impl From<&Record> for RecordRow {
    fn from(record: &Record) -> Self {
        Self {
            source_url: record.source_url.clone(),
            photo_url: record.photo_url.clone(),
            first_name: record.first_name.clone(),
            middle_name: record.middle_name.clone(),
            last_name: record.last_name.clone(),
            title: record.title.clone(),
            office: record.office.clone(),
            phone: record.phone.clone(),
            email: record.email.clone(),
            college_unit: record.college_unit.clone(),
            department_division: record.department_division.clone(),
            degrees: record.degrees.as_deref().and_then(|degrees| {
                join_non_empty(degrees.iter().map(render_degree))
            }),
            research_focus_areas: record
                .research_focus_areas
                .as_deref()
                .and_then(|areas| join_non_empty(areas.iter().map(|a| a.trim().to_string()))),
        }
    }
}

/// One failed item as a flat row
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailureRow {
    /// Page URL
    pub url: String,
    /// Stage the item failed at
    pub stage: Stage,
    /// Short error class, e.g. `http_status`
    pub kind: String,
    /// Human-readable error
    pub message: String,
    /// Calls made at the failing stage
    pub attempts: u32,
    /// HTTP status, when the failure carried one
    pub status: Option<u16>,
}

/// `"<type>, <institution>, <year>"`, skipping absent parts
pub fn render_degree(degree: &DegreeInfo) -> String {
    [&degree.degree_type, &degree.institution, &degree.year]
        .into_iter()
        .filter_map(|part| part.as_deref().map(str::trim))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_non_empty(parts: impl Iterator<Item = String>) -> Option<String> {
    let parts: Vec<String> = parts.filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(LIST_SEPARATOR))
    }
}

/// Rows for every successful record, in input order
pub fn record_rows(outcome: &BatchOutcome) -> Vec<RecordRow> {
    outcome
        .successes()
        .filter_map(|state| state.record.as_ref())
        .map(RecordRow::from)
        .collect()
}

/// Rows for every failed item, in input order
pub fn failure_rows(outcome: &BatchOutcome) -> Vec<FailureRow> {
    outcome
        .items
        .iter()
        .filter_map(|state| {
            state.error.as_ref().map(|error| FailureRow {
                url: state.url().to_string(),
                stage: error.stage,
                kind: error.kind.clone(),
                message: error.message.clone(),
                attempts: error.attempts,
                status: error.status,
            })
        })
        .collect()
}

/// Files written by [`ReportWriter::write`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportPaths {
    /// Successful records, absent when there were none
    pub records: Option<PathBuf>,
    /// Failures, absent when there were none
    pub failures: Option<PathBuf>,
    /// Batch metrics
    pub metrics: PathBuf,
}

/// Writes batch reports to disk
#[derive(Clone, Debug)]
pub struct ReportWriter {
    output_dir: PathBuf,
    file_stem: String,
}

impl ReportWriter {
    /// Create a writer for the configured directory and file stem
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            file_stem: config.file_stem.clone(),
        }
    }

    /// Directory reports are written to
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write the record, failure and metrics files
    ///
    /// The output directory is created if missing. Record and failure files
    /// are skipped when they would be empty; the metrics file is always
    /// written.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a file cannot
    /// be serialized or written.
    pub fn write(&self, outcome: &BatchOutcome, metrics: &BatchMetrics) -> Result<ReportPaths> {
        std::fs::create_dir_all(&self.output_dir)?;

        let records = record_rows(outcome);
        let records_path = if records.is_empty() {
            tracing::info!("No successful profiles to save");
            None
        } else {
            let path = self.path_for("");
            write_json(&path, &records)?;
            tracing::info!(count = records.len(), path = %path.display(), "Saved profiles");
            Some(path)
        };

        let failures = failure_rows(outcome);
        let failures_path = if failures.is_empty() {
            tracing::info!("No failures to save");
            None
        } else {
            let path = self.path_for("_errors");
            write_json(&path, &failures)?;
            tracing::info!(count = failures.len(), path = %path.display(), "Saved error report");
            Some(path)
        };

        let metrics_path = self.path_for("_metrics");
        write_json(&metrics_path, metrics)?;
        tracing::info!(path = %metrics_path.display(), "Saved metrics");

        Ok(ReportPaths {
            records: records_path,
            failures: failures_path,
            metrics: metrics_path,
        })
    }

    fn path_for(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}{}.json", self.file_stem, suffix))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}
