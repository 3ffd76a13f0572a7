//! Core types for profile-extract

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ErrorInfo;

/// Pipeline stage
///
/// Ordering follows the pipeline, so `Stage::Fetch < Stage::Validate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Page fetch
    Fetch,
    /// HTML reduction
    Reduce,
    /// Model extraction
    Extract,
    /// Model validation (judge)
    Validate,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 4] = [Stage::Fetch, Stage::Reduce, Stage::Extract, Stage::Validate];

    /// Lowercase stage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Reduce => "reduce",
            Stage::Extract => "extract",
            Stage::Validate => "validate",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of work: one URL from the input list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    /// Position in the input list
    pub index: usize,
    /// URL to process
    pub url: String,
    /// Stage calls made so far (first attempts and retries)
    pub attempt_count: u32,
}

impl Item {
    /// Create a fresh item
    pub fn new(index: usize, url: impl Into<String>) -> Self {
        Self {
            index,
            url: url.into(),
            attempt_count: 0,
        }
    }
}

/// Extractable profile field
///
/// Every [`Record`] field except `source_url`, which is an input rather than
/// something the model extracts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    /// Photo URL
    PhotoUrl,
    /// First name
    FirstName,
    /// Middle name or initial
    MiddleName,
    /// Last name
    LastName,
    /// Official title or position
    Title,
    /// Office location
    Office,
    /// Phone number
    Phone,
    /// Email address
    Email,
    /// College or primary administrative unit
    CollegeUnit,
    /// Department or division
    DepartmentDivision,
    /// Academic degrees
    Degrees,
    /// Research focus areas
    ResearchFocusAreas,
}

impl FieldName {
    /// All extractable fields in report column order
    pub const ALL: [FieldName; 12] = [
        FieldName::PhotoUrl,
        FieldName::FirstName,
        FieldName::MiddleName,
        FieldName::LastName,
        FieldName::Title,
        FieldName::Office,
        FieldName::Phone,
        FieldName::Email,
        FieldName::CollegeUnit,
        FieldName::DepartmentDivision,
        FieldName::Degrees,
        FieldName::ResearchFocusAreas,
    ];

    /// snake_case field name, matching the Record's serialized key
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::PhotoUrl => "photo_url",
            FieldName::FirstName => "first_name",
            FieldName::MiddleName => "middle_name",
            FieldName::LastName => "last_name",
            FieldName::Title => "title",
            FieldName::Office => "office",
            FieldName::Phone => "phone",
            FieldName::Email => "email",
            FieldName::CollegeUnit => "college_unit",
            FieldName::DepartmentDivision => "department_division",
            FieldName::Degrees => "degrees",
            FieldName::ResearchFocusAreas => "research_focus_areas",
        }
    }
}

impl std::fmt::Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured academic degree
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegreeInfo {
    /// Degree type (e.g., Ph.D., M.S., B.A.)
    #[serde(default)]
    pub degree_type: Option<String>,
    /// Awarding institution
    #[serde(default)]
    pub institution: Option<String>,
    /// Year awarded, kept as text because model output varies ("1998", "ca. 2001")
    #[serde(default)]
    pub year: Option<String>,
}

/// Extracted faculty profile
///
/// Only `source_url` is required. A record with every optional field `None`
/// is still a successful extraction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// URL the profile was extracted from (set by the pipeline, not the model)
    #[serde(default)]
    pub source_url: String,
    /// URL of the profile photo
    #[serde(default)]
    pub photo_url: Option<String>,
    /// First name
    #[serde(default)]
    pub first_name: Option<String>,
    /// Middle name or initial
    #[serde(default)]
    pub middle_name: Option<String>,
    /// Last name
    #[serde(default)]
    pub last_name: Option<String>,
    /// Official title or position
    #[serde(default)]
    pub title: Option<String>,
    /// Office location (building, room)
    #[serde(default)]
    pub office: Option<String>,
    /// Contact phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Contact email address
    #[serde(default)]
    pub email: Option<String>,
    /// College or primary administrative unit
    #[serde(default)]
    pub college_unit: Option<String>,
    /// Department or division within the unit
    #[serde(default)]
    pub department_division: Option<String>,
    /// Academic degrees held
    #[serde(default)]
    pub degrees: Option<Vec<DegreeInfo>>,
    /// Research focus areas or interests
    #[serde(default)]
    pub research_focus_areas: Option<Vec<String>>,
}

impl Record {
    /// Text value of a scalar field, `None` for list fields
    pub fn text(&self, field: FieldName) -> Option<&str> {
        let value = match field {
            FieldName::PhotoUrl => &self.photo_url,
            FieldName::FirstName => &self.first_name,
            FieldName::MiddleName => &self.middle_name,
            FieldName::LastName => &self.last_name,
            FieldName::Title => &self.title,
            FieldName::Office => &self.office,
            FieldName::Phone => &self.phone,
            FieldName::Email => &self.email,
            FieldName::CollegeUnit => &self.college_unit,
            FieldName::DepartmentDivision => &self.department_division,
            FieldName::Degrees | FieldName::ResearchFocusAreas => return None,
        };
        value.as_deref()
    }

    /// Whether the field holds a non-blank value
    ///
    /// Blank strings and empty lists count as not extracted.
    pub fn is_populated(&self, field: FieldName) -> bool {
        match field {
            FieldName::Degrees => self.degrees.as_ref().is_some_and(|d| !d.is_empty()),
            FieldName::ResearchFocusAreas => self
                .research_focus_areas
                .as_ref()
                .is_some_and(|areas| areas.iter().any(|a| !a.trim().is_empty())),
            scalar => self.text(scalar).is_some_and(|v| !v.trim().is_empty()),
        }
    }

    /// Number of populated extractable fields
    pub fn populated_count(&self) -> usize {
        FieldName::ALL
            .iter()
            .filter(|f| self.is_populated(**f))
            .count()
    }
}

/// Judge verdict for one field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldStatus {
    /// Present in the source and extracted accurately
    Correct,
    /// Extracted value is wrong or hallucinated
    Incorrect,
    /// Present in the source but not extracted
    Missing,
    /// Field cannot be judged for this page
    #[serde(rename = "Not Applicable", alias = "NotApplicable")]
    NotApplicable,
}

/// Verdict and optional reasoning for one field
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldVerdict {
    /// Verdict
    pub status: FieldStatus,
    /// Optional reasoning from the judge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FieldVerdict {
    /// Verdict without reasoning
    pub fn new(status: FieldStatus) -> Self {
        Self {
            status,
            reason: None,
        }
    }
}

/// Per-field verdicts for one item's Record
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictSet {
    /// Verdict per extractable field
    pub verdicts: BTreeMap<FieldName, FieldVerdict>,
    /// Optional overall comment from the judge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_comment: Option<String>,
}

impl VerdictSet {
    /// Verdict status for a field, if judged
    pub fn status(&self, field: FieldName) -> Option<FieldStatus> {
        self.verdicts.get(&field).map(|v| v.status)
    }
}

/// Token usage and cost of one model call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Model that served the call
    pub model: String,
    /// Prompt tokens
    pub input_tokens: u64,
    /// Completion tokens
    pub output_tokens: u64,
    /// Cost in USD; `None` when the model has no configured price
    #[serde(default)]
    pub cost: Option<f64>,
}

impl TokenUsage {
    /// Prompt plus completion tokens
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Per-item measurements recorded by the pipeline
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemMetrics {
    /// Wall-clock time spent in each stage that ran (including retries and backoff)
    pub stage_durations: BTreeMap<Stage, Duration>,
    /// Calls made to each stage that ran
    pub stage_attempts: BTreeMap<Stage, u32>,
    /// Usage reported by the extraction model
    pub extraction_usage: Option<TokenUsage>,
    /// Usage reported by the judge model
    pub validation_usage: Option<TokenUsage>,
}

impl ItemMetrics {
    /// Item latency: sum of stage durations (excludes time queued in the batch driver)
    pub fn total_latency(&self) -> Duration {
        self.stage_durations.values().sum()
    }

    /// Whether any model call reported non-zero token counts
    pub fn has_token_data(&self) -> bool {
        self.usages().next().is_some()
    }

    /// Input and output tokens across both model calls
    pub fn token_totals(&self) -> (u64, u64) {
        self.usages().fold((0, 0), |(input, output), u| {
            (input + u.input_tokens, output + u.output_tokens)
        })
    }

    /// Cost across both model calls; `None` when no call has a priced usage
    pub fn total_cost(&self) -> Option<f64> {
        self.usages()
            .filter_map(|u| u.cost)
            .fold(None::<f64>, |acc, c| Some(acc.unwrap_or(0.0) + c))
    }

    /// Usages carrying at least one token; all-zero usage counts as no data
    fn usages(&self) -> impl Iterator<Item = &TokenUsage> {
        self.extraction_usage
            .iter()
            .chain(self.validation_usage.iter())
            .filter(|u| u.total_tokens() > 0)
    }
}

/// Terminal status of an item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// All four stages succeeded
    Done,
    /// A stage failed; see [`ItemState::error`]
    Failed,
}

/// State threaded through the item pipeline
///
/// Owned by a single pipeline run. After the run exactly one of `record`
/// (done) or `error` (failed) is set.
#[derive(Clone, Debug)]
pub struct ItemState {
    /// The work item (URL, index, attempt count)
    pub item: Item,
    /// Fetched page body
    pub raw_content: Option<String>,
    /// Reduced text handed to the models
    pub reduced_content: Option<String>,
    /// Extracted record (success path)
    pub record: Option<Record>,
    /// Judge verdicts for the record
    pub verdicts: Option<VerdictSet>,
    /// Timings, attempts and token usage
    pub metrics: ItemMetrics,
    /// Terminal failure
    pub error: Option<ErrorInfo>,
}

impl ItemState {
    /// Fresh state for an item about to enter the pipeline
    pub fn new(item: Item) -> Self {
        Self {
            item,
            raw_content: None,
            reduced_content: None,
            record: None,
            verdicts: None,
            metrics: ItemMetrics::default(),
            error: None,
        }
    }

    /// URL of the item
    pub fn url(&self) -> &str {
        &self.item.url
    }

    /// Position in the input list
    pub fn index(&self) -> usize {
        self.item.index
    }

    /// Terminal status derived from the error slot
    pub fn status(&self) -> ItemStatus {
        if self.error.is_some() {
            ItemStatus::Failed
        } else {
            ItemStatus::Done
        }
    }

    /// Whether the item finished all stages
    pub fn is_done(&self) -> bool {
        self.status() == ItemStatus::Done
    }

    /// Stage the item failed at, if any
    pub fn failed_stage(&self) -> Option<Stage> {
        self.error.as_ref().map(|e| e.stage)
    }

    /// Whether the pipeline invoked the given stage for this item
    ///
    /// Failures short-circuit, so a failed item reached every stage up to and
    /// including the failing one; a done item reached all of them.
    pub fn reached(&self, stage: Stage) -> bool {
        match self.failed_stage() {
            Some(failed_at) => stage <= failed_at,
            None => true,
        }
    }
}

/// Ordered result of a batch run
///
/// Built by the batch driver, consumed by the metrics aggregator and reporters.
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    /// Terminal item states in input order
    pub items: Vec<ItemState>,
    /// Whether dispatch stopped early because shutdown was requested
    pub interrupted: bool,
    /// Number of URLs in the input list
    pub total_urls: usize,
    /// When the batch started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the whole batch
    pub wall_clock: Duration,
}

impl BatchOutcome {
    /// Number of terminal items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no item was processed
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items that finished all stages
    pub fn successes(&self) -> impl Iterator<Item = &ItemState> {
        self.items.iter().filter(|s| s.is_done())
    }

    /// Items that terminated with an error
    pub fn failures(&self) -> impl Iterator<Item = &ItemState> {
        self.items.iter().filter(|s| !s.is_done())
    }
}

/// Event emitted during a batch run
///
/// Progress side channel; subscribers may lag or drop events without
/// affecting the batch result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Batch accepted and about to dispatch
    BatchStarted {
        /// Number of input URLs
        total: usize,
    },
    /// Item handed to a worker
    ItemStarted {
        /// Input position
        index: usize,
        /// Item URL
        url: String,
    },
    /// Item reached a terminal state
    ItemFinished {
        /// Input position
        index: usize,
        /// Item URL
        url: String,
        /// Whether the item is done (false means failed)
        succeeded: bool,
        /// Items completed so far
        completed: usize,
        /// Number of input URLs
        total: usize,
    },
    /// Shutdown seen by the driver; no more items will be dispatched
    ShutdownObserved {
        /// Items dispatched before shutdown was observed
        dispatched: usize,
    },
    /// All dispatched items drained
    BatchFinished {
        /// Items that reached a terminal state
        completed: usize,
        /// Whether the batch was interrupted
        interrupted: bool,
    },
}
