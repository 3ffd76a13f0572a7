//! Configuration types for profile-extract
//!
//! Every field has a default, so `Config::default()` runs a batch against the
//! OpenAI-compatible Gemini endpoint with the pacing and retry behavior used
//! in production. A config file only needs the keys it overrides.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Page fetching configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Pacing delay before every request (default: 2000 ms)
    #[serde(default = "default_request_delay", with = "duration_ms_serde")]
    pub request_delay: Duration,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_delay: default_request_delay(),
            timeout: default_fetch_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry behavior for stage calls that fail with a retriable error
///
/// `max_attempts` counts every call, so `max_attempts = 3` means one initial
/// call plus at most two retries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum calls per stage, first attempt included (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 500 ms)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Cap on the delay between retries (default: 8000 ms)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Batch driver configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum items processed concurrently (default: 2)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// HTML reduction configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReduceConfig {
    /// Upper bound on reduced text length in characters (default: 20000)
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Reduced text shorter than this is logged as suspicious (default: 100)
    #[serde(default = "default_min_chars_warning")]
    pub min_chars_warning: usize,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            min_chars_warning: default_min_chars_warning(),
        }
    }
}

/// Model endpoint configuration shared by the extractor and the judge
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for extraction
    #[serde(default = "default_model_name")]
    pub extraction_model: String,

    /// Model used for validation
    #[serde(default = "default_model_name")]
    pub judge_model: String,

    /// Sampling temperature for both models (default: 0.1)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-call timeout (default: 60 seconds)
    #[serde(default = "default_model_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            api_key_env: default_api_key_env(),
            extraction_model: default_model_name(),
            judge_model: default_model_name(),
            temperature: default_temperature(),
            timeout: default_model_timeout(),
        }
    }
}

/// Unit price of a model in USD per million tokens
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    /// Price per million prompt tokens
    pub input_per_million: f64,
    /// Price per million completion tokens
    pub output_per_million: f64,
}

impl ModelPrice {
    /// Cost in USD of a call with the given token counts
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_million
            + output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Per-model pricing table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable(pub HashMap<String, ModelPrice>);

impl PricingTable {
    /// Cost of a call, `None` when the model has no configured price
    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
        self.0
            .get(model)
            .map(|price| price.cost(input_tokens, output_tokens))
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut prices = HashMap::new();
        prices.insert(
            default_model_name(),
            ModelPrice {
                input_per_million: 0.35,
                output_per_million: 0.70,
            },
        );
        Self(prices)
    }
}

/// Report output configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for report files (default: "output")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// File stem for report files (default: "extracted_profiles")
    #[serde(default = "default_file_stem")]
    pub file_stem: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_stem: default_file_stem(),
        }
    }
}

/// Main configuration
///
/// Sections:
/// - [`fetch`](FetchConfig): pacing delay, timeout, user agent
/// - [`retry`](RetryConfig): attempts and backoff for retriable stage errors
/// - [`batch`](BatchConfig): concurrency limit
/// - [`reduce`](ReduceConfig): bounds on reduced text
/// - [`models`](ModelConfig): model endpoint and model names
/// - [`pricing`](PricingTable): per-model token prices
/// - [`output`](OutputConfig): where reports are written
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Page fetching
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Stage retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Batch driver
    #[serde(default)]
    pub batch: BatchConfig,

    /// HTML reduction
    #[serde(default)]
    pub reduce: ReduceConfig,

    /// Model endpoint
    #[serde(default)]
    pub models: ModelConfig,

    /// Token prices
    #[serde(default)]
    pub pricing: PricingTable,

    /// Report output
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load and validate a JSON config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON for
    /// this schema, or fails [`Config::validate`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid key.
    pub fn validate(&self) -> Result<()> {
        if self.batch.max_concurrency == 0 {
            return Err(Error::config(
                "batch.max_concurrency",
                "max_concurrency must be at least 1",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "retry.max_attempts",
                "max_attempts must be at least 1",
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "backoff_multiplier must be >= 1.0",
            ));
        }
        if self.retry.initial_delay > self.retry.max_delay {
            return Err(Error::config(
                "retry.initial_delay",
                "initial_delay must not exceed max_delay",
            ));
        }
        if self.reduce.max_chars == 0 {
            return Err(Error::config(
                "reduce.max_chars",
                "max_chars must be at least 1",
            ));
        }
        Ok(())
    }
}

fn default_request_delay() -> Duration {
    Duration::from_millis(2000)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_millis(8000)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_concurrency() -> usize {
    2
}

fn default_max_chars() -> usize {
    20_000
}

fn default_min_chars_warning() -> usize {
    100
}

fn default_model_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_model_name() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_model_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_file_stem() -> String {
    "extracted_profiles".to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds), for sub-second delays
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
