//! Error types for profile-extract
//!
//! This module provides the error handling for the library:
//! - A crate-level [`Error`] for configuration, I/O and batch-driver faults
//! - Stage errors ([`FetchError`], [`ReduceError`], [`ModelError`]) raised by the
//!   pipeline collaborators, each classified as retriable or permanent
//! - [`ErrorInfo`], the serializable record of a stage failure stored on an item
//!
//! Stage errors never escape the item pipeline. They are converted into
//! [`ErrorInfo`] and the item terminates in the failed state.

use crate::types::Stage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for profile-extract operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for profile-extract
///
/// Returned by configuration loading, report writing and the batch driver.
/// Individual item failures are never reported through this type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch.max_concurrency")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error while building or using an HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The worker pool could not hand out a slot (semaphore closed)
    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),

    /// A worker task panicked or was aborted while processing an item
    #[error("worker for item {index} ({url}) failed: {reason}")]
    WorkerPanicked {
        /// Position of the item in the input list
        index: usize,
        /// URL the worker was processing
        url: String,
        /// Panic or abort description from the runtime
        reason: String,
    },

    /// Shutdown requested before the operation could start
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a config key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::WorkerPool(_) => "worker_pool_error",
            Error::WorkerPanicked { .. } => "worker_panicked",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

/// Errors raised while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    /// The input string is not a fetchable absolute URL
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending input
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// The request did not complete within the configured timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection could not be established or was reset
    #[error("connection failed: {0}")]
    Connect(String),

    /// The server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// The response body could not be read or decoded
    #[error("failed to read response body: {0}")]
    Body(String),

    /// Any other transport-level failure
    #[error("request failed: {0}")]
    Transport(String),
}

impl FetchError {
    /// Stable short identifier used in [`ErrorInfo::kind`]
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl { .. } => "invalid_url",
            FetchError::Timeout(_) => "timeout",
            FetchError::Connect(_) => "connect",
            FetchError::Status { .. } => "http_status",
            FetchError::Body(_) => "body",
            FetchError::Transport(_) => "transport",
        }
    }

    /// HTTP status code, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors raised while reducing raw HTML into model input
#[derive(Debug, Error)]
pub enum ReduceError {
    /// The fetched document was empty
    #[error("no content to reduce")]
    EmptyInput,

    /// Neither a main container nor a body element was found
    #[error("could not locate a content container in the document")]
    NoContainer,

    /// A container was found but it holds no text
    #[error("content container holds no text")]
    NoText,
}

impl ReduceError {
    /// Stable short identifier used in [`ErrorInfo::kind`]
    pub fn kind(&self) -> &'static str {
        match self {
            ReduceError::EmptyInput => "empty_input",
            ReduceError::NoContainer => "no_container",
            ReduceError::NoText => "no_text",
        }
    }
}

/// Errors raised by the extraction or judging model
///
/// The same taxonomy serves both model stages: API failures are retriable when
/// transient, malformed model output is never retried.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No API key available for the model endpoint
    #[error("model credentials missing: {0}")]
    MissingCredentials(String),

    /// The model call did not complete within the configured timeout
    #[error("model request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint rejected the call because of rate limiting
    #[error("model API rate limited (HTTP {status})")]
    RateLimited {
        /// HTTP status code (usually 429)
        status: u16,
    },

    /// The endpoint answered with a non-success status
    #[error("model API returned HTTP {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error body or summary
        message: String,
    },

    /// The call failed below HTTP (connection reset, DNS, ...)
    #[error("model transport error: {0}")]
    Transport(String),

    /// The model answered but its output does not match the expected schema
    #[error("model output failed schema validation: {0}")]
    InvalidOutput(String),
}

impl ModelError {
    /// Stable short identifier used in [`ErrorInfo::kind`]
    pub fn kind(&self) -> &'static str {
        match self {
            ModelError::MissingCredentials(_) => "missing_credentials",
            ModelError::Timeout(_) => "timeout",
            ModelError::RateLimited { .. } => "rate_limited",
            ModelError::Api { .. } => "api_error",
            ModelError::Transport(_) => "transport",
            ModelError::InvalidOutput(_) => "invalid_output",
        }
    }

    /// HTTP status code, when the endpoint answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ModelError::RateLimited { status } | ModelError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Whether an HTTP status is worth retrying
///
/// Request timeout, too early, rate limiting and the usual gateway/server
/// hiccups are transient. Everything else (404, 401, 400, ...) is permanent.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

/// Serializable description of the failure that terminated an item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stage that failed
    pub stage: Stage,
    /// Short machine-readable error class (e.g., "http_status", "invalid_output")
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Whether the error class is retriable (true means retries were exhausted)
    pub retriable: bool,
    /// Number of calls made to the failing stage
    pub attempts: u32,
    /// HTTP status code, when one was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Conversion of a stage error into its [`ErrorInfo`] parts
pub trait StageFailure: std::fmt::Display {
    /// Stable short identifier of the error class
    fn failure_kind(&self) -> &'static str;

    /// HTTP status code, if any
    fn failure_status(&self) -> Option<u16> {
        None
    }
}

impl StageFailure for FetchError {
    fn failure_kind(&self) -> &'static str {
        self.kind()
    }

    fn failure_status(&self) -> Option<u16> {
        self.status()
    }
}

impl StageFailure for ReduceError {
    fn failure_kind(&self) -> &'static str {
        self.kind()
    }
}

impl StageFailure for ModelError {
    fn failure_kind(&self) -> &'static str {
        self.kind()
    }

    fn failure_status(&self) -> Option<u16> {
        self.status()
    }
}

impl ErrorInfo {
    /// Build an [`ErrorInfo`] from a stage error
    pub fn from_stage_error<E>(stage: Stage, error: &E, retriable: bool, attempts: u32) -> Self
    where
        E: StageFailure,
    {
        Self {
            stage,
            kind: error.failure_kind().to_string(),
            message: error.to_string(),
            retriable,
            attempts,
            status: error.failure_status(),
        }
    }
}
