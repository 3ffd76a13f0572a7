//! Model-backed pipeline stages
//!
//! [`Extractor`] and [`Validator`] are the seams the item pipeline calls. The
//! default implementations, [`LlmExtractor`] and [`LlmJudge`], share a
//! [`ChatClient`] speaking the OpenAI-compatible chat completions protocol.

use async_trait::async_trait;

use crate::error::ModelError;
use crate::types::{Record, TokenUsage, VerdictSet};

mod client;
mod extractor;
mod judge;
pub mod prompts;

pub use client::{ChatClient, ChatCompletion};
pub use extractor::LlmExtractor;
pub use judge::LlmJudge;

/// Value produced by a model call plus its reported usage
#[derive(Clone, Debug, PartialEq)]
pub struct ModelOutput<T> {
    /// Parsed model output
    pub value: T,
    /// Token usage, when the endpoint reported it
    pub usage: Option<TokenUsage>,
}

impl<T> ModelOutput<T> {
    /// Output without usage data
    pub fn without_usage(value: T) -> Self {
        Self { value, usage: None }
    }
}

/// Produces a [`Record`] from reduced page text
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract a profile
    ///
    /// The returned record's `source_url` is filled in by the caller.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`]; schema-invalid output is
    /// [`ModelError::InvalidOutput`] and is never retried.
    async fn extract(&self, text: &str) -> Result<ModelOutput<Record>, ModelError>;
}

/// Judges a [`Record`] against the text it was extracted from
#[async_trait]
pub trait Validator: Send + Sync {
    /// Produce a verdict for every extractable field
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`], classified like [`Extractor::extract`].
    async fn judge(&self, text: &str, record: &Record) -> Result<ModelOutput<VerdictSet>, ModelError>;
}
