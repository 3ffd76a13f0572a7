use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{ChatClient, ModelOutput, Validator, prompts};
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::types::{FieldName, FieldStatus, FieldVerdict, Record, VerdictSet};

/// Validation stage backed by a judging chat model
#[derive(Clone, Debug)]
pub struct LlmJudge {
    client: ChatClient,
    model: String,
    temperature: f32,
}

impl LlmJudge {
    /// Create a judge using `config.judge_model`
    pub fn new(client: ChatClient, config: &ModelConfig) -> Self {
        Self {
            client,
            model: config.judge_model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl Validator for LlmJudge {
    async fn judge(&self, text: &str, record: &Record) -> Result<ModelOutput<VerdictSet>, ModelError> {
        let extracted = extracted_json(record)?;
        let completion = self
            .client
            .complete_json(
                &self.model,
                self.temperature,
                &prompts::judge_system(),
                &prompts::judge_user(text, &extracted),
            )
            .await?;

        let verdicts = parse_verdicts(&completion.content)?;
        tracing::debug!(
            model = %self.model,
            correct = verdicts
                .verdicts
                .values()
                .filter(|v| v.status == FieldStatus::Correct)
                .count(),
            "Judged profile"
        );

        Ok(ModelOutput {
            value: verdicts,
            usage: completion.usage,
        })
    }
}

/// Record as shown to the judge: extractable fields only
fn extracted_json(record: &Record) -> Result<String, ModelError> {
    let mut value = serde_json::to_value(record)
        .map_err(|e| ModelError::InvalidOutput(format!("failed to serialize record: {}", e)))?;
    if let Some(map) = value.as_object_mut() {
        map.remove("source_url");
    }
    serde_json::to_string_pretty(&value)
        .map_err(|e| ModelError::InvalidOutput(format!("failed to serialize record: {}", e)))
}

fn parse_status(raw: &str) -> Option<FieldStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "correct" => Some(FieldStatus::Correct),
        "incorrect" => Some(FieldStatus::Incorrect),
        "missing" => Some(FieldStatus::Missing),
        "not applicable" | "not_applicable" | "notapplicable" | "n/a" => {
            Some(FieldStatus::NotApplicable)
        }
        _ => None,
    }
}

/// Parse the judge's flat `<field>_status` object
///
/// Every extractable field must carry a recognized status.
fn parse_verdicts(content: &str) -> Result<VerdictSet, ModelError> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| ModelError::InvalidOutput(format!("judge output is not JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| ModelError::InvalidOutput("judge output is not a JSON object".to_string()))?;

    let mut verdicts = BTreeMap::new();
    for field in FieldName::ALL {
        let key = format!("{}_status", field);
        let raw = object
            .get(&key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ModelError::InvalidOutput(format!("judge output lacks '{}'", key)))?;
        let status = parse_status(raw).ok_or_else(|| {
            ModelError::InvalidOutput(format!("unknown status '{}' for {}", raw, field))
        })?;
        let reason = object
            .get(&format!("{}_reason", field))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        verdicts.insert(field, FieldVerdict { status, reason });
    }

    let overall_comment = object
        .get("overall_comment")
        .and_then(|v| v.as_str())
        .filter(|c| !c.trim().is_empty())
        .map(str::to_string);

    Ok(VerdictSet {
        verdicts,
        overall_comment,
    })
}
