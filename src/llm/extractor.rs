use async_trait::async_trait;

use super::{ChatClient, Extractor, ModelOutput, prompts};
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::types::Record;

/// Extraction stage backed by a chat model
#[derive(Clone, Debug)]
pub struct LlmExtractor {
    client: ChatClient,
    model: String,
    temperature: f32,
}

impl LlmExtractor {
    /// Create an extractor using `config.extraction_model`
    pub fn new(client: ChatClient, config: &ModelConfig) -> Self {
        Self {
            client,
            model: config.extraction_model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(&self, text: &str) -> Result<ModelOutput<Record>, ModelError> {
        let completion = self
            .client
            .complete_json(
                &self.model,
                self.temperature,
                prompts::EXTRACTION_SYSTEM,
                &prompts::extraction_user(text),
            )
            .await?;

        let record = parse_record(&completion.content)?;
        tracing::debug!(
            model = %self.model,
            populated = record.populated_count(),
            "Extracted profile"
        );

        Ok(ModelOutput {
            value: record,
            usage: completion.usage,
        })
    }
}

fn parse_record(content: &str) -> Result<Record, ModelError> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| ModelError::InvalidOutput(format!("extraction output is not JSON: {}", e)))?;
    if !value.is_object() {
        return Err(ModelError::InvalidOutput(
            "extraction output is not a JSON object".to_string(),
        ));
    }
    let mut record: Record = serde_json::from_value(value)
        .map_err(|e| ModelError::InvalidOutput(format!("extraction output does not match profile schema: {}", e)))?;
    // Provenance comes from the pipeline, never from the model
    record.source_url.clear();
    Ok(record)
}
