//! Static model metadata loaded once at startup.
//!
//! The live Bedrock listing omits most of what catalog clients display (tokenizer,
//! moderation, image pricing), so the gateway ships a table of per-model details
//! in the OpenRouter catalog shape, `{"data": [...]}`. Prices are denominated per
//! 1000 tokens and may be written as JSON numbers or decimal strings.

use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{GatewayError, Result};
use crate::pricing::deserialize_optional_price;

/// One model's static details. Every field but `id` is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelMetadata {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub context_length: Option<u64>,
    #[serde(default)]
    pub architecture: ArchitectureMetadata,
    #[serde(default)]
    pub pricing: PricingMetadata,
    #[serde(default)]
    pub top_provider: TopProviderMetadata,
    #[serde(default)]
    pub per_request_limits: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArchitectureMetadata {
    #[serde(default)]
    pub tokenizer: Option<String>,
    #[serde(default)]
    pub instruct_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PricingMetadata {
    #[serde(default, deserialize_with = "deserialize_optional_price")]
    pub prompt: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_price")]
    pub completion: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_price")]
    pub image: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_price")]
    pub request: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TopProviderMetadata {
    #[serde(default)]
    pub context_length: Option<u64>,
    #[serde(default)]
    pub max_completion_tokens: Option<u64>,
    #[serde(default)]
    pub is_moderated: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct MetadataFile {
    data: Vec<ModelMetadata>,
}

/// Read-only lookup of static model metadata by exact model id.
#[derive(Debug, Clone, Default)]
pub struct ModelMetadataTable {
    records: HashMap<String, ModelMetadata>,
}

impl ModelMetadataTable {
    /// Parse a `{"data": [...]}` document.
    ///
    /// # Errors
    /// Returns `GatewayError::Config` if the document is malformed.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: MetadataFile = serde_json::from_str(content)
            .map_err(|e| GatewayError::config(format!("Invalid model metadata: {e}")))?;
        Ok(Self::from_records(file.data))
    }

    /// Later records with a duplicate id replace earlier ones.
    pub fn from_records(records: impl IntoIterator<Item = ModelMetadata>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    /// Load the table from a JSON file.
    ///
    /// # Errors
    /// Returns `GatewayError::Config` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!(
                "Failed to read model metadata {}: {}",
                path.display(),
                e
            ))
        })?;
        let table = Self::from_json_str(&content)?;
        tracing::info!(path = %path.display(), models = table.len(), "Loaded model metadata");
        Ok(table)
    }

    /// Load the table if a path is configured and present, otherwise start empty.
    ///
    /// # Errors
    /// Returns `GatewayError::Config` if an existing file is malformed.
    pub fn load_or_empty(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                tracing::warn!(
                    path = %path.display(),
                    "Model metadata file not found; catalog will use live data only"
                );
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    #[must_use]
    pub fn get(&self, model_id: &str) -> Option<&ModelMetadata> {
        self.records.get(model_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelMetadata> {
        self.records.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "data": [
            {
                "id": "anthropic.claude-3-haiku-20240307-v1:0",
                "name": "Claude 3 Haiku",
                "context_length": 200000,
                "architecture": {"modality": "text+image->text", "tokenizer": "Claude", "instruct_type": null},
                "pricing": {"prompt": 0.00025, "completion": "0.00125", "image": "0.0004", "request": "0"},
                "top_provider": {"context_length": 200000, "max_completion_tokens": 4096, "is_moderated": true},
                "per_request_limits": null
            },
            {"id": "openai.gpt-3.5-turbo", "pricing": {"prompt": 0.0005, "completion": 0.0015}}
        ]
    }"#;

    #[test]
    fn test_parse_table() {
        let table = ModelMetadataTable::from_json_str(SAMPLE).unwrap();
        assert_eq!(table.len(), 2);

        let haiku = table.get("anthropic.claude-3-haiku-20240307-v1:0").unwrap();
        assert_eq!(haiku.context_length, Some(200_000));
        assert_eq!(haiku.architecture.tokenizer.as_deref(), Some("Claude"));
        assert_eq!(haiku.pricing.prompt, Some(Decimal::from_str("0.00025").unwrap()));
        assert_eq!(haiku.pricing.completion, Some(Decimal::from_str("0.00125").unwrap()));
        assert_eq!(haiku.top_provider.is_moderated, Some(true));

        let sparse = table.get("openai.gpt-3.5-turbo").unwrap();
        assert_eq!(sparse.architecture, ArchitectureMetadata::default());
        assert_eq!(sparse.pricing.image, None);
    }

    #[test]
    fn test_lookup_is_exact() {
        let table = ModelMetadataTable::from_json_str(SAMPLE).unwrap();
        assert!(table.get("anthropic.claude-3-haiku").is_none());
    }

    #[test]
    fn test_malformed_table_is_config_error() {
        let err = ModelMetadataTable::from_json_str(r#"{"models": []}"#).unwrap_err();
        assert!(matches!(err, GatewayError::Config { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{SAMPLE}").unwrap();

        let table = ModelMetadataTable::load(f.path()).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_missing_file_yields_empty_table() {
        let table =
            ModelMetadataTable::load_or_empty(Some(Path::new("/nonexistent/details.json"))).unwrap();
        assert!(table.is_empty());
    }
}
