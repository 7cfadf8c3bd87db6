//! Merge the live Bedrock model listing with static metadata into one catalog.
//!
//! Each field resolves in order: a live value that is present and non-zero, then the
//! static record for the same id, then a fixed default. Entries whose id is not on
//! the provider allow-list are dropped, and the backend's listing order is kept.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{ModelMetadata, ModelMetadataTable};
use crate::pricing::decimal_from_f64;
use crate::providers::ProviderAllowList;
use crate::translate::bedrock_types::FoundationModelSummary;

const UNKNOWN_TOKENIZER: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub context_length: u64,
    pub architecture: Architecture,
    pub pricing: ModelPricing,
    pub top_provider: TopProvider,
    pub per_request_limits: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    pub modality: String,
    pub tokenizer: String,
    pub instruct_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(with = "rust_decimal::serde::float")]
    pub prompt: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub completion: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub image: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub request: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopProvider {
    pub context_length: u64,
    pub max_completion_tokens: Option<u64>,
    pub is_moderated: bool,
}

/// Body of the model listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub data: Vec<ModelDescriptor>,
}

/// Process-wide, read-only inputs to the merge.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    pub allow_list: ProviderAllowList,
    pub metadata: ModelMetadataTable,
}

impl StaticCatalog {
    pub fn new(allow_list: ProviderAllowList, metadata: ModelMetadataTable) -> Self {
        Self {
            allow_list,
            metadata,
        }
    }

    #[must_use]
    pub fn merge(&self, summaries: &[FoundationModelSummary]) -> Vec<ModelDescriptor> {
        merge_catalog(summaries, &self.allow_list, &self.metadata)
    }
}

/// Merge live summaries with static metadata, keeping only allowed providers.
#[must_use]
pub fn merge_catalog(
    summaries: &[FoundationModelSummary],
    allow_list: &ProviderAllowList,
    metadata: &ModelMetadataTable,
) -> Vec<ModelDescriptor> {
    summaries
        .iter()
        .filter(|s| allow_list.allows(&s.model_id))
        .map(|s| describe(s, metadata.get(&s.model_id)))
        .collect()
}

/// `text+image->text` style modality string.
#[must_use]
pub fn modality(summary: &FoundationModelSummary) -> String {
    format!(
        "{}->{}",
        summary.input_modalities.join("+"),
        summary.output_modalities.join("+")
    )
    .to_lowercase()
}

fn describe(live: &FoundationModelSummary, stored: Option<&ModelMetadata>) -> ModelDescriptor {
    let live_input_limit = live_count(live.maximum_input_token_count);

    let name = Some(live.model_name.clone())
        .filter(|n| !n.is_empty())
        .or_else(|| stored.and_then(|m| m.name.clone()))
        .unwrap_or_else(|| live.model_id.clone());

    ModelDescriptor {
        id: live.model_id.clone(),
        name,
        context_length: live_input_limit
            .or_else(|| stored.and_then(|m| m.context_length))
            .unwrap_or(0),
        architecture: Architecture {
            modality: modality(live),
            tokenizer: stored
                .and_then(|m| m.architecture.tokenizer.clone())
                .unwrap_or_else(|| UNKNOWN_TOKENIZER.to_string()),
            instruct_type: stored.and_then(|m| m.architecture.instruct_type.clone()),
        },
        pricing: ModelPricing {
            prompt: live_price(live.input_token_price_per_unit)
                .or_else(|| stored.and_then(|m| m.pricing.prompt))
                .unwrap_or(Decimal::ZERO),
            completion: live_price(live.output_token_price_per_unit)
                .or_else(|| stored.and_then(|m| m.pricing.completion))
                .unwrap_or(Decimal::ZERO),
            image: stored
                .and_then(|m| m.pricing.image)
                .unwrap_or(Decimal::ZERO),
            request: stored
                .and_then(|m| m.pricing.request)
                .unwrap_or(Decimal::ZERO),
        },
        top_provider: TopProvider {
            context_length: live_input_limit
                .or_else(|| stored.and_then(|m| m.top_provider.context_length))
                .unwrap_or(0),
            max_completion_tokens: live_count(live.maximum_output_token_count)
                .or_else(|| stored.and_then(|m| m.top_provider.max_completion_tokens)),
            is_moderated: stored
                .and_then(|m| m.top_provider.is_moderated)
                .unwrap_or(false),
        },
        per_request_limits: stored
            .and_then(|m| m.per_request_limits.clone())
            .filter(|v| !v.is_null()),
    }
}

fn live_count(value: Option<u64>) -> Option<u64> {
    value.filter(|n| *n != 0)
}

fn live_price(value: Option<f64>) -> Option<Decimal> {
    value.filter(|p| *p != 0.0).and_then(decimal_from_f64)
}
