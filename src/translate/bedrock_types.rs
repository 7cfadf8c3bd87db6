//! Type definitions for the [Amazon Bedrock Converse API](https://docs.aws.amazon.com/bedrock/latest/APIReference/API_runtime_Converse.html).
//!
//! Field names follow the Converse wire format (camelCase), so these types double as
//! request bodies and response decoders for the HTTP backend.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request types (what we send TO Bedrock)
// ---------------------------------------------------------------------------

/// Parameters for a single `converse` / `converse-stream` invocation.
///
/// Built fresh for every request; nothing here is shared across requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendCallParams {
    /// Carried in the URL path, not the body.
    #[serde(skip_serializing, default)]
    pub model_id: String,
    pub messages: Vec<BackendMessage>,
    pub inference_config: InferenceConfig,
    pub system: Vec<TextBlock>,
    pub additional_model_request_fields: AdditionalModelRequestFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendMessage {
    pub role: String,
    pub content: Vec<TextBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    pub max_tokens: u64,
    pub temperature: f64,
    pub top_p: f64,
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalModelRequestFields {
    pub top_k: u64,
}

// ---------------------------------------------------------------------------
// Response types (what Bedrock sends back from `converse`)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseResponse {
    pub output: ConverseOutput,
    pub stop_reason: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverseOutput {
    pub message: OutputMessage,
}

/// Assistant reply. Content blocks other than text (tool use, reasoning) are
/// decoded with `text: None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<OutputContentBlock>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputContentBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Error body returned by Bedrock for 4xx/5xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendErrorBody {
    #[serde(alias = "Message")]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Streaming event types (`converse-stream`)
// ---------------------------------------------------------------------------

/// One event of a `converse-stream` response, keyed by event type exactly as
/// the SDKs surface it: `{"contentBlockDelta": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConverseStreamEvent {
    MessageStart(MessageStartEvent),
    ContentBlockStart(ContentBlockIndexEvent),
    ContentBlockDelta(ContentBlockDeltaEvent),
    ContentBlockStop(ContentBlockIndexEvent),
    MessageStop(MessageStopEvent),
    Metadata(MetadataEvent),
}

impl ConverseStreamEvent {
    /// Event type names this decoder understands.
    pub const KNOWN_TYPES: &'static [&'static str] = &[
        "messageStart",
        "contentBlockStart",
        "contentBlockDelta",
        "contentBlockStop",
        "messageStop",
        "metadata",
    ];

    /// Build an event from the event-stream `:event-type` header and its JSON payload.
    ///
    /// Returns `Ok(None)` for event types this gateway does not handle.
    ///
    /// # Errors
    /// Returns a JSON error when a known event carries a malformed payload.
    pub fn from_typed_payload(
        event_type: &str,
        payload: &[u8],
    ) -> serde_json::Result<Option<Self>> {
        if !Self::KNOWN_TYPES.contains(&event_type) {
            return Ok(None);
        }

        let body: serde_json::Value = if payload.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_slice(payload)?
        };

        let mut tagged = serde_json::Map::new();
        tagged.insert(event_type.to_string(), body);
        serde_json::from_value(serde_json::Value::Object(tagged)).map(Some)
    }

    /// Shorthand for a text delta on block 0.
    pub fn text_delta(text: impl Into<String>) -> Self {
        Self::ContentBlockDelta(ContentBlockDeltaEvent {
            content_block_index: 0,
            delta: ContentDelta {
                text: Some(text.into()),
            },
        })
    }

    /// Shorthand for a `messageStop` event.
    pub fn message_stop(stop_reason: impl Into<String>) -> Self {
        Self::MessageStop(MessageStopEvent {
            stop_reason: stop_reason.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStartEvent {
    pub role: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockIndexEvent {
    #[serde(default)]
    pub content_block_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockDeltaEvent {
    #[serde(default)]
    pub content_block_index: u32,
    pub delta: ContentDelta,
}

/// Incremental content. Only text deltas are translated; tool-use and reasoning
/// deltas decode with `text: None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStopEvent {
    pub stop_reason: String,
}

/// Trailing usage and metrics frame. It arrives after `messageStop`, by which
/// point the stream is no longer read, so its fields are not decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataEvent {}

// ---------------------------------------------------------------------------
// Model listing (`ListFoundationModels`)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFoundationModelsResponse {
    #[serde(default)]
    pub model_summaries: Vec<FoundationModelSummary>,
}

/// A live model summary. Token limits and prices are not always reported, so
/// they stay optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundationModelSummary {
    pub model_id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub input_modalities: Vec<String>,
    #[serde(default)]
    pub output_modalities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_input_token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_output_token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_token_price_per_unit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_token_price_per_unit: Option<f64>,
}
