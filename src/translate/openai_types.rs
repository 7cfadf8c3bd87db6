//! Type definitions for the [OpenAI Chat Completions API](https://platform.openai.com/docs/api-reference/chat)
//! as clients speak it to the gateway.
//!
//! Requests are decoded leniently: form submissions carry every field as text, so
//! `max_tokens`, `temperature` and `stream` accept numeric/boolean strings, and
//! `messages` may arrive as a JSON-encoded string.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{GatewayError, Result};

// ---------------------------------------------------------------------------
// Request types (what clients send TO the gateway)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Decoded text of a file uploaded alongside the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "deserialize_messages")]
    pub messages: Vec<ChatMessage>,
    #[serde(
        default,
        deserialize_with = "deserialize_max_tokens",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_tokens: Option<u64>,
    #[serde(
        default,
        deserialize_with = "deserialize_temperature",
        skip_serializing_if = "Option::is_none"
    )]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl ChatRequest {
    /// Decode a JSON request body.
    ///
    /// # Errors
    /// Returns `GatewayError::Validation` when the body is not a well-formed chat request.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| GatewayError::validation(format!("Invalid request body: {e}")))
    }

    /// Decode an already-parsed JSON value (used for form submissions).
    ///
    /// # Errors
    /// Returns `GatewayError::Validation` when the value is not a well-formed chat request.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| GatewayError::validation(format!("Invalid request: {e}")))
    }
}

/// Scalar as it may appear in JSON or in a form field.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(u64),
    Float(f64),
    Bool(bool),
    Text(String),
}

fn deserialize_messages<'de, D>(deserializer: D) -> std::result::Result<Vec<ChatMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::String(encoded) => {
            serde_json::from_str(&encoded).map_err(|e| D::Error::custom(format!("messages: {e}")))
        }
        other => {
            Vec::<ChatMessage>::deserialize(other).map_err(|e| D::Error::custom(format!("messages: {e}")))
        }
    }
}

fn deserialize_max_tokens<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(value) = Option::<Loose>::deserialize(deserializer)? else {
        return Ok(None);
    };

    match value {
        Loose::Int(n) => Ok(Some(n)),
        // Fractional token counts are truncated toward zero.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Loose::Float(f) if f.is_finite() && f >= 0.0 => Ok(Some(f.trunc() as u64)),
        Loose::Text(s) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("max_tokens must be a non-negative integer, got {s:?}"))),
        _ => Err(D::Error::custom("max_tokens must be a non-negative integer")),
    }
}

fn deserialize_temperature<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(value) = Option::<Loose>::deserialize(deserializer)? else {
        return Ok(None);
    };

    let parsed = match value {
        #[allow(clippy::cast_precision_loss)]
        Loose::Int(n) => n as f64,
        Loose::Float(f) => f,
        Loose::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("temperature must be a number, got {s:?}")))?,
        Loose::Bool(_) => return Err(D::Error::custom("temperature must be a number")),
    };

    if parsed.is_finite() {
        Ok(Some(parsed))
    } else {
        Err(D::Error::custom("temperature must be a finite number"))
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Loose>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Loose::Bool(b)) => Ok(b),
        Some(Loose::Int(n)) => Ok(n != 0),
        Some(Loose::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            _ => Err(D::Error::custom(format!("stream must be a boolean, got {s:?}"))),
        },
        Some(Loose::Float(_)) => Err(D::Error::custom("stream must be a boolean")),
    }
}

// ---------------------------------------------------------------------------
// Response types (what the gateway sends BACK)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: ChatUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl ChatUsage {
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming chunk types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatErrorResponse {
    pub error: String,
}

impl ChatErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_strings_are_coerced() {
        let req = ChatRequest::from_value(json!({
            "model": "anthropic.claude-3-haiku-20240307-v1:0",
            "max_tokens": "100",
            "temperature": "0.7",
            "stream": "true",
            "messages": [{"role": "user", "content": "Hello"}]
        }))
        .unwrap();

        assert_eq!(req.max_tokens, Some(100));
        assert_eq!(req.temperature, Some(0.7));
        assert!(req.stream);
        assert_eq!(req.messages, vec![ChatMessage::new(Role::User, "Hello")]);
    }

    #[test]
    fn test_messages_may_be_json_encoded() {
        let req = ChatRequest::from_value(json!({
            "messages": "[{\"role\": \"user\", \"content\": \"Hello, how are you?\"}]"
        }))
        .unwrap();

        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].content, "Hello, how are you?");
        assert_eq!(req.max_tokens, None);
        assert!(!req.stream);
    }

    #[test]
    fn test_missing_role_is_validation_error() {
        let err = ChatRequest::from_json(br#"{"messages": [{"content": "hi"}]}"#).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("role"), "{err}");
    }

    #[test]
    fn test_missing_content_is_validation_error() {
        let err = ChatRequest::from_json(br#"{"messages": [{"role": "user"}]}"#).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("content"), "{err}");
    }

    #[test]
    fn test_non_numeric_temperature_is_rejected() {
        let err = ChatRequest::from_json(
            br#"{"temperature": "warm", "messages": [{"role": "user", "content": "hi"}]}"#,
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_non_numeric_max_tokens_is_rejected() {
        let err = ChatRequest::from_json(
            br#"{"max_tokens": "lots", "messages": [{"role": "user", "content": "hi"}]}"#,
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_fractional_max_tokens_truncates() {
        let req = ChatRequest::from_json(br#"{"max_tokens": 256.9, "messages": []}"#).unwrap();
        assert_eq!(req.max_tokens, Some(256));
    }

    #[test]
    fn test_chunk_serializes_null_finish_reason() {
        let chunk = ChatCompletionChunk {
            id: "chatcmpl-1".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 0,
            model: "m".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta::default(),
                finish_reason: None,
            }],
        };

        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["choices"][0]["finish_reason"], serde_json::Value::Null);
        assert_eq!(value["choices"][0]["delta"], json!({}));
    }
}
