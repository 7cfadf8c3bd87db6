//! Translate unified chat requests into Bedrock Converse invocation parameters.
//!
//! System messages are lifted out of the conversation into the `system` field (the
//! last one wins), every other message keeps its position, and an uploaded file is
//! appended as the most recent user turn.

use std::collections::HashMap;
use std::hash::BuildHasher;

use serde::{Deserialize, Serialize};

use super::bedrock_types::{
    AdditionalModelRequestFields, BackendCallParams, BackendMessage, InferenceConfig, TextBlock,
};
use super::openai_types::{Attachment, ChatRequest, Role};

pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-5-sonnet-20240620-v1:0";

/// Read-only template of inference parameters applied when a request omits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceDefaults {
    pub max_tokens: u64,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u64,
    pub stop_sequences: Vec<String>,
}

impl Default for InferenceDefaults {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.0,
            top_p: 0.9,
            top_k: 250,
            stop_sequences: vec!["\n\nHuman:".to_string()],
        }
    }
}

/// Translate a unified chat request into Converse parameters.
/// Pure function: every call builds a fresh value from the defaults template.
pub fn build_call_params<S: BuildHasher>(
    req: &ChatRequest,
    default_model: &str,
    defaults: &InferenceDefaults,
    aliases: &HashMap<String, String, S>,
) -> BackendCallParams {
    let requested = req.model.as_deref().unwrap_or(default_model);
    let model_id = aliases
        .get(requested)
        .cloned()
        .unwrap_or_else(|| requested.to_string());

    let mut system = Vec::new();
    let mut messages = Vec::with_capacity(req.messages.len() + 1);

    for msg in &req.messages {
        match msg.role {
            // Later system messages replace earlier ones.
            Role::System => system = vec![TextBlock::new(msg.content.clone())],
            Role::User | Role::Assistant => messages.push(BackendMessage {
                role: msg.role.as_str().to_string(),
                content: vec![TextBlock::new(msg.content.clone())],
            }),
        }
    }

    if let Some(ref attachment) = req.attachment {
        messages.push(BackendMessage {
            role: Role::User.as_str().to_string(),
            content: vec![TextBlock::new(attachment_prompt(attachment))],
        });
    }

    BackendCallParams {
        model_id,
        messages,
        inference_config: InferenceConfig {
            max_tokens: req.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: req.temperature.unwrap_or(defaults.temperature),
            top_p: defaults.top_p,
            stop_sequences: defaults.stop_sequences.clone(),
        },
        system,
        additional_model_request_fields: AdditionalModelRequestFields {
            top_k: defaults.top_k,
        },
    }
}

/// Prompt asking the model to analyze an uploaded file.
#[must_use]
pub fn attachment_prompt(attachment: &Attachment) -> String {
    format!(
        "Please analyze the content of the uploaded file \"{}\":\n\n{}",
        attachment.filename, attachment.content
    )
}
