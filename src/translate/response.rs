//! Converts a completed Converse reply into a Chat Completions response.

use super::bedrock_types::ConverseResponse;
use super::openai_types::{ChatCompletionResponse, ChatUsage, Choice, ChoiceMessage};

/// Fresh completion id in the `chatcmpl-<uuid>` format clients expect.
#[must_use]
pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4())
}

/// Current wall-clock time in epoch seconds.
#[must_use]
pub fn now_epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Translate a Converse reply into a Chat Completions response.
/// Pure apart from the generated id and timestamp. `model` is echoed back as given.
pub fn converse_to_chat(resp: &ConverseResponse, model: &str) -> ChatCompletionResponse {
    let content = resp
        .output
        .message
        .content
        .first()
        .and_then(|block| block.text.clone())
        .unwrap_or_default();

    ChatCompletionResponse {
        id: completion_id(),
        object: "chat.completion".to_string(),
        created: now_epoch_seconds(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: resp.output.message.role.clone(),
                content,
            },
            finish_reason: Some(resp.stop_reason.clone()),
        }],
        usage: ChatUsage::new(resp.usage.input_tokens, resp.usage.output_tokens),
    }
}
