//! API translation between the `OpenAI` Chat Completions format and Bedrock Converse.
//!
//! The core of the gateway: converts requests, responses, and streaming events
//! between the two API formats. All translation functions are pure (no I/O).

pub mod bedrock_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
