//! `BedrockClient` against a mock Bedrock server.
//!
//! Covers the Converse, ConverseStream and ListFoundationModels calls: URL layout,
//! bearer auth, request body shape, event-stream decoding and error mapping.

use bedrock_gateway::backend::{Backend, BedrockClient};
use bedrock_gateway::translate::bedrock_types::ConverseStreamEvent;
use bedrock_gateway::translate::openai_types::{ChatMessage, ChatRequest, Role};
use bedrock_gateway::translate::request::{build_call_params, InferenceDefaults};
use bedrock_gateway::GatewayError;
use futures::StreamExt;
use std::collections::HashMap;
use wiremock::{
    matchers::{body_partial_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const HAIKU: &str = "anthropic.claude-3-haiku-20240307-v1:0";

fn client(server: &MockServer, api_key: Option<&str>) -> BedrockClient {
    BedrockClient::new(
        reqwest::Client::new(),
        &server.uri(),
        &server.uri(),
        api_key.map(String::from),
    )
    .expect("mock URI should be a valid base")
}

fn params() -> bedrock_gateway::translate::bedrock_types::BackendCallParams {
    let req = ChatRequest {
        model: Some(HAIKU.to_string()),
        messages: vec![
            ChatMessage::new(Role::System, "Be brief."),
            ChatMessage::new(Role::User, "Hi"),
        ],
        max_tokens: Some(64),
        ..ChatRequest::default()
    };
    build_call_params(&req, HAIKU, &InferenceDefaults::default(), &HashMap::new())
}

#[tokio::test]
async fn test_converse_request_and_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/model/{HAIKU}/converse")))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "messages": [{"role": "user", "content": [{"text": "Hi"}]}],
            "system": [{"text": "Be brief."}],
            "inferenceConfig": {"maxTokens": 64, "topP": 0.9, "stopSequences": ["\n\nHuman:"]},
            "additionalModelRequestFields": {"top_k": 250}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "output": {"message": {"role": "assistant", "content": [{"text": "Hello!"}]}},
            "stopReason": "end_turn",
            "usage": {"inputTokens": 9, "outputTokens": 2, "totalTokens": 11},
            "metrics": {"latencyMs": 321}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server, Some("test-key"))
        .converse(&params())
        .await
        .expect("converse should succeed");

    assert_eq!(reply.stop_reason, "end_turn");
    assert_eq!(reply.output.message.content[0].text.as_deref(), Some("Hello!"));
    assert_eq!(reply.usage.input_tokens, 9);
    assert_eq!(reply.usage.output_tokens, 2);
}

#[tokio::test]
async fn test_converse_error_carries_backend_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/model/{HAIKU}/converse")))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "message": "The provided model identifier is invalid."
        })))
        .mount(&server)
        .await;

    let err = client(&server, None).converse(&params()).await.unwrap_err();

    match err {
        GatewayError::Backend { message } => {
            assert_eq!(message, "The provided model identifier is invalid.");
        }
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_converse_non_json_error_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/model/{HAIKU}/converse")))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let err = client(&server, None).converse(&params()).await.unwrap_err();
    assert!(err.to_string().contains("503"));
    assert!(err.to_string().contains("Service Unavailable"));
}

/// One event-stream frame with string headers: prelude, headers, payload and
/// both CRC-32 checksums.
fn frame(headers: &[(&str, &str)], payload: &str) -> Vec<u8> {
    let mut encoded_headers = Vec::new();
    for (name, value) in headers {
        encoded_headers.push(name.len() as u8);
        encoded_headers.extend_from_slice(name.as_bytes());
        encoded_headers.push(7);
        encoded_headers.extend_from_slice(&(value.len() as u16).to_be_bytes());
        encoded_headers.extend_from_slice(value.as_bytes());
    }

    let total = 12 + encoded_headers.len() + payload.len() + 4;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_be_bytes());
    out.extend_from_slice(&(encoded_headers.len() as u32).to_be_bytes());
    let prelude_crc = crc32fast::hash(&out);
    out.extend_from_slice(&prelude_crc.to_be_bytes());
    out.extend_from_slice(&encoded_headers);
    out.extend_from_slice(payload.as_bytes());
    let message_crc = crc32fast::hash(&out);
    out.extend_from_slice(&message_crc.to_be_bytes());
    out
}

fn event(event_type: &str, payload: &str) -> Vec<u8> {
    frame(
        &[
            (":message-type", "event"),
            (":event-type", event_type),
            (":content-type", "application/json"),
        ],
        payload,
    )
}

fn exception(exception_type: &str, payload: &str) -> Vec<u8> {
    frame(
        &[
            (":message-type", "exception"),
            (":exception-type", exception_type),
            (":content-type", "application/json"),
        ],
        payload,
    )
}

fn event_stream_body(frames: &[Vec<u8>]) -> Vec<u8> {
    frames.concat()
}

#[tokio::test]
async fn test_converse_stream_decodes_events() {
    let server = MockServer::start().await;

    let body = event_stream_body(&[
        event("messageStart", r#"{"role":"assistant"}"#),
        event("contentBlockDelta", r#"{"contentBlockIndex":0,"delta":{"text":"Hel"}}"#),
        event("contentBlockDelta", r#"{"contentBlockIndex":0,"delta":{"text":"lo"}}"#),
        event("contentBlockStop", r#"{"contentBlockIndex":0}"#),
        event("messageStop", r#"{"stopReason":"end_turn"}"#),
        event(
            "metadata",
            r#"{"usage":{"inputTokens":9,"outputTokens":2,"totalTokens":11},"metrics":{"latencyMs":100}}"#,
        ),
    ]);

    Mock::given(method("POST"))
        .and(path(format!("/model/{HAIKU}/converse-stream")))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "application/vnd.amazon.eventstream"),
        )
        .mount(&server)
        .await;

    let events: Vec<ConverseStreamEvent> = client(&server, None)
        .converse_stream(&params())
        .await
        .expect("stream should start")
        .map(|e| e.expect("event should decode"))
        .collect()
        .await;

    assert_eq!(events.len(), 6);
    assert_eq!(events[1], ConverseStreamEvent::text_delta("Hel"));
    assert_eq!(events[2], ConverseStreamEvent::text_delta("lo"));
    assert_eq!(events[4], ConverseStreamEvent::message_stop("end_turn"));
}

#[tokio::test]
async fn test_converse_stream_exception_frame_is_error() {
    let server = MockServer::start().await;

    let body = event_stream_body(&[
        event("contentBlockDelta", r#"{"contentBlockIndex":0,"delta":{"text":"Hi"}}"#),
        exception("throttlingException", r#"{"message":"Too many requests"}"#),
    ]);

    Mock::given(method("POST"))
        .and(path(format!("/model/{HAIKU}/converse-stream")))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "application/vnd.amazon.eventstream"),
        )
        .mount(&server)
        .await;

    let items: Vec<_> = client(&server, None)
        .converse_stream(&params())
        .await
        .expect("stream should start")
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    let err = items[1].as_ref().unwrap_err();
    assert!(err.to_string().contains("throttlingException: Too many requests"));
}

#[tokio::test]
async fn test_converse_stream_http_error_before_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/model/{HAIKU}/converse-stream")))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "Message": "Authentication failed"
        })))
        .mount(&server)
        .await;

    let result = client(&server, None).converse_stream(&params()).await;
    match result {
        Err(GatewayError::Backend { message }) => assert_eq!(message, "Authentication failed"),
        Err(other) => panic!("expected backend error, got {other:?}"),
        Ok(_) => panic!("expected an error"),
    }
}

#[tokio::test]
async fn test_list_foundation_models() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/foundation-models"))
        .and(query_param("byInferenceType", "ON_DEMAND"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "modelSummaries": [{
                "modelArn": "arn:aws:bedrock:us-west-2::foundation-model/anthropic.claude-3-haiku-20240307-v1:0",
                "modelId": HAIKU,
                "modelName": "Claude 3 Haiku",
                "providerName": "Anthropic",
                "inputModalities": ["TEXT", "IMAGE"],
                "outputModalities": ["TEXT"],
                "responseStreamingSupported": true,
                "inferenceTypesSupported": ["ON_DEMAND"]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let models = client(&server, None)
        .list_foundation_models()
        .await
        .expect("listing should succeed");

    assert_eq!(models.len(), 1);
    assert_eq!(models[0].model_id, HAIKU);
    assert_eq!(models[0].provider_name.as_deref(), Some("Anthropic"));
    assert_eq!(models[0].input_modalities, ["TEXT", "IMAGE"]);
    assert_eq!(models[0].maximum_input_token_count, None);
}
