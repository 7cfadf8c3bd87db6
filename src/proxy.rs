//! Request orchestration between the HTTP handlers and the backend.
//!
//! Builds call parameters, invokes the backend, translates the result and writes
//! the audit log. Streaming requests are checked for an early failure before the
//! response starts.

use crate::backend::Backend;
use crate::catalog::{ModelList, StaticCatalog};
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::logging::{CompletionAudit, SharedLogger};
use crate::pricing::CostCalculator;
use crate::translate::bedrock_types::BackendCallParams;
use crate::translate::openai_types::{ChatCompletionResponse, ChatRequest};
use crate::translate::request::build_call_params;
use crate::translate::response::converse_to_chat;
use crate::translate::streaming::{first_items, translate_stream, StreamItem, StreamTranslator};

use futures::stream::{self, Stream};
use futures::StreamExt;
use std::pin::Pin;

/// Outcome of proxying a streaming request: chunks followed by `[DONE]`, or an
/// error item that ends the stream early.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamItem>> + Send>>;

fn call_params(req: &ChatRequest, config: &GatewayConfig) -> BackendCallParams {
    build_call_params(req, &config.default_model, &config.defaults, &config.models)
}

/// Run a one-shot completion and translate the reply.
pub async fn proxy_non_streaming(
    req: &ChatRequest,
    config: &GatewayConfig,
    backend: &dyn Backend,
    costs: &CostCalculator,
    logger: &SharedLogger,
) -> Result<ChatCompletionResponse> {
    let params = call_params(req, config);

    logger.info(
        "proxy",
        format!(
            "converse model={} messages={}",
            params.model_id,
            params.messages.len()
        ),
    );

    let reply = backend.converse(&params).await?;
    let response = converse_to_chat(&reply, &params.model_id);

    let cost = costs.calculate_costs(
        &params.model_id,
        reply.usage.input_tokens,
        reply.usage.output_tokens,
    );
    logger.completion(&CompletionAudit::new(&params.model_id, reply.usage, cost));

    Ok(response)
}

/// Start a streaming completion.
///
/// Waits for the first translated items so that a backend failure before any
/// output is reported as an ordinary request error.
pub async fn proxy_streaming(
    req: &ChatRequest,
    config: &GatewayConfig,
    backend: &dyn Backend,
    logger: &SharedLogger,
) -> Result<ChunkStream> {
    let params = call_params(req, config);

    logger.info(
        "proxy",
        format!(
            "converse-stream model={} messages={}",
            params.model_id,
            params.messages.len()
        ),
    );

    let mut events = backend.converse_stream(&params).await?;
    let mut translator = StreamTranslator::new(&params.model_id);
    let first = first_items(&mut translator, &mut events).await?;

    let logger = logger.clone();
    let model = params.model_id;
    let rest = translate_stream(events, translator).inspect(move |item| match item {
        Ok(StreamItem::Done) => logger.info("stream", format!("Stream completed model={model}")),
        Ok(StreamItem::Chunk(_)) => {}
        Err(e) => logger.error("stream", format!("Stream aborted model={model}: {e}")),
    });

    Ok(Box::pin(stream::iter(first.into_iter().map(Ok)).chain(rest)))
}

/// Fetch the live model listing and merge it with the static catalog.
pub async fn list_models(backend: &dyn Backend, catalog: &StaticCatalog) -> Result<ModelList> {
    let summaries = backend.list_foundation_models().await?;
    let data = catalog.merge(&summaries);
    tracing::debug!(live = summaries.len(), listed = data.len(), "Merged model catalog");
    Ok(ModelList { data })
}
