//! The model backend the gateway dispatches to.
//!
//! [`Backend`] is the seam between the HTTP surface and Bedrock. [`BedrockClient`]
//! talks to the real Converse and control-plane endpoints over `reqwest`. Tests
//! substitute scripted implementations.

pub mod eventstream;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use reqwest::{RequestBuilder, Response, Url};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::translate::bedrock_types::{
    BackendCallParams, BackendErrorBody, ConverseResponse, ConverseStreamEvent,
    FoundationModelSummary, ListFoundationModelsResponse,
};

/// Lazy sequence of decoded stream events. Dropping it releases the connection.
pub type BackendEventStream = Pin<Box<dyn Stream<Item = Result<ConverseStreamEvent>> + Send>>;

const EVENTSTREAM_CONTENT_TYPE: &str = "application/vnd.amazon.eventstream";

#[async_trait]
pub trait Backend: Send + Sync {
    /// One-shot completion.
    async fn converse(&self, params: &BackendCallParams) -> Result<ConverseResponse>;

    /// Streaming completion. Errors before the response starts are returned
    /// directly; later ones arrive as stream items.
    async fn converse_stream(&self, params: &BackendCallParams) -> Result<BackendEventStream>;

    /// Foundation models available for on-demand inference.
    async fn list_foundation_models(&self) -> Result<Vec<FoundationModelSummary>>;
}

/// HTTP client for the Bedrock runtime and control-plane APIs.
#[derive(Debug, Clone)]
pub struct BedrockClient {
    http: reqwest::Client,
    runtime_url: Url,
    control_url: Url,
    api_key: Option<String>,
    inference_type: String,
}

impl BedrockClient {
    /// # Errors
    /// Returns `GatewayError::Config` if either base URL is invalid.
    pub fn new(
        http: reqwest::Client,
        runtime_url: &str,
        control_url: &str,
        api_key: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            http,
            runtime_url: parse_base_url(runtime_url)?,
            control_url: parse_base_url(control_url)?,
            api_key,
            inference_type: "ON_DEMAND".to_string(),
        })
    }

    /// Build a client from the `[backend]` section of the config.
    ///
    /// # Errors
    /// Returns `GatewayError::Config` for invalid URLs, or an HTTP error if the
    /// underlying client cannot be built.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.backend.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = Self::new(
            builder.build()?,
            &config.runtime_base_url(),
            &config.control_base_url(),
            config.resolve_api_key(),
        )?;
        Ok(client.with_inference_type(&config.backend.inference_type))
    }

    #[must_use]
    pub fn with_inference_type(mut self, inference_type: &str) -> Self {
        self.inference_type = inference_type.to_string();
        self
    }

    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn model_url(&self, model_id: &str, action: &str) -> Result<Url> {
        let mut url = self.runtime_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::config(format!("Invalid runtime URL {}", self.runtime_url)))?
            .pop_if_empty()
            .extend(["model", model_id, action]);
        Ok(url)
    }

    fn models_url(&self) -> Result<Url> {
        let mut url = self.control_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::config(format!("Invalid control URL {}", self.control_url)))?
            .pop_if_empty()
            .push("foundation-models");
        url.query_pairs_mut()
            .append_pair("byInferenceType", &self.inference_type);
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| GatewayError::backend(format!("{what} request failed: {e}")))?;
        check_status(response).await
    }
}

#[async_trait]
impl Backend for BedrockClient {
    async fn converse(&self, params: &BackendCallParams) -> Result<ConverseResponse> {
        let url = self.model_url(&params.model_id, "converse")?;
        tracing::debug!(%url, "Calling converse");

        let response = self
            .send(self.http.post(url).json(params), "converse")
            .await?;
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::backend(format!("Failed to read converse response: {e}")))?;

        serde_json::from_str(&body).map_err(|e| {
            GatewayError::backend(format!(
                "Failed to parse converse response: {}. Body: {}",
                e,
                truncate(&body, 300)
            ))
        })
    }

    async fn converse_stream(&self, params: &BackendCallParams) -> Result<BackendEventStream> {
        let url = self.model_url(&params.model_id, "converse-stream")?;
        tracing::debug!(%url, "Calling converse-stream");

        let response = self
            .send(
                self.http
                    .post(url)
                    .header(reqwest::header::ACCEPT, EVENTSTREAM_CONTENT_TYPE)
                    .json(params),
                "converse-stream",
            )
            .await?;

        Ok(Box::pin(eventstream::decode_events(response.bytes_stream())))
    }

    async fn list_foundation_models(&self) -> Result<Vec<FoundationModelSummary>> {
        let url = self.models_url()?;
        tracing::debug!(%url, "Listing foundation models");

        let listing: ListFoundationModelsResponse = self
            .send(self.http.get(url), "foundation-models")
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::backend(format!("Failed to parse model listing: {e}")))?;

        Ok(listing.model_summaries)
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| GatewayError::config(format!("Invalid backend URL {raw:?}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(GatewayError::config(format!("Backend URL {raw:?} cannot be a base")));
    }
    Ok(url)
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<BackendErrorBody>(&body).map_or_else(
        |_| format!("Bedrock returned status {}: {}", status.as_u16(), truncate(&body, 500)),
        |err| err.message,
    );
    tracing::warn!(status = status.as_u16(), %message, "Bedrock request failed");
    Err(GatewayError::backend(message))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
