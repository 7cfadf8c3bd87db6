use crate::backend::Backend;
use crate::catalog::StaticCatalog;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::logging::SharedLogger;
use crate::pricing::CostCalculator;
use crate::proxy;
use crate::translate::openai_types::{ChatErrorResponse, ChatRequest};

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub backend: Arc<dyn Backend>,
    pub catalog: Arc<StaticCatalog>,
    pub costs: Arc<CostCalculator>,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat/completions", post(handle_chat))
        .route("/v1/chat/completions", post(handle_chat))
        .route("/models", get(handle_models))
        .route("/v1/models", get(handle_models))
        .route("/health", get(handle_health))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    let origins = if config.allows_any_origin() {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Every failure is reported the same way: `500 {"error": "..."}`.
fn error_response(err: &GatewayError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ChatErrorResponse::new(err.to_string())),
    )
        .into_response()
}

async fn handle_chat(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let req = match parse_chat_request(request).await {
        Ok(r) => r,
        Err(e) => {
            state
                .logger
                .error("server", format!("Failed to parse request: {}", e));
            return error_response(&e);
        }
    };

    state.logger.info(
        "server",
        format!(
            "Request: model={} streaming={} messages={} attachment={}",
            state
                .config
                .resolve_model(req.model.as_deref().unwrap_or(&state.config.default_model)),
            req.stream,
            req.messages.len(),
            req.attachment.is_some()
        ),
    );

    if req.stream {
        handle_streaming(state, &req).await
    } else {
        handle_non_streaming(state, &req).await
    }
}

async fn handle_non_streaming(state: Arc<AppState>, req: &ChatRequest) -> Response {
    match proxy::proxy_non_streaming(
        req,
        &state.config,
        state.backend.as_ref(),
        &state.costs,
        &state.logger,
    )
    .await
    {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => {
            state.logger.error("server", format!("Proxy error: {}", e));
            error_response(&e)
        }
    }
}

async fn handle_streaming(state: Arc<AppState>, req: &ChatRequest) -> Response {
    let chunks =
        match proxy::proxy_streaming(req, &state.config, state.backend.as_ref(), &state.logger)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                state.logger.error("server", format!("Streaming setup error: {}", e));
                return error_response(&e);
            }
        };

    // A mid-stream error has already been logged; the stream simply ends without [DONE].
    let event_stream = chunks
        .take_while(|item| futures::future::ready(item.is_ok()))
        .filter_map(|item| async move {
            let data = item.ok()?.to_sse_data().ok()?;
            Some(Ok::<_, Infallible>(Event::default().data(data)))
        });

    Sse::new(event_stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn handle_health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Response {
    match proxy::list_models(state.backend.as_ref(), &state.catalog).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => {
            state.logger.error("server", format!("Model listing error: {}", e));
            error_response(&e)
        }
    }
}

/// Decode a chat request from a JSON, multipart or urlencoded body.
async fn parse_chat_request(request: Request) -> Result<ChatRequest> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| GatewayError::validation(format!("Invalid multipart body: {}", e.body_text())))?;
        return parse_multipart(multipart).await;
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(|e| GatewayError::validation(format!("Invalid form body: {}", e.body_text())))?;
        return ChatRequest::from_value(Value::Object(form_fields(fields)));
    }

    let body = Bytes::from_request(request, &())
        .await
        .map_err(|e| GatewayError::validation(format!("Failed to read body: {}", e.body_text())))?;
    ChatRequest::from_json(&body)
}

async fn parse_multipart(mut multipart: Multipart) -> Result<ChatRequest> {
    let mut fields = HashMap::new();
    let mut attachment = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::validation(format!("Invalid multipart field: {}", e.body_text())))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| GatewayError::validation(format!("Failed to read file: {}", e.body_text())))?;
            attachment = Some(serde_json::json!({
                "filename": filename,
                "content": String::from_utf8_lossy(&data),
            }));
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| GatewayError::validation(format!("Invalid field {name}: {}", e.body_text())))?;
            fields.insert(name, text);
        }
    }

    let mut map = form_fields(fields);
    if let Some(attachment) = attachment {
        map.insert("attachment".to_string(), attachment);
    }
    ChatRequest::from_value(Value::Object(map))
}

/// Form fields as a JSON object. Scalars stay strings and are coerced on decode;
/// `messages` arrives as a JSON-encoded string.
fn form_fields(fields: HashMap<String, String>) -> Map<String, Value> {
    const KNOWN: [&str; 5] = ["model", "messages", "max_tokens", "temperature", "stream"];

    fields
        .into_iter()
        .filter(|(k, v)| KNOWN.contains(&k.as_str()) && !(k != "messages" && v.trim().is_empty()))
        .map(|(k, v)| (k, Value::String(v)))
        .collect()
}
