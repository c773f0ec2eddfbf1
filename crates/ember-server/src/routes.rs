//! HTTP routes

use crate::error::ApiError;
use crate::openai_types::{
    sse_frame, ChatCompletionRequest, ChatCompletionResponse, Manifest, ManifestTool, ToolCallRequest,
    ToolCallResponse,
};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use ember_agent::{stream_events, ChatRequest, ToolError, ToolResult, Transcript};
use futures::StreamExt;
use serde_json::{json, Value};
use std::convert::Infallible;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/.well-known/mcp/manifest", get(manifest))
        .route("/tools/call", post(call_tool))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn manifest(State(state): State<AppState>) -> Json<Manifest> {
    Json(Manifest {
        name: "ember".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tools: state.direct_tools.declarations().map(ManifestTool::from).collect(),
    })
}

async fn call_tool(
    State(state): State<AppState>,
    Json(request): Json<ToolCallRequest>,
) -> Result<Json<ToolCallResponse>, ApiError> {
    let response = match state.direct_tools.invoke(&request.tool, request.input).await {
        Ok(output) => ToolCallResponse {
            tool: request.tool,
            output,
            is_error: false,
        },
        Err(ToolError::UnknownTool(name)) => return Err(ApiError::UnknownTool(name)),
        Err(e) if e.is_invalid_input() => return Err(ApiError::InvalidInput(e.to_string())),
        Err(e) => ToolCallResponse {
            output: ToolResult::error(request.tool.as_str(), &e).content,
            tool: request.tool,
            is_error: true,
        },
    };

    tracing::info!("Direct tool call {} (error: {})", response.tool, response.is_error);
    Ok(Json(response))
}

async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    let model = request
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.default_model.clone());

    if request.stream {
        tracing::debug!("Streaming completion with {}", model);
        let events = stream_events(
            state.conversation.backend().clone(),
            ChatRequest::new(model, request.messages),
        );
        let body = Body::from_stream(events.map(|event| Ok::<_, Infallible>(Bytes::from(sse_frame(event)))));

        return Ok((
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            body,
        )
            .into_response());
    }

    let mut transcript = Transcript::from(request.messages);
    let message = state.conversation.run(&model, &mut transcript).await?;

    Ok(Json(ChatCompletionResponse::new(model, message)).into_response())
}
