//! Sandboxed plugin handler.
//!
//! Executes in-process without touching the network. Useful for plugin
//! development and for exercising retry and streaming behavior
//! deterministically: a body containing [`FAILURE_MARKER`] always fails.

use crate::adapter::{payload_to_body, AdapterEventStream, BuildInput, Capabilities, ToolAdapter};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use toolrelay_core::{
    ActionType, AdapterError, AdapterStreamEvent, CancellationToken, ExecutionRequest,
    RawResponse, Tool,
};

pub const TOOL_TYPE: &str = "custom";

pub const FAILURE_MARKER: &str = "__toolrelay_fail__";

const STREAM_CHUNK_CHARS: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct CustomPluginAdapter;

impl CustomPluginAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn handler_of(tool: &Tool) -> String {
    tool.config
        .get("handler")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| tool.id.clone())
}

fn latency_of(request: &ExecutionRequest) -> Duration {
    let ms = request
        .headers
        .get("X-Plugin-Latency-Ms")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    Duration::from_millis(ms)
}

/// Wait out the simulated latency unless `cancel` fires first.
async fn simulate_latency(latency: Duration, cancel: &CancellationToken) -> Result<(), AdapterError> {
    if latency.is_zero() {
        return if cancel.is_cancelled() {
            Err(AdapterError::Cancelled)
        } else {
            Ok(())
        };
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(AdapterError::Cancelled),
        _ = tokio::time::sleep(latency) => Ok(()),
    }
}

/// The handler's response, or the injected failure.
fn respond(request: &ExecutionRequest) -> Result<RawResponse, AdapterError> {
    let body = request.body.as_deref().unwrap_or_default();
    if body.contains(FAILURE_MARKER) {
        return Err(AdapterError::Execution("Simulated plugin failure".to_string()));
    }

    let echo: Value = serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()));
    let attachments: Vec<&str> = request
        .attachments
        .iter()
        .flatten()
        .map(|a| a.name.as_str())
        .collect();
    let handler = request.url.trim_start_matches("plugin://");

    let mut response = RawResponse::new(
        200,
        json!({
            "handler": handler,
            "echo": echo,
            "attachments": attachments,
        })
        .to_string(),
    );
    response.status_text = "OK".to_string();
    response
        .headers
        .insert("content-type".to_string(), "application/json".to_string());
    Ok(response)
}

#[async_trait]
impl ToolAdapter for CustomPluginAdapter {
    fn tool_type(&self) -> &str {
        TOOL_TYPE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::http().with_file_attachments().with_streaming()
    }

    fn validate_config(&self, tool: &Tool, _action: ActionType) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(handler) = tool.config.get("handler") {
            if !handler.is_string() {
                errors.push("Plugin handler must be a string".to_string());
            }
        }
        errors
    }

    fn build_request(&self, input: BuildInput<'_>) -> Result<ExecutionRequest, AdapterError> {
        let tool = input.tool;
        let body = match input.action {
            ActionType::Test => json!({"action": "test", "toolId": tool.id}).to_string(),
            ActionType::Run => input
                .payload
                .map(payload_to_body)
                .or_else(|| tool.sample_payload.clone())
                .unwrap_or_else(|| "{}".to_string()),
        };

        let mut headers = tool.headers.clone();
        if let Some(latency) = tool.config.get("latencyMs").and_then(Value::as_u64) {
            headers.insert("X-Plugin-Latency-Ms".to_string(), latency.to_string());
        }

        Ok(ExecutionRequest {
            method: tool.method_or("POST"),
            url: format!("plugin://{}", handler_of(tool)),
            headers,
            body: Some(body),
            attachments: if input.attachments.is_empty() {
                None
            } else {
                Some(input.attachments.to_vec())
            },
        })
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, AdapterError> {
        simulate_latency(latency_of(request), cancel).await?;
        respond(request)
    }

    fn execute_stream(&self, request: ExecutionRequest, cancel: CancellationToken) -> AdapterEventStream {
        Box::pin(async_stream::stream! {
            yield AdapterStreamEvent::Progress { message: format!("Invoking {}", request.url) };

            if let Err(e) = simulate_latency(latency_of(&request), &cancel).await {
                yield AdapterStreamEvent::Failed { message: e.to_string() };
                return;
            }

            match respond(&request) {
                Ok(response) => {
                    let chars: Vec<char> = response.body.chars().collect();
                    for piece in chars.chunks(STREAM_CHUNK_CHARS) {
                        if cancel.is_cancelled() {
                            yield AdapterStreamEvent::Failed { message: AdapterError::Cancelled.to_string() };
                            return;
                        }
                        yield AdapterStreamEvent::Chunk { data: piece.iter().collect() };
                    }
                    yield AdapterStreamEvent::Completed { response };
                }
                Err(e) => {
                    yield AdapterStreamEvent::Failed { message: e.to_string() };
                }
            }
        })
    }
}
