use crate::adapter::{
    ensure_json_content_type, require_endpoint, AdapterEventStream, BuildInput, Capabilities,
    ToolAdapter,
};
use crate::http;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Map, Value};
use toolrelay_core::{
    ActionType, AdapterError, AdapterStreamEvent, CancellationToken, ExecutionRequest,
    RawResponse, Tool,
};
use tracing::debug;

pub const TOOL_TYPE: &str = "openai";

/// OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiAdapter {
    client: Client,
}

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self::with_client(http::default_client())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for OpenAiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn model_of(tool: &Tool) -> Option<&str> {
    tool.config
        .get("model")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
}

fn user_message(model: &str, system_prompt: Option<&str>, content: &str) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": content}));
    json!({"model": model, "messages": messages})
}

/// Turn a caller payload into a chat request body.
fn chat_body(model: &str, system_prompt: Option<&str>, payload: &Value) -> Value {
    match payload {
        Value::Object(fields) => {
            let mut body: Map<String, Value> = fields.clone();
            body.entry("model").or_insert_with(|| Value::String(model.to_string()));
            Value::Object(body)
        }
        Value::String(text) => user_message(model, system_prompt, text),
        other => user_message(model, system_prompt, &other.to_string()),
    }
}

enum SseLine {
    Delta(String),
    Finish(String),
    Done,
    Ignore,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Ignore;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    let Ok(chunk) = serde_json::from_str::<Value>(data) else {
        return SseLine::Ignore;
    };
    let choice = &chunk["choices"][0];
    if let Some(delta) = choice["delta"]["content"].as_str() {
        return SseLine::Delta(delta.to_string());
    }
    if let Some(reason) = choice["finish_reason"].as_str() {
        return SseLine::Finish(reason.to_string());
    }
    SseLine::Ignore
}

/// Splits a byte stream into lines. Bytes are held until a full line has
/// arrived so a code point split across network chunks decodes intact.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines
    }
}

/// Body of the aggregated response handed back after a stream finishes.
fn aggregated_body(content: &str, finish_reason: &str) -> String {
    json!({
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": finish_reason,
        }]
    })
    .to_string()
}

fn with_stream_flag(mut request: ExecutionRequest) -> Result<ExecutionRequest, AdapterError> {
    let body = request.body.as_deref().unwrap_or("{}");
    let mut value: Value = serde_json::from_str(body)
        .map_err(|e| AdapterError::Build(format!("Chat body is not JSON: {}", e)))?;
    value["stream"] = Value::Bool(true);
    request.body = Some(value.to_string());
    Ok(request)
}

#[async_trait]
impl ToolAdapter for OpenAiAdapter {
    fn tool_type(&self) -> &str {
        TOOL_TYPE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::http().with_streaming()
    }

    fn validate_config(&self, tool: &Tool, _action: ActionType) -> Vec<String> {
        let mut errors = Vec::new();
        require_endpoint(tool, &mut errors);
        if model_of(tool).is_none() {
            errors.push("Model is required".to_string());
        }
        errors
    }

    fn build_request(&self, input: BuildInput<'_>) -> Result<ExecutionRequest, AdapterError> {
        let tool = input.tool;
        let model = model_of(tool)
            .ok_or_else(|| AdapterError::Build("Model is required".to_string()))?;
        let system_prompt = tool.config.get("systemPrompt").and_then(Value::as_str);

        let body = match input.action {
            ActionType::Test => json!({
                "model": model,
                "messages": [{"role": "user", "content": "ping"}],
                "max_tokens": 1,
            }),
            ActionType::Run => match (input.payload, &tool.sample_payload) {
                (Some(payload), _) => chat_body(model, system_prompt, payload),
                (None, Some(sample)) => {
                    let parsed = serde_json::from_str(sample)
                        .unwrap_or_else(|_| Value::String(sample.clone()));
                    chat_body(model, system_prompt, &parsed)
                }
                (None, None) => {
                    return Err(AdapterError::Build(
                        "A chat payload or sample payload is required".to_string(),
                    ))
                }
            },
        };

        let mut request = ExecutionRequest {
            method: "POST".to_string(),
            url: tool.endpoint.trim().to_string(),
            headers: tool.headers.clone(),
            body: Some(body.to_string()),
            attachments: None,
        };
        ensure_json_content_type(&mut request);
        Ok(request)
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, AdapterError> {
        http::send(&self.client, request, cancel).await
    }

    fn execute_stream(&self, request: ExecutionRequest, cancel: CancellationToken) -> AdapterEventStream {
        let client = self.client.clone();
        Box::pin(async_stream::stream! {
            let prepared = with_stream_flag(request).and_then(|r| http::prepare(&client, &r));
            let builder = match prepared {
                Ok(builder) => builder,
                Err(e) => {
                    yield AdapterStreamEvent::Failed { message: e.to_string() };
                    return;
                }
            };

            let sent = tokio::select! {
                _ = cancel.cancelled() => Err(AdapterError::Cancelled),
                response = builder.send() => response.map_err(|e| AdapterError::Http(e.to_string())),
            };
            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    yield AdapterStreamEvent::Failed { message: e.to_string() };
                    return;
                }
            };

            let status = response.status();
            let status_text = http::status_text(&response);
            let headers = http::response_headers(&response);

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                yield AdapterStreamEvent::Completed {
                    response: RawResponse { status: status.as_u16(), status_text, headers, body },
                };
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut buffer = LineBuffer::default();
            let mut content = String::new();
            let mut finish_reason = "stop".to_string();
            let mut done = false;

            while !done {
                let next = tokio::select! {
                    _ = cancel.cancelled() => Err(AdapterError::Cancelled),
                    chunk = bytes.next() => Ok(chunk),
                };
                let chunk = match next {
                    Ok(Some(Ok(chunk))) => chunk,
                    Ok(Some(Err(e))) => {
                        yield AdapterStreamEvent::Failed { message: AdapterError::Http(e.to_string()).to_string() };
                        return;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield AdapterStreamEvent::Failed { message: e.to_string() };
                        return;
                    }
                };

                for line in buffer.push(&chunk) {
                    match parse_sse_line(&line) {
                        SseLine::Delta(delta) => {
                            content.push_str(&delta);
                            yield AdapterStreamEvent::Chunk { data: delta };
                        }
                        SseLine::Finish(reason) => finish_reason = reason,
                        SseLine::Done => {
                            done = true;
                            break;
                        }
                        SseLine::Ignore => {}
                    }
                }
            }

            debug!("Chat stream finished with {} chars", content.len());
            yield AdapterStreamEvent::Completed {
                response: RawResponse {
                    status: status.as_u16(),
                    status_text,
                    headers,
                    body: aggregated_body(&content, &finish_reason),
                },
            };
        })
    }
}
