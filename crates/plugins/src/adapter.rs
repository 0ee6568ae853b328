//! The adapter contract every tool type implements.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolrelay_core::{
    ActionType, AdapterError, AdapterStreamEvent, Attachment, CancellationToken,
    ExecutionRequest, NormalizedResponse, RawResponse, Tool,
};

/// What an adapter is able to do. Fixed for the adapter's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub can_test: bool,
    pub can_run: bool,
    pub supports_headers: bool,
    pub supports_payload: bool,
    pub supports_file_attachments: bool,
    pub supports_streaming: bool,
}

impl Capabilities {
    /// Plain HTTP integration: test/run with headers and payload.
    pub const fn http() -> Self {
        Self {
            can_test: true,
            can_run: true,
            supports_headers: true,
            supports_payload: true,
            supports_file_attachments: false,
            supports_streaming: false,
        }
    }

    pub const fn with_file_attachments(mut self) -> Self {
        self.supports_file_attachments = true;
        self
    }

    pub const fn with_streaming(mut self) -> Self {
        self.supports_streaming = true;
        self
    }

    pub fn allows(&self, action: ActionType) -> bool {
        match action {
            ActionType::Test => self.can_test,
            ActionType::Run => self.can_run,
        }
    }
}

/// Inputs to [`ToolAdapter::build_request`].
///
/// `attachments` is already gated: it is empty unless the adapter declares
/// file attachment support.
#[derive(Debug, Clone, Copy)]
pub struct BuildInput<'a> {
    pub tool: &'a Tool,
    pub action: ActionType,
    pub payload: Option<&'a Value>,
    pub attachments: &'a [Attachment],
}

pub type AdapterEventStream = BoxStream<'static, AdapterStreamEvent>;

#[async_trait]
pub trait ToolAdapter: Send + Sync {
    fn tool_type(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Field-level checks. An empty list means the tool is usable.
    fn validate_config(&self, tool: &Tool, action: ActionType) -> Vec<String>;

    fn build_request(&self, input: BuildInput<'_>) -> Result<ExecutionRequest, AdapterError>;

    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, AdapterError>;

    /// Streaming execution. Only called when `supports_streaming` is set.
    fn execute_stream(
        &self,
        _request: ExecutionRequest,
        _cancel: CancellationToken,
    ) -> AdapterEventStream {
        let event = AdapterStreamEvent::Failed {
            message: AdapterError::Unsupported(format!("{} does not stream", self.tool_type()))
                .to_string(),
        };
        Box::pin(stream::once(async move { event }))
    }

    fn normalize_response(&self, raw: RawResponse) -> NormalizedResponse {
        NormalizedResponse::from_raw(raw)
    }
}

/// Render a caller payload as a request body. Strings pass through as-is.
pub(crate) fn payload_to_body(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Insert `Content-Type: application/json` unless a content type is set.
pub(crate) fn ensure_json_content_type(request: &mut ExecutionRequest) {
    if request.body.is_some() && !request.has_header("content-type") {
        request
            .headers
            .insert("Content-Type".to_string(), "application/json".to_string());
    }
}

pub(crate) fn require_endpoint(tool: &Tool, errors: &mut Vec<String>) {
    let endpoint = tool.endpoint.trim();
    if endpoint.is_empty() {
        errors.push("Endpoint is required".to_string());
    } else if reqwest::Url::parse(endpoint).is_err() {
        errors.push(format!("Endpoint is not a valid URL: {}", endpoint));
    }
}
