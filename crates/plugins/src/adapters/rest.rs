use crate::adapter::{
    ensure_json_content_type, payload_to_body, require_endpoint, BuildInput, Capabilities,
    ToolAdapter,
};
use crate::http;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use toolrelay_core::{
    ActionType, AdapterError, CancellationToken, ExecutionRequest, RawResponse, Tool,
};

pub const TOOL_TYPE: &str = "rest";

/// Generic REST endpoint.
#[derive(Clone)]
pub struct RestAdapter {
    client: Client,
}

impl RestAdapter {
    pub fn new() -> Self {
        Self::with_client(http::default_client())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for RestAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn carries_body(method: &str) -> bool {
    !matches!(method, "GET" | "HEAD" | "OPTIONS")
}

#[async_trait]
impl ToolAdapter for RestAdapter {
    fn tool_type(&self) -> &str {
        TOOL_TYPE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::http()
    }

    fn validate_config(&self, tool: &Tool, _action: ActionType) -> Vec<String> {
        let mut errors = Vec::new();
        require_endpoint(tool, &mut errors);
        if tool.method.trim().is_empty() {
            errors.push("HTTP method is required".to_string());
        }
        errors
    }

    fn build_request(&self, input: BuildInput<'_>) -> Result<ExecutionRequest, AdapterError> {
        let tool = input.tool;
        let method = tool.method_or("GET");

        let body = if !carries_body(&method) {
            None
        } else {
            match input.action {
                ActionType::Test => Some(
                    tool.sample_payload
                        .clone()
                        .unwrap_or_else(|| json!({"action": "test", "toolId": tool.id}).to_string()),
                ),
                ActionType::Run => Some(
                    input
                        .payload
                        .map(payload_to_body)
                        .or_else(|| tool.sample_payload.clone())
                        .unwrap_or_else(|| "{}".to_string()),
                ),
            }
        };

        let mut request = ExecutionRequest {
            method,
            url: tool.endpoint.trim().to_string(),
            headers: tool.headers.clone(),
            body,
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
}
