use crate::adapter::{ensure_json_content_type, require_endpoint, BuildInput, Capabilities, ToolAdapter};
use crate::http;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use toolrelay_core::{
    ActionType, AdapterError, CancellationToken, ExecutionRequest, RawResponse, Tool,
};

pub const TOOL_TYPE: &str = "webhook";

/// Outbound webhook. Wraps the payload in an event envelope and forwards
/// attachments inline.
#[derive(Clone)]
pub struct WebhookAdapter {
    client: Client,
}

impl WebhookAdapter {
    pub fn new() -> Self {
        Self::with_client(http::default_client())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for WebhookAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a stored sample payload, keeping it as a string if it is not JSON.
fn sample_value(tool: &Tool) -> Option<Value> {
    tool.sample_payload.as_ref().map(|sample| {
        serde_json::from_str(sample).unwrap_or_else(|_| Value::String(sample.clone()))
    })
}

#[async_trait]
impl ToolAdapter for WebhookAdapter {
    fn tool_type(&self) -> &str {
        TOOL_TYPE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::http().with_file_attachments()
    }

    fn validate_config(&self, tool: &Tool, _action: ActionType) -> Vec<String> {
        let mut errors = Vec::new();
        require_endpoint(tool, &mut errors);
        errors
    }

    fn build_request(&self, input: BuildInput<'_>) -> Result<ExecutionRequest, AdapterError> {
        let tool = input.tool;
        let mut envelope = match input.action {
            ActionType::Test => json!({
                "event": "toolrelay.test",
                "toolId": tool.id,
            }),
            ActionType::Run => json!({
                "event": "toolrelay.run",
                "toolId": tool.id,
                "payload": input.payload.cloned().or_else(|| sample_value(tool)).unwrap_or(Value::Null),
            }),
        };

        let attachments = if input.attachments.is_empty() {
            None
        } else {
            envelope["attachments"] = serde_json::to_value(input.attachments)
                .map_err(|e| AdapterError::Build(e.to_string()))?;
            Some(input.attachments.to_vec())
        };

        let mut request = ExecutionRequest {
            method: tool.method_or("POST"),
            url: tool.endpoint.trim().to_string(),
            headers: tool.headers.clone(),
            body: Some(envelope.to_string()),
            attachments,
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use toolrelay_core::Attachment;

    fn hook() -> Tool {
        Tool::new("hook-1", TOOL_TYPE).with_endpoint("https://hooks.example.com/in")
    }

    #[test]
    fn test_method_defaults_to_post() {
        let tool = hook();
        let request = WebhookAdapter::new()
            .build_request(BuildInput {
                tool: &tool,
                action: ActionType::Test,
                payload: None,
                attachments: &[],
            })
            .unwrap();
        assert_eq!(request.method, "POST");
        let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["event"], "toolrelay.test");
        assert!(request.attachments.is_none());
    }

    #[test]
    fn test_run_envelope_carries_payload_and_attachments() {
        let tool = hook().with_sample_payload("not json");
        let attachment = Attachment {
            id: "a1".into(),
            name: "report.pdf".into(),
            mime_type: "application/pdf".into(),
            size: 4,
            base64: "AAAA".into(),
        };
        let attachments = [attachment];
        let request = WebhookAdapter::new()
            .build_request(BuildInput {
                tool: &tool,
                action: ActionType::Run,
                payload: None,
                attachments: &attachments,
            })
            .unwrap();

        let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["payload"], "not json");
        assert_eq!(body["attachments"][0]["mimeType"], "application/pdf");
        assert_eq!(request.attachments.unwrap().len(), 1);
    }

    #[test]
    fn test_endpoint_required() {
        let errors = WebhookAdapter::new().validate_config(&Tool::new("t", TOOL_TYPE), ActionType::Run);
        assert_eq!(errors, vec!["Endpoint is required".to_string()]);
    }
}
