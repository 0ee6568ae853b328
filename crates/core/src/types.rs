use crate::retry::RetryPolicyOverride;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Maximum number of characters kept in a response preview.
pub const PREVIEW_LIMIT: usize = 800;

/// How a tool authenticates against its endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    None,
    ApiKey,
    Bearer,
    Basic,
}

/// Whether the caller wants a connectivity test or a real run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Test,
    #[default]
    Run,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Test => "test",
            ActionType::Run => "run",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_runs: Option<u32>,
}

/// Per-tool overrides applied on top of the caller and process defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicyOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<ConcurrencyPolicy>,
}

/// Declarative description of one external integration.
///
/// Owned by the persistence layer; the pipeline only reads it. The flat
/// `endpoint`/`method`/`headers`/`sample_payload` fields are kept in sync
/// with `config` for older call sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub tool_type: String,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_payload: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub config_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_policy: Option<ToolExecutionPolicy>,
}

impl Tool {
    pub fn new(id: impl Into<String>, tool_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            tool_type: tool_type.into(),
            auth_type: AuthType::None,
            credential_id: None,
            endpoint: String::new(),
            method: String::new(),
            headers: BTreeMap::new(),
            sample_payload: None,
            config: Map::new(),
            config_version: String::new(),
            execution_policy: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_sample_payload(mut self, payload: impl Into<String>) -> Self {
        self.sample_payload = Some(payload.into());
        self
    }

    pub fn with_auth(mut self, auth_type: AuthType, credential_id: Option<String>) -> Self {
        self.auth_type = auth_type;
        self.credential_id = credential_id;
        self
    }

    pub fn with_policy(mut self, policy: ToolExecutionPolicy) -> Self {
        self.execution_policy = Some(policy);
        self
    }

    /// Tool-level timeout override, if any.
    pub fn timeout_override_ms(&self) -> Option<u64> {
        self.execution_policy.as_ref().and_then(|p| p.timeout_ms)
    }

    /// Per-tool concurrency limit. Only positive values count.
    pub fn max_concurrent_runs(&self) -> Option<usize> {
        self.execution_policy
            .as_ref()
            .and_then(|p| p.concurrency.as_ref())
            .and_then(|c| c.max_concurrent_runs)
            .filter(|n| *n > 0)
            .map(|n| n as usize)
    }

    /// Effective method, falling back to `default` when unset.
    pub fn method_or(&self, default: &str) -> String {
        let method = self.method.trim();
        if method.is_empty() {
            default.to_string()
        } else {
            method.to_ascii_uppercase()
        }
    }
}

/// File handed to adapters that declare attachment support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub base64: String,
}

/// Fully built request. Built once per call; retries reuse it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl ExecutionRequest {
    pub fn summary(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }
}

/// Response as returned by an adapter before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResponse {
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub preview: String,
    pub truncated: bool,
}

impl NormalizedResponse {
    /// Pass the raw response through and attach a capped preview.
    pub fn from_raw(raw: RawResponse) -> Self {
        let (preview, truncated) = preview(&raw.body, PREVIEW_LIMIT);
        Self {
            status: raw.status,
            status_text: raw.status_text,
            headers: raw.headers,
            body: raw.body,
            preview,
            truncated,
        }
    }

    pub fn summary(&self) -> String {
        if self.status_text.is_empty() {
            format!("HTTP {} · {} bytes", self.status, self.body.len())
        } else {
            format!(
                "HTTP {} {} · {} bytes",
                self.status,
                self.status_text,
                self.body.len()
            )
        }
    }
}

/// Cut `text` to at most `limit` characters, appending an ellipsis when cut.
pub fn preview(text: &str, limit: usize) -> (String, bool) {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => (format!("{}…", &text[..idx]), true),
        None => (text.to_string(), false),
    }
}
