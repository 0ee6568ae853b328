//! Authentication header resolution.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use toolrelay_core::{AdapterError, AuthType, CredentialResolver, ExecutionRequest, Tool};
use tracing::{debug, warn};

pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Headers required by the tool's auth mode. Empty for `AuthType::None`.
pub async fn resolve_auth_headers(
    tool: &Tool,
    resolver: &dyn CredentialResolver,
) -> Result<BTreeMap<String, String>, AdapterError> {
    let mut headers = BTreeMap::new();
    if tool.auth_type == AuthType::None {
        return Ok(headers);
    }

    let credential_id = tool
        .credential_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            AdapterError::Credential(format!(
                "Tool {} requires a credential but none is configured",
                tool.id
            ))
        })?;

    let secret = resolver
        .resolve(credential_id)
        .await
        .map_err(|e| AdapterError::Credential(e.to_string()))?;

    match tool.auth_type {
        AuthType::None => {}
        AuthType::ApiKey => {
            let header = tool
                .config
                .get("apiKeyHeader")
                .and_then(Value::as_str)
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(DEFAULT_API_KEY_HEADER);
            headers.insert(header.to_string(), secret);
        }
        AuthType::Bearer => {
            headers.insert("Authorization".to_string(), format!("Bearer {}", secret));
        }
        AuthType::Basic => {
            headers.insert(
                "Authorization".to_string(),
                format!("Basic {}", STANDARD.encode(secret.as_bytes())),
            );
        }
    }

    if let Err(e) = resolver.mark_used(credential_id, Utc::now()).await {
        warn!("Failed to record credential use for {}: {}", credential_id, e);
    }
    debug!("Resolved {:?} auth for tool {}", tool.auth_type, tool.id);
    Ok(headers)
}

/// Merge auth headers into the request, replacing same-named headers
/// regardless of case.
pub fn apply_auth_headers(request: &mut ExecutionRequest, auth: BTreeMap<String, String>) {
    for (name, value) in auth {
        request.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        request.headers.insert(name, value);
    }
}
