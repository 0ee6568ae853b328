//! Manifests for the adapters shipped with toolrelay.

use crate::adapter::ToolAdapter;
use crate::adapters::{custom, openai, rest, webhook};
use crate::adapters::{CustomPluginAdapter, OpenAiAdapter, RestAdapter, WebhookAdapter};
use crate::manifest::PluginManifest;
use crate::registry::{PluginRegistry, RegistryError};
use crate::schema::{ConfigSchema, SchemaError};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const REST_CONFIG_VERSION: &str = "2.0.0";
pub const WEBHOOK_CONFIG_VERSION: &str = "1.0.0";
pub const OPENAI_CONFIG_VERSION: &str = "1.0.0";
pub const CUSTOM_CONFIG_VERSION: &str = "1.0.0";

fn http_schema(extra_required: &[&str], extra_properties: Value) -> Result<ConfigSchema, SchemaError> {
    let mut properties = json!({
        "endpoint": { "type": "string", "minLength": 1 },
        "method": { "type": "string" },
        "headers": { "type": "object", "additionalProperties": { "type": "string" } },
        "samplePayload": { "type": ["string", "object", "array", "null"] },
        "apiKeyHeader": { "type": "string" }
    });
    if let (Some(base), Value::Object(extra)) = (properties.as_object_mut(), extra_properties) {
        base.extend(extra);
    }
    let mut required = vec!["endpoint"];
    required.extend_from_slice(extra_required);
    ConfigSchema::new(json!({
        "type": "object",
        "required": required,
        "properties": properties,
    }))
}

/// Config `1.x` stored the target as `url`; `2.0.0` renamed it to `endpoint`.
pub fn migrate_rest_config(mut config: Map<String, Value>, from_version: &str) -> Map<String, Value> {
    if !config.contains_key("endpoint") {
        if let Some(url) = config.remove("url") {
            config.insert("endpoint".to_string(), url);
        }
    }
    tracing::debug!("Migrated rest config from {:?}", from_version);
    config
}

pub fn builtin_manifests() -> Result<Vec<PluginManifest>, SchemaError> {
    Ok(vec![
        PluginManifest::new("toolrelay.rest", rest::TOOL_TYPE, REST_CONFIG_VERSION, || {
            Arc::new(RestAdapter::new()) as Arc<dyn ToolAdapter>
        })
        .with_name("REST API")
        .with_capabilities(RestAdapter::new().capabilities())
        .with_schema(http_schema(&[], json!({}))?)
        .with_migration(migrate_rest_config),
        PluginManifest::new(
            "toolrelay.webhook",
            webhook::TOOL_TYPE,
            WEBHOOK_CONFIG_VERSION,
            || Arc::new(WebhookAdapter::new()) as Arc<dyn ToolAdapter>,
        )
        .with_name("Webhook")
        .with_capabilities(WebhookAdapter::new().capabilities())
        .with_schema(http_schema(&[], json!({}))?),
        PluginManifest::new(
            "toolrelay.openai",
            openai::TOOL_TYPE,
            OPENAI_CONFIG_VERSION,
            || Arc::new(OpenAiAdapter::new()) as Arc<dyn ToolAdapter>,
        )
        .with_name("OpenAI-compatible chat")
        .with_capabilities(OpenAiAdapter::new().capabilities())
        .with_schema(http_schema(
            &["model"],
            json!({
                "model": { "type": "string", "minLength": 1 },
                "systemPrompt": { "type": "string" }
            }),
        )?),
        PluginManifest::new(
            "toolrelay.custom",
            custom::TOOL_TYPE,
            CUSTOM_CONFIG_VERSION,
            || Arc::new(CustomPluginAdapter::new()) as Arc<dyn ToolAdapter>,
        )
        .with_name("Custom plugin")
        .with_capabilities(CustomPluginAdapter::new().capabilities())
        .with_schema(ConfigSchema::new(json!({
            "type": "object",
            "properties": {
                "handler": { "type": "string" },
                "latencyMs": { "type": "integer", "minimum": 0 }
            }
        }))?),
    ])
}

#[derive(Debug, thiserror::Error)]
pub enum BuiltinError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Register every built-in manifest. Safe to call more than once.
pub fn register_builtins(registry: &PluginRegistry) -> Result<(), BuiltinError> {
    for manifest in builtin_manifests()? {
        registry.register(manifest)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::normalize::normalize_tool_with_plugin;
    use toolrelay_core::Tool;

    #[test]
    fn test_builtins_register_idempotently() {
        let registry = PluginRegistry::new();
        register_builtins(&registry).unwrap();
        register_builtins(&registry).unwrap();
        assert_eq!(registry.tool_types(), vec!["custom", "openai", "rest", "webhook"]);
    }

    #[test]
    fn test_builtin_adapters_resolve() {
        let registry = PluginRegistry::new();
        register_builtins(&registry).unwrap();
        for tool_type in ["rest", "webhook", "openai", "custom"] {
            let adapter = registry.get(tool_type).unwrap();
            assert_eq!(adapter.tool_type(), tool_type);
            let manifest = registry.manifest_by_tool_type(tool_type).unwrap();
            assert_eq!(manifest.capabilities, adapter.capabilities());
        }
    }

    #[test]
    fn test_rest_v1_config_is_migrated() {
        let registry = PluginRegistry::new();
        register_builtins(&registry).unwrap();
        let manifest = registry.manifest_by_tool_type("rest").unwrap();

        let mut tool = Tool::new("legacy", "rest");
        tool.config.insert("url".into(), json!("https://api.example.com/v1"));
        tool.config.insert("method".into(), json!("GET"));
        tool.config_version = "1.0.0".into();

        let normalized = normalize_tool_with_plugin(&tool, &manifest);
        assert!(normalized.changed);
        assert_eq!(normalized.tool.config_version, REST_CONFIG_VERSION);
        assert_eq!(normalized.tool.endpoint, "https://api.example.com/v1");
        assert!(!normalized.tool.config.contains_key("url"));
    }

    #[test]
    fn test_openai_schema_requires_model() {
        let registry = PluginRegistry::new();
        register_builtins(&registry).unwrap();
        let manifest = registry.manifest_by_tool_type("openai").unwrap();

        let mut config = Map::new();
        config.insert("endpoint".into(), json!("https://llm.example.com"));
        assert!(manifest.config_schema.validate(&config).is_err());
        config.insert("model".into(), json!("gpt-4o-mini"));
        assert!(manifest.config_schema.validate(&config).is_ok());
    }
}
