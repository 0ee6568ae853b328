//! Registering a third-party plugin next to the built-ins.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use toolrelay_core::Tool;
use toolrelay_plugins::adapters::CustomPluginAdapter;
use toolrelay_plugins::*;

static FACTORY_CALLS: AtomicUsize = AtomicUsize::new(0);

fn rename_target(mut config: Map<String, Value>, _from: &str) -> Map<String, Value> {
    if let Some(target) = config.remove("target") {
        config.insert("handler".into(), target);
    }
    config
}

fn sandbox_manifest(version: &str) -> PluginManifest {
    PluginManifest::new("acme.sandbox", "sandbox", version, || {
        FACTORY_CALLS.fetch_add(1, Ordering::SeqCst);
        Arc::new(CustomPluginAdapter::new()) as Arc<dyn ToolAdapter>
    })
    .with_name("Acme sandbox")
    .with_capabilities(CustomPluginAdapter::new().capabilities())
    .with_schema(
        ConfigSchema::new(json!({
            "type": "object",
            "required": ["handler"],
            "properties": { "handler": { "type": "string" } }
        }))
        .unwrap(),
    )
    .with_migration(rename_target)
}

#[test]
fn test_third_party_plugin_lifecycle() {
    let registry = PluginRegistry::new();
    register_builtins(&registry).unwrap();
    registry.register(sandbox_manifest("3.1")).unwrap();

    let ids: Vec<String> = registry.manifests().iter().map(|m| m.id.clone()).collect();
    assert_eq!(
        ids,
        vec!["acme.sandbox", "toolrelay.custom", "toolrelay.openai", "toolrelay.rest", "toolrelay.webhook"]
    );

    // Same declaration again is accepted; a changed one is not.
    registry.register(sandbox_manifest("3.1")).unwrap();
    assert!(matches!(
        registry.register(sandbox_manifest("4.0")),
        Err(RegistryError::IdConflict(_))
    ));

    let before = FACTORY_CALLS.load(Ordering::SeqCst);
    let first = registry.get("sandbox").unwrap();
    let second = registry.get("sandbox").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(FACTORY_CALLS.load(Ordering::SeqCst), before + 1);

    let mut tool = Tool::new("job", "sandbox");
    tool.config.insert("target".into(), json!("resize"));
    tool.config_version = "2".into();
    let manifest = registry.manifest_by_id("acme.sandbox").unwrap();
    let normalized = normalize_tool_with_plugin(&tool, &manifest);
    assert!(normalized.changed);
    assert_eq!(normalized.tool.config_version, "3.1");
    assert_eq!(normalized.tool.config["handler"], "resize");
}

#[test]
fn test_tool_type_cannot_be_taken_over() {
    let registry = PluginRegistry::new();
    register_builtins(&registry).unwrap();
    let impostor = PluginManifest::new("acme.rest", "rest", "1.0.0", || {
        Arc::new(CustomPluginAdapter::new()) as Arc<dyn ToolAdapter>
    });
    match registry.register(impostor) {
        Err(RegistryError::ToolTypeConflict { tool_type, owner }) => {
            assert_eq!(tool_type, "rest");
            assert_eq!(owner, "toolrelay.rest");
        }
        other => panic!("expected a tool type conflict, got {:?}", other),
    }
    assert_eq!(registry.get("rest").unwrap().tool_type(), "rest");
}

#[test]
fn test_adapter_registry_as_lookup() {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(CustomPluginAdapter::new()));
    let lookup: &dyn AdapterLookup = &registry;
    assert!(lookup.adapter("custom").is_some());
    assert!(lookup.adapter("rest").is_none());
    assert_eq!(registry.tool_types(), vec!["custom"]);
}
