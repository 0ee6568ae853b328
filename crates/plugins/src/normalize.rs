//! Config migration and legacy field projection.
//!
//! Tools persisted before plugin configs existed only carry the flat
//! `endpoint`/`method`/`headers`/`samplePayload` fields. Newer records carry a
//! plugin `config` map stamped with `configVersion`. Normalization brings a
//! record up to its manifest's version and keeps both shapes in sync.

use crate::manifest::PluginManifest;
use crate::version::is_older;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use toolrelay_core::Tool;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTool {
    pub tool: Tool,
    pub changed: bool,
}

/// Build a plugin config from the tool's legacy flat fields.
pub fn config_from_legacy(tool: &Tool) -> Map<String, Value> {
    let mut config = Map::new();
    if !tool.endpoint.trim().is_empty() {
        config.insert("endpoint".into(), Value::String(tool.endpoint.clone()));
    }
    if !tool.method.trim().is_empty() {
        config.insert("method".into(), Value::String(tool.method.clone()));
    }
    if !tool.headers.is_empty() {
        let headers = tool
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        config.insert("headers".into(), Value::Object(headers));
    }
    if let Some(sample) = &tool.sample_payload {
        config.insert("samplePayload".into(), Value::String(sample.clone()));
    }
    config
}

pub fn normalize_tool_with_plugin(tool: &Tool, manifest: &PluginManifest) -> NormalizedTool {
    let mut config = if tool.config.is_empty() {
        config_from_legacy(tool)
    } else {
        tool.config.clone()
    };

    let mut version = if tool.config_version.trim().is_empty() {
        manifest.version.clone()
    } else {
        tool.config_version.clone()
    };
    let mut migrated = false;

    if is_older(&tool.config_version, &manifest.version) {
        if let Some(migrate) = &manifest.migrate {
            debug!(
                "Migrating config for tool {} from {:?} to {}",
                tool.id, tool.config_version, manifest.version
            );
            config = migrate(config, &tool.config_version);
        }
        version = manifest.version.clone();
        migrated = true;
    }

    if let Err(errors) = manifest.config_schema.validate(&config) {
        let fallback = config_from_legacy(tool);
        if manifest.config_schema.validate(&fallback).is_err() {
            warn!(
                "Config for tool {} does not satisfy plugin {}: {}",
                tool.id,
                manifest.id,
                errors.join("; ")
            );
            return NormalizedTool {
                tool: tool.clone(),
                changed: false,
            };
        }
        debug!("Tool {} config rebuilt from legacy fields", tool.id);
        config = fallback;
    }

    let mut normalized = tool.clone();
    project_legacy_fields(&mut normalized, &config);
    normalized.config = config;
    normalized.config_version = version;

    let changed = migrated
        || normalized.config != tool.config
        || normalized.config_version != tool.config_version
        || normalized.endpoint != tool.endpoint
        || normalized.method != tool.method
        || normalized.headers != tool.headers
        || normalized.sample_payload != tool.sample_payload;

    NormalizedTool {
        tool: normalized,
        changed,
    }
}

/// Copy config values back onto the flat fields older call sites read.
fn project_legacy_fields(tool: &mut Tool, config: &Map<String, Value>) {
    if let Some(endpoint) = config.get("endpoint").and_then(Value::as_str) {
        tool.endpoint = endpoint.to_string();
    }
    if let Some(method) = config.get("method").and_then(Value::as_str) {
        tool.method = method.to_string();
    }
    if let Some(headers) = config.get("headers").and_then(Value::as_object) {
        tool.headers = headers
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect::<BTreeMap<_, _>>();
    }
    match config.get("samplePayload") {
        Some(Value::String(sample)) => tool.sample_payload = Some(sample.clone()),
        Some(Value::Null) | None => {}
        Some(other) => tool.sample_payload = Some(other.to_string()),
    }
}
