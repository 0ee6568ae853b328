//! JSON Schema validation for plugin configuration.

use jsonschema::JSONSchema;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Invalid config schema: {0}")]
    Compile(String),
}

/// A compiled config schema together with its source document.
#[derive(Clone)]
pub struct ConfigSchema {
    source: Value,
    compiled: Arc<JSONSchema>,
}

impl ConfigSchema {
    pub fn new(source: Value) -> Result<Self, SchemaError> {
        let compiled = JSONSchema::options()
            .compile(&source)
            .map_err(|e| SchemaError::Compile(e.to_string()))?;
        Ok(Self {
            source,
            compiled: Arc::new(compiled),
        })
    }

    /// Schema accepting any object.
    pub fn any_object() -> Self {
        // A literal object schema always compiles.
        match Self::new(serde_json::json!({ "type": "object" })) {
            Ok(schema) => schema,
            Err(e) => unreachable!("static schema failed to compile: {e}"),
        }
    }

    pub fn source(&self) -> &Value {
        &self.source
    }

    pub fn validate(&self, config: &Map<String, Value>) -> Result<(), Vec<String>> {
        let instance = Value::Object(config.clone());
        let result = self.compiled.validate(&instance);
        match result {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors.map(|e| e.to_string()).collect()),
        }
    }
}

impl fmt::Debug for ConfigSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSchema")
            .field("source", &self.source)
            .finish()
    }
}

impl PartialEq for ConfigSchema {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn endpoint_schema() -> ConfigSchema {
        ConfigSchema::new(json!({
            "type": "object",
            "required": ["endpoint"],
            "properties": { "endpoint": { "type": "string", "minLength": 1 } }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        let mut config = Map::new();
        config.insert("endpoint".into(), json!("https://example.com"));
        assert!(endpoint_schema().validate(&config).is_ok());
    }

    #[test]
    fn test_missing_required_field_is_reported() {
        let errors = endpoint_schema().validate(&Map::new()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("endpoint"));
    }

    #[test]
    fn test_uncompilable_schema_is_rejected() {
        let result = ConfigSchema::new(json!({ "type": 12 }));
        assert!(matches!(result, Err(SchemaError::Compile(_))));
    }
}
