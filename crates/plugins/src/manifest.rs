//! Plugin manifests: versioned bindings from a tool type to an adapter.

use crate::adapter::{Capabilities, ToolAdapter};
use crate::schema::ConfigSchema;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Migrates a persisted config written under an older version.
/// Receives the old config and the version it was stored with.
pub type MigrateFn = Arc<dyn Fn(Map<String, Value>, &str) -> Map<String, Value> + Send + Sync>;

/// Builds the adapter on first use.
pub type AdapterFactory = Arc<dyn Fn() -> Arc<dyn ToolAdapter> + Send + Sync>;

#[derive(Clone)]
pub struct PluginManifest {
    pub id: String,
    pub tool_type: String,
    pub version: String,
    pub name: String,
    pub capabilities: Capabilities,
    pub config_schema: ConfigSchema,
    pub migrate: Option<MigrateFn>,
    factory: AdapterFactory,
}

impl PluginManifest {
    pub fn new<F>(
        id: impl Into<String>,
        tool_type: impl Into<String>,
        version: impl Into<String>,
        factory: F,
    ) -> Self
    where
        F: Fn() -> Arc<dyn ToolAdapter> + Send + Sync + 'static,
    {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            tool_type: tool_type.into(),
            version: version.into(),
            capabilities: Capabilities::default(),
            config_schema: ConfigSchema::any_object(),
            migrate: None,
            factory: Arc::new(factory),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_schema(mut self, schema: ConfigSchema) -> Self {
        self.config_schema = schema;
        self
    }

    pub fn with_migration<F>(mut self, migrate: F) -> Self
    where
        F: Fn(Map<String, Value>, &str) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.migrate = Some(Arc::new(migrate));
        self
    }

    pub fn create_adapter(&self) -> Arc<dyn ToolAdapter> {
        (self.factory)()
    }

    /// Same plugin declaration. Factories and migrations are not compared.
    pub fn is_same_as(&self, other: &PluginManifest) -> bool {
        self.id == other.id
            && self.tool_type == other.tool_type
            && self.version == other.version
            && self.capabilities == other.capabilities
            && self.config_schema == other.config_schema
    }
}

impl fmt::Debug for PluginManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManifest")
            .field("id", &self.id)
            .field("tool_type", &self.tool_type)
            .field("version", &self.version)
            .field("capabilities", &self.capabilities)
            .field("has_migration", &self.migrate.is_some())
            .finish()
    }
}
