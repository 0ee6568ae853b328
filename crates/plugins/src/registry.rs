use crate::adapter::ToolAdapter;
use crate::manifest::PluginManifest;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Plugin id already registered with a different manifest: {0}")]
    IdConflict(String),

    #[error("Tool type {tool_type} is already owned by plugin {owner}")]
    ToolTypeConflict { tool_type: String, owner: String },
}

/// Resolves a tool type to the adapter that executes it.
pub trait AdapterLookup: Send + Sync {
    fn adapter(&self, tool_type: &str) -> Option<Arc<dyn ToolAdapter>>;
}

/// Plain tool-type → adapter map.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ToolAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ToolAdapter>) -> &mut Self {
        self.adapters.insert(adapter.tool_type().to_string(), adapter);
        self
    }

    pub fn get(&self, tool_type: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.adapters.get(tool_type).cloned()
    }

    pub fn tool_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.adapters.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn count(&self) -> usize {
        self.adapters.len()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterLookup for AdapterRegistry {
    fn adapter(&self, tool_type: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.get(tool_type)
    }
}

#[derive(Default)]
struct Manifests {
    by_id: HashMap<String, Arc<PluginManifest>>,
    by_tool_type: HashMap<String, Arc<PluginManifest>>,
}

/// Manifest-backed registry with lazily constructed, cached adapters.
#[derive(Default)]
pub struct PluginRegistry {
    manifests: RwLock<Manifests>,
    adapters: RwLock<HashMap<String, Arc<dyn ToolAdapter>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manifest. Re-registering an identical manifest is a no-op.
    pub fn register(&self, manifest: PluginManifest) -> Result<(), RegistryError> {
        let mut manifests = self.manifests.write();

        if let Some(existing) = manifests.by_id.get(&manifest.id) {
            if existing.is_same_as(&manifest) {
                debug!("Plugin {} already registered", manifest.id);
                return Ok(());
            }
            return Err(RegistryError::IdConflict(manifest.id));
        }

        if let Some(owner) = manifests.by_tool_type.get(&manifest.tool_type) {
            return Err(RegistryError::ToolTypeConflict {
                tool_type: manifest.tool_type,
                owner: owner.id.clone(),
            });
        }

        info!(
            "Registered plugin {} v{} for tool type {}",
            manifest.id, manifest.version, manifest.tool_type
        );
        let manifest = Arc::new(manifest);
        manifests
            .by_tool_type
            .insert(manifest.tool_type.clone(), Arc::clone(&manifest));
        manifests.by_id.insert(manifest.id.clone(), manifest);
        Ok(())
    }

    /// Cached adapter for `tool_type`, built from the manifest on first use.
    pub fn get(&self, tool_type: &str) -> Option<Arc<dyn ToolAdapter>> {
        if let Some(adapter) = self.adapters.read().get(tool_type) {
            return Some(Arc::clone(adapter));
        }

        let manifest = self.manifest_by_tool_type(tool_type)?;
        let mut adapters = self.adapters.write();
        let adapter = adapters.entry(tool_type.to_string()).or_insert_with(|| {
            debug!("Instantiating adapter for tool type {}", tool_type);
            manifest.create_adapter()
        });
        Some(Arc::clone(adapter))
    }

    pub fn manifest_by_tool_type(&self, tool_type: &str) -> Option<Arc<PluginManifest>> {
        self.manifests.read().by_tool_type.get(tool_type).cloned()
    }

    pub fn manifest_by_id(&self, id: &str) -> Option<Arc<PluginManifest>> {
        self.manifests.read().by_id.get(id).cloned()
    }

    /// All manifests, sorted by plugin id.
    pub fn manifests(&self) -> Vec<Arc<PluginManifest>> {
        let mut all: Vec<_> = self.manifests.read().by_id.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn tool_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .manifests
            .read()
            .by_tool_type
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }
}

impl AdapterLookup for PluginRegistry {
    fn adapter(&self, tool_type: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.get(tool_type)
    }
}
