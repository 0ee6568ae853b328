//! Tool catalog loader.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use toolrelay_core::Tool;
use toolrelay_executor::ExecutorSettings;
use toolrelay_plugins::{normalize_tool_with_plugin, PluginRegistry};
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_PATH: &str = "toolrelay.yaml";
pub const CONFIG_PATH_ENV: &str = "TOOLRELAY_CONFIG";

/// Contents of `toolrelay.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub settings: ExecutorSettings,
    #[serde(default)]
    pub tools: Vec<Tool>,
}

/// `$TOOLRELAY_CONFIG`, falling back to `./toolrelay.yaml`.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid catalog {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            bail!("Config file is empty");
        }
        let mut catalog: Catalog = serde_yaml::from_str(content).context("Invalid YAML")?;

        let mut seen = HashSet::new();
        for tool in &catalog.tools {
            if tool.id.trim().is_empty() {
                bail!("Tool entry missing required field: id");
            }
            if !seen.insert(tool.id.as_str()) {
                bail!("Duplicate tool id: {}", tool.id);
            }
        }

        catalog.settings = catalog
            .settings
            .validated()
            .context("Invalid executor settings")?;
        Ok(catalog)
    }

    pub fn tool(&self, id: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.id == id)
    }

    /// Bring every tool's config up to its plugin's current version.
    /// Returns how many records changed.
    pub fn normalize(&mut self, registry: &PluginRegistry) -> usize {
        let mut changed = 0;
        for tool in &mut self.tools {
            let Some(manifest) = registry.manifest_by_tool_type(&tool.tool_type) else {
                warn!("No plugin manifest for tool {} ({})", tool.id, tool.tool_type);
                continue;
            };
            let normalized = normalize_tool_with_plugin(tool, &manifest);
            if normalized.changed {
                debug!("Normalized tool {} to config {}", tool.id, normalized.tool.config_version);
                *tool = normalized.tool;
                changed += 1;
            }
        }
        changed
    }
}
