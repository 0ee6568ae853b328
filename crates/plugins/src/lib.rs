//! Toolrelay Plugins
//!
//! Adapter strategies for each tool type, the registries that resolve a tool
//! type to its adapter, and the versioned config normalization that keeps
//! persisted tool records compatible with their plugin manifest.

pub mod adapter;
pub mod adapters;
pub mod auth;
pub mod builtin;
pub mod http;
pub mod manifest;
pub mod normalize;
pub mod registry;
pub mod schema;
pub mod version;

pub use adapter::{AdapterEventStream, BuildInput, Capabilities, ToolAdapter};
pub use builtin::{register_builtins, BuiltinError};
pub use manifest::{AdapterFactory, MigrateFn, PluginManifest};
pub use normalize::{normalize_tool_with_plugin, NormalizedTool};
pub use registry::{AdapterLookup, AdapterRegistry, PluginRegistry, RegistryError};
pub use schema::{ConfigSchema, SchemaError};
