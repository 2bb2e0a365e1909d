//! Native plugin dispatch.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use wayfarer_core::BridgeError;

/// A native capability reachable from the page and from native steps.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable plugin name, for diagnostics.
    fn name(&self) -> &str;

    /// Whether this plugin serves the given method.
    fn can_handle(&self, method: &str) -> bool;

    /// Handle a method invocation.
    async fn handle(&self, method: &str, params: Value) -> Result<Value, BridgeError>;
}

/// Registry of plugins. Resolution is concurrent, registration exclusive.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        self.plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(plugin);
    }

    /// First registered plugin claiming the method, if any.
    pub fn resolve(&self, method: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|plugin| plugin.can_handle(method))
            .cloned()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        f.debug_struct("PluginRegistry").field("plugins", &names).finish()
    }
}
