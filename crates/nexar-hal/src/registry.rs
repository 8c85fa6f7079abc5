//! Provider registry.
//!
//! The [`ProviderRegistry`] is the single lookup point from provider name to
//! provider instance. It is constructed once at the composition root and
//! shared by reference; there is no process-wide mutable global.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{HalResult, ProviderError};
use crate::provider::Provider;

/// Registry of compute providers, keyed by name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: FxHashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: FxHashMap::default(),
        }
    }

    /// Register a provider under its own name.
    ///
    /// Registration is idempotent; re-registering a name replaces the
    /// previous instance.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        debug!("Registering provider: {}", name);
        self.providers.insert(name, provider);
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> HalResult<Arc<dyn Provider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::Unavailable(format!("no provider registered as '{name}'")))
    }

    /// Check if a provider is registered by name.
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// List all registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}
