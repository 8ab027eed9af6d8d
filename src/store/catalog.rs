use crate::core::{AllocError, NamespaceConfig, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Catalog holds namespace metadata only (allocation rules, not counter
/// state). Immutable after construction - cloning is cheap and lock-free.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Copy-on-Write: mutation produces a new HashMap behind a new Arc
    namespaces: Arc<HashMap<String, NamespaceConfig>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            namespaces: Arc::new(HashMap::new()),
        }
    }

    /// Register a namespace - returns a NEW Catalog.
    /// The old Catalog stays unchanged.
    pub fn with_namespace(self, name: &str, config: NamespaceConfig) -> Result<Self> {
        if self.namespaces.contains_key(name) {
            return Err(AllocError::NamespaceExists(name.to_string()));
        }

        let mut updated = (*self.namespaces).clone();
        updated.insert(name.to_string(), config);

        Ok(Self {
            namespaces: Arc::new(updated),
        })
    }

    /// Remove a namespace - returns a NEW Catalog.
    pub fn without_namespace(self, name: &str) -> Result<Self> {
        if !self.namespaces.contains_key(name) {
            return Err(AllocError::NamespaceNotFound(name.to_string()));
        }

        let mut updated = (*self.namespaces).clone();
        updated.remove(name);

        Ok(Self {
            namespaces: Arc::new(updated),
        })
    }

    /// Look up a namespace config - no locks involved.
    pub fn get(&self, name: &str) -> Result<&NamespaceConfig> {
        self.namespaces
            .get(name)
            .ok_or_else(|| AllocError::NamespaceNotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    pub fn list(&self) -> Vec<&str> {
        self.namespaces.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NamespaceConfig)> {
        self.namespaces.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
