//! Adoption seam for state derived from an external entity store.
//!
//! The original deployments of this pattern compute "next code" by
//! scanning the owning table for the maximum already-assigned value.
//! That read-then-write shape is racy under concurrent creation, so the
//! allocator never uses it to allocate; it only consumes such a scan
//! once, through [`CodeSource`], to adopt an existing high-water mark
//! when a namespace is migrated onto the explicit counter.

use crate::core::Result;
use async_trait::async_trait;

/// A store of entities that carry already-assigned codes.
#[async_trait]
pub trait CodeSource: Send + Sync {
    /// Highest code value currently assigned in the namespace, ignoring
    /// entities with no code. Equivalent to
    /// `SELECT code FROM entity ORDER BY code DESC LIMIT 1`.
    async fn max_assigned(&self, namespace: &str) -> Result<Option<u64>>;
}

#[async_trait]
impl CodeSource for std::collections::HashMap<String, Vec<u64>> {
    async fn max_assigned(&self, namespace: &str) -> Result<Option<u64>> {
        Ok(self
            .get(namespace)
            .and_then(|codes| codes.iter().max().copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_map_source_returns_max() {
        let mut source: HashMap<String, Vec<u64>> = HashMap::new();
        source.insert("client".to_string(), vec![3, 17, 9]);

        assert_eq!(source.max_assigned("client").await.unwrap(), Some(17));
        assert_eq!(source.max_assigned("invoice").await.unwrap(), None);
    }
}
