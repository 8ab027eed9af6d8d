// ============================================================================
// seqcode Library
// ============================================================================

pub mod core;
pub mod store;
pub mod allocator;
pub mod facade;
pub mod config;

// Re-export main types for convenience
pub use crate::core::{AllocError, Code, NamespaceConfig, Result, SequenceState};
pub use crate::config::AllocatorConfig;
pub use crate::store::{CodeSource, DurabilityMode};
pub use crate::allocator::{Reservation, RetryPolicy};
pub use crate::facade::{CodeRegistry, RegistryStats};

use std::sync::Arc;

// ============================================================================
// High-level Allocator API
// ============================================================================

/// Sequential code allocator over a shared registry
///
/// This is the recommended way to use seqcode in applications. Each
/// namespace (e.g. one per entity type) issues a strictly increasing,
/// gap-free sequence starting at 1, bounded by a configurable ceiling,
/// with no value ever repeated - including across restarts when a data
/// directory is configured.
///
/// # Examples
///
/// ```
/// use seqcode::{Allocator, NamespaceConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> seqcode::Result<()> {
/// let allocator = Allocator::in_memory();
/// allocator
///     .create_namespace("client", NamespaceConfig::new().max(999).prefix("CL").pad_width(3))
///     .await?;
///
/// let code = allocator.next_code("client").await?;
/// assert_eq!(code.value, 1);
/// assert_eq!(code.to_string(), "CL-001");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Allocator {
    registry: Arc<CodeRegistry>,
}

impl Allocator {
    /// Create an in-memory allocator with no persistence
    ///
    /// # Examples
    ///
    /// ```
    /// use seqcode::Allocator;
    ///
    /// let allocator = Allocator::in_memory();
    /// ```
    pub fn in_memory() -> Self {
        Self {
            registry: Arc::new(CodeRegistry::in_memory()),
        }
    }

    /// Open an allocator with custom configuration, recovering any
    /// persisted state from the configured data directory.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use seqcode::{Allocator, AllocatorConfig, DurabilityMode};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> seqcode::Result<()> {
    /// let config = AllocatorConfig::new()
    ///     .data_dir("/var/lib/myapp/codes")
    ///     .durability(DurabilityMode::Sync);
    ///
    /// let allocator = Allocator::open(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open(config: AllocatorConfig) -> Result<Self> {
        Ok(Self {
            registry: Arc::new(CodeRegistry::open(config).await?),
        })
    }

    /// Register a namespace with its allocation rules
    pub async fn create_namespace(&self, name: &str, config: NamespaceConfig) -> Result<()> {
        self.registry.create_namespace(name, config).await
    }

    /// Remove a namespace and its counter state
    pub async fn drop_namespace(&self, name: &str) -> Result<()> {
        self.registry.drop_namespace(name).await
    }

    /// Allocate the next code in a namespace
    ///
    /// # Examples
    ///
    /// ```
    /// # use seqcode::{Allocator, NamespaceConfig};
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> seqcode::Result<()> {
    /// # let allocator = Allocator::in_memory();
    /// # allocator.create_namespace("invoice", NamespaceConfig::new()).await?;
    /// let first = allocator.next_code("invoice").await?;
    /// let second = allocator.next_code("invoice").await?;
    /// assert_eq!((first.value, second.value), (1, 2));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn next_code(&self, namespace: &str) -> Result<Code> {
        self.registry.next_code(namespace).await
    }

    /// Allocate with the configured bounded retry over conflicts
    pub async fn next_code_with_retry(&self, namespace: &str) -> Result<Code> {
        self.registry.next_code_with_retry(namespace).await
    }

    /// Reserve the next value without making it durable yet
    ///
    /// Commit the reservation together with the owning entity; dropping
    /// it releases the value for the next caller.
    ///
    /// # Examples
    ///
    /// ```
    /// # use seqcode::{Allocator, NamespaceConfig};
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> seqcode::Result<()> {
    /// # let allocator = Allocator::in_memory();
    /// # allocator.create_namespace("project", NamespaceConfig::new()).await?;
    /// let reservation = allocator.reserve("project").await?;
    /// assert_eq!(reservation.value(), 1);
    /// // ... create the owning entity, then:
    /// let code = reservation.commit().await?;
    /// assert_eq!(code.value, 1);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn reserve(&self, namespace: &str) -> Result<Reservation> {
        self.registry.reserve(namespace).await
    }

    /// Non-blocking reserve; fails retryable while another reservation
    /// is in flight
    pub async fn try_reserve(&self, namespace: &str) -> Result<Reservation> {
        self.registry.try_reserve(namespace).await
    }

    /// Claim a caller-computed value; only the exact next value is
    /// accepted
    pub async fn claim(&self, namespace: &str, value: u64) -> Result<Code> {
        self.registry.claim(namespace, value).await
    }

    /// The value the next allocation would return, without consuming it
    pub async fn peek(&self, namespace: &str) -> Result<u64> {
        self.registry.peek(namespace).await
    }

    /// Adopt a high-water mark from an external entity scan
    pub async fn adopt_high_water(
        &self,
        namespace: &str,
        source: &dyn CodeSource,
    ) -> Result<Option<u64>> {
        self.registry.adopt_high_water(namespace, source).await
    }

    /// Snapshot current state and truncate the WAL
    pub async fn checkpoint(&self) -> Result<()> {
        self.registry.checkpoint().await
    }

    /// Get registry statistics
    pub async fn stats(&self) -> RegistryStats {
        self.registry.stats().await
    }

    /// Get the underlying registry for advanced usage
    pub fn registry(&self) -> &Arc<CodeRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocator_basic_sequence() {
        let allocator = Allocator::in_memory();
        allocator
            .create_namespace("client", NamespaceConfig::new())
            .await
            .unwrap();

        for expected in 1..=10 {
            let code = allocator.next_code("client").await.unwrap();
            assert_eq!(code.value, expected);
        }
    }

    #[tokio::test]
    async fn test_allocator_clone_shares_registry() {
        let allocator = Allocator::in_memory();
        allocator
            .create_namespace("client", NamespaceConfig::new())
            .await
            .unwrap();

        let clone = allocator.clone();
        assert_eq!(allocator.next_code("client").await.unwrap().value, 1);
        assert_eq!(clone.next_code("client").await.unwrap().value, 2);
    }

    #[tokio::test]
    async fn test_allocator_stats() {
        let allocator = Allocator::in_memory();
        allocator
            .create_namespace("client", NamespaceConfig::new())
            .await
            .unwrap();
        allocator.next_code("client").await.unwrap();

        let stats = allocator.stats().await;
        assert_eq!(stats.namespaces, 1);
        assert_eq!(stats.codes_issued, 1);
    }
}
