use crate::core::{AllocError, Result, SequenceState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Handle to one namespace's counter for concurrent access.
///
/// The counter cell and the issue lock are separate on purpose: reads
/// (`peek`, stats) only touch the cell, while the issue lock serializes
/// the compute-then-commit window of an allocation. A reservation holds
/// the issue lock for its whole lifetime, so two callers can never act
/// on the same "current max" observation.
#[derive(Debug, Clone)]
pub struct CounterHandle {
    state: Arc<RwLock<SequenceState>>,
    issue_lock: Arc<Mutex<()>>,
}

impl CounterHandle {
    fn new(state: SequenceState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            issue_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn state(&self) -> SequenceState {
        self.state.read().await.clone()
    }

    pub fn state_cell(&self) -> Arc<RwLock<SequenceState>> {
        Arc::clone(&self.state)
    }

    pub fn issue_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.issue_lock)
    }
}

/// In-memory counter store: one cell per namespace, each behind its own
/// lock so namespaces never contend with each other.
pub struct InMemoryCounters {
    counters: RwLock<HashMap<String, CounterHandle>>,
}

impl InMemoryCounters {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Create a fresh counter for a namespace
    pub async fn create(&self, name: &str) -> Result<()> {
        self.create_with_state(name, SequenceState::new()).await
    }

    /// Create a counter with pre-existing state (recovery path)
    pub async fn create_with_state(&self, name: &str, state: SequenceState) -> Result<()> {
        let mut counters = self.counters.write().await;
        if counters.contains_key(name) {
            return Err(AllocError::NamespaceExists(name.to_string()));
        }
        counters.insert(name.to_string(), CounterHandle::new(state));
        Ok(())
    }

    /// Remove a namespace's counter
    pub async fn remove(&self, name: &str) -> Result<()> {
        let mut counters = self.counters.write().await;
        if counters.remove(name).is_none() {
            return Err(AllocError::NamespaceNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Get a handle for concurrent access to one namespace's counter
    pub async fn handle(&self, name: &str) -> Result<CounterHandle> {
        self.counters
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AllocError::NamespaceNotFound(name.to_string()))
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.counters.read().await.contains_key(name)
    }

    pub async fn list(&self) -> Vec<String> {
        self.counters.read().await.keys().cloned().collect()
    }

    /// Materialize all counter states (for persistence snapshots)
    pub async fn states(&self) -> HashMap<String, SequenceState> {
        let counters = self.counters.read().await;
        let mut states = HashMap::with_capacity(counters.len());
        for (name, handle) in counters.iter() {
            states.insert(name.clone(), handle.state().await);
        }
        states
    }
}

impl Default for InMemoryCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_read_state() {
        let counters = InMemoryCounters::new();
        counters.create("client").await.unwrap();

        let handle = counters.handle("client").await.unwrap();
        assert_eq!(handle.state().await.last_issued, None);
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let counters = InMemoryCounters::new();
        counters.create("client").await.unwrap();
        let err = counters.create("client").await.unwrap_err();
        assert!(matches!(err, AllocError::NamespaceExists(_)));
    }

    #[tokio::test]
    async fn test_handle_unknown_namespace() {
        let counters = InMemoryCounters::new();
        let err = counters.handle("ghost").await.unwrap_err();
        assert!(matches!(err, AllocError::NamespaceNotFound(_)));
    }

    #[tokio::test]
    async fn test_handles_share_one_cell() {
        let counters = InMemoryCounters::new();
        counters.create("client").await.unwrap();

        let a = counters.handle("client").await.unwrap();
        let b = counters.handle("client").await.unwrap();

        a.state_cell().write().await.last_issued = Some(5);
        assert_eq!(b.state().await.last_issued, Some(5));
    }

    #[tokio::test]
    async fn test_remove_then_recreate_resets_state() {
        let counters = InMemoryCounters::new();
        counters
            .create_with_state(
                "client",
                SequenceState {
                    last_issued: Some(10),
                },
            )
            .await
            .unwrap();

        counters.remove("client").await.unwrap();
        counters.create("client").await.unwrap();

        let handle = counters.handle("client").await.unwrap();
        assert_eq!(handle.state().await.last_issued, None);
    }
}
