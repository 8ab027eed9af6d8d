use crate::allocator::{AllocatorEngine, Reservation};
use crate::config::AllocatorConfig;
use crate::core::{AllocError, Code, NamespaceConfig, Result};
use crate::store::{
    Catalog, CodeSource, InMemoryCounters, NamespaceRecord, PersistenceManager, RegistrySnapshot,
    WalEntry, write_snapshot_json,
};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{Mutex, RwLock};

// Global singleton registry for applications that want one shared
// allocator without wiring their own
lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<CodeRegistry> = Arc::new(CodeRegistry::in_memory());
}

/// Orchestrates the namespace catalog, the counter store, the
/// allocation engine, and (optionally) WAL/snapshot persistence.
pub struct CodeRegistry {
    catalog: Arc<RwLock<Catalog>>,
    counters: Arc<InMemoryCounters>,
    engine: AllocatorEngine,
    persistence: Option<Arc<Mutex<PersistenceManager>>>,
    config: AllocatorConfig,
}

impl CodeRegistry {
    /// Get the global registry instance shared across the process
    pub fn global() -> &'static Arc<CodeRegistry> {
        &GLOBAL_REGISTRY
    }

    /// Purely in-memory registry: no WAL, no snapshots
    pub fn in_memory() -> Self {
        Self::assemble(AllocatorConfig::new(), None)
    }

    /// Open a registry, recovering persisted state when the config
    /// names a data directory.
    pub async fn open(config: AllocatorConfig) -> Result<Self> {
        config.validate().map_err(AllocError::InvalidConfig)?;

        let Some(data_dir) = config.data_dir.clone() else {
            return Ok(Self::assemble(config, None));
        };

        let mut manager = PersistenceManager::new(&data_dir, config.durability)?;
        manager
            .wal_mut()
            .set_checkpoint_threshold(config.checkpoint_threshold);
        let recovered = manager.recover()?;

        let registry = Self::assemble(config, Some(Arc::new(Mutex::new(manager))));

        if let Some(records) = recovered {
            let count = records.len();
            for (name, record) in records {
                {
                    let mut catalog = registry.catalog.write().await;
                    *catalog = catalog.clone().with_namespace(&name, record.config)?;
                }
                registry
                    .counters
                    .create_with_state(&name, record.state)
                    .await?;
            }
            tracing::info!(namespaces = count, "recovered registry state");
        }

        Ok(registry)
    }

    fn assemble(
        config: AllocatorConfig,
        persistence: Option<Arc<Mutex<PersistenceManager>>>,
    ) -> Self {
        let catalog = Arc::new(RwLock::new(Catalog::new()));
        let counters = Arc::new(InMemoryCounters::new());
        let engine = AllocatorEngine::new(
            Arc::clone(&catalog),
            Arc::clone(&counters),
            persistence.clone(),
        );
        Self {
            catalog,
            counters,
            engine,
            persistence,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Namespace management
    // ------------------------------------------------------------------

    pub async fn create_namespace(&self, name: &str, config: NamespaceConfig) -> Result<()> {
        config.validate().map_err(AllocError::InvalidConfig)?;

        // Lock order is persistence before catalog, matching checkpoint.
        // The WAL entry lands before any in-memory mutation: a failed
        // append leaves both sides untouched.
        let mut persistence_guard = match &self.persistence {
            Some(persistence) => Some(persistence.lock().await),
            None => None,
        };
        {
            let mut catalog = self.catalog.write().await;
            let updated = catalog.clone().with_namespace(name, config.clone())?;
            if let Some(manager) = persistence_guard.as_mut() {
                manager.log(&WalEntry::CreateNamespace {
                    name: name.to_string(),
                    config,
                })?;
            }
            *catalog = updated;
        }
        drop(persistence_guard);
        self.counters.create(name).await?;

        tracing::info!(namespace = name, "namespace created");
        Ok(())
    }

    pub async fn drop_namespace(&self, name: &str) -> Result<()> {
        let mut persistence_guard = match &self.persistence {
            Some(persistence) => Some(persistence.lock().await),
            None => None,
        };
        {
            let mut catalog = self.catalog.write().await;
            let updated = catalog.clone().without_namespace(name)?;
            if let Some(manager) = persistence_guard.as_mut() {
                manager.log(&WalEntry::DropNamespace {
                    name: name.to_string(),
                })?;
            }
            *catalog = updated;
        }
        drop(persistence_guard);
        self.counters.remove(name).await?;

        tracing::info!(namespace = name, "namespace dropped");
        Ok(())
    }

    pub async fn namespaces(&self) -> Vec<String> {
        self.catalog
            .read()
            .await
            .list()
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub async fn namespace_config(&self, name: &str) -> Result<NamespaceConfig> {
        Ok(self.catalog.read().await.get(name)?.clone())
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    /// Allocate the next code in a namespace
    pub async fn next_code(&self, namespace: &str) -> Result<Code> {
        let code = self.engine.next_code(namespace).await?;
        self.maybe_checkpoint().await?;
        Ok(code)
    }

    /// Allocate with the configured retry policy
    pub async fn next_code_with_retry(&self, namespace: &str) -> Result<Code> {
        let code = self
            .engine
            .next_code_with_retry(namespace, self.config.retry)
            .await?;
        self.maybe_checkpoint().await?;
        Ok(code)
    }

    /// Reserve the next value for a two-phase allocate
    pub async fn reserve(&self, namespace: &str) -> Result<Reservation> {
        self.engine.reserve(namespace).await
    }

    /// Non-blocking reserve
    pub async fn try_reserve(&self, namespace: &str) -> Result<Reservation> {
        self.engine.try_reserve(namespace).await
    }

    /// Constraint-style claim of a caller-computed value
    pub async fn claim(&self, namespace: &str, value: u64) -> Result<Code> {
        let code = self.engine.claim(namespace, value).await?;
        self.maybe_checkpoint().await?;
        Ok(code)
    }

    /// The value the next allocation would return
    pub async fn peek(&self, namespace: &str) -> Result<u64> {
        self.engine.peek(namespace).await
    }

    /// Adopt a high-water mark from an external entity scan
    pub async fn adopt_high_water(
        &self,
        namespace: &str,
        source: &dyn CodeSource,
    ) -> Result<Option<u64>> {
        let adopted = self.engine.adopt_high_water(namespace, source).await?;
        self.maybe_checkpoint().await?;
        Ok(adopted)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Snapshot current state and truncate the WAL.
    ///
    /// The persistence lock is held across the state read and the
    /// snapshot+truncate. Commits append and advance their counter
    /// under the same lock, so every WAL entry the truncate discards
    /// is already reflected in the records the snapshot captures.
    pub async fn checkpoint(&self) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let mut manager = persistence.lock().await;
        let records = self.records().await;
        manager.checkpoint(&records)?;
        tracing::info!(namespaces = records.len(), "checkpoint written");
        Ok(())
    }

    async fn maybe_checkpoint(&self) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let needed = persistence.lock().await.needs_checkpoint();
        if needed {
            self.checkpoint().await?;
        }
        Ok(())
    }

    /// Export current state as pretty-printed JSON
    pub async fn export_snapshot_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let snapshot = RegistrySnapshot::new(self.records().await);
        write_snapshot_json(&snapshot, path)
    }

    async fn records(&self) -> HashMap<String, NamespaceRecord> {
        let catalog = self.catalog.read().await.clone();
        let states = self.counters.states().await;

        let mut records = HashMap::new();
        for (name, config) in catalog.iter() {
            let state = states.get(name).cloned().unwrap_or_default();
            records.insert(
                name.to_string(),
                NamespaceRecord {
                    config: config.clone(),
                    state,
                },
            );
        }
        records
    }

    // ------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------

    pub async fn stats(&self) -> RegistryStats {
        let metrics = self.engine.metrics();
        let wal_entries_since_checkpoint = match &self.persistence {
            Some(persistence) => persistence.lock().await.wal().entries_since_checkpoint(),
            None => 0,
        };
        RegistryStats {
            namespaces: self.catalog.read().await.len(),
            codes_issued: metrics.issued.load(Ordering::Relaxed),
            conflicts: metrics.conflicts.load(Ordering::Relaxed),
            reservations_aborted: metrics.aborted.load(Ordering::Relaxed),
            wal_entries_since_checkpoint,
        }
    }
}

/// Registry-level counters, analogous to a pool's stats view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub namespaces: usize,
    pub codes_issued: u64,
    pub conflicts: u64,
    pub reservations_aborted: u64,
    pub wal_entries_since_checkpoint: usize,
}
