pub mod catalog;
pub mod memory;
pub mod persistence;
pub mod scan;

pub use catalog::Catalog;
pub use memory::{CounterHandle, InMemoryCounters};
pub use persistence::{
    DurabilityMode, NamespaceRecord, PersistenceManager, RegistrySnapshot, SnapshotManager,
    WalEntry, WalManager, write_snapshot_json,
};
pub use scan::CodeSource;
