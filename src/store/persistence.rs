//! Write-Ahead Logging (WAL) and snapshot persistence for the code registry

use crate::core::{AllocError, NamespaceConfig, Result, SequenceState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

// ============================================================================
// WAL Entry Types
// ============================================================================

/// Write-Ahead Log entry types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    CreateNamespace {
        name: String,
        config: NamespaceConfig,
    },
    DropNamespace {
        name: String,
    },
    /// A code value became durable for its namespace
    Issue {
        namespace: String,
        value: u64,
    },
    /// High-water mark adopted from an external entity scan
    AdoptHighWater {
        namespace: String,
        value: u64,
    },
}

// ============================================================================
// Registry Snapshot
// ============================================================================

/// Everything the registry needs to resume a namespace after restart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceRecord {
    pub config: NamespaceConfig,
    pub state: SequenceState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u32,
    pub namespaces: HashMap<String, NamespaceRecord>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub namespace_count: usize,
    /// Sum of issued values across namespaces, for quick sanity checks
    pub issued_total: u64,
}

impl RegistrySnapshot {
    pub fn new(namespaces: HashMap<String, NamespaceRecord>) -> Self {
        let namespace_count = namespaces.len();
        let issued_total = namespaces
            .values()
            .filter_map(|r| r.state.last_issued)
            .sum();

        Self {
            version: 1,
            namespaces,
            metadata: SnapshotMetadata {
                created_at: Utc::now(),
                namespace_count,
                issued_total,
            },
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync every WAL append
    Sync,
    /// Flush to the OS on every append, no fsync
    #[default]
    Async,
    /// No WAL at all
    None,
}

// ============================================================================
// WAL Manager
// ============================================================================

pub struct WalManager {
    wal_path: PathBuf,
    wal_file: Option<BufWriter<File>>,
    durability_mode: DurabilityMode,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
}

impl WalManager {
    pub fn new<P: AsRef<Path>>(wal_path: P, durability_mode: DurabilityMode) -> Result<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        if let Some(parent) = wal_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AllocError::PersistError(format!("Failed to create WAL directory: {}", e)))?;
        }

        let wal_file = if durability_mode != DurabilityMode::None {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&wal_path)
                .map_err(|e| AllocError::PersistError(format!("Failed to open WAL file: {}", e)))?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        Ok(Self {
            wal_path,
            wal_file,
            durability_mode,
            entries_since_checkpoint: 0,
            checkpoint_threshold: 1000,
        })
    }

    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let file = self
            .wal_file
            .as_mut()
            .ok_or_else(|| AllocError::PersistError("WAL file not initialized".to_string()))?;
        let serialized = rmp_serde::to_vec(entry)
            .map_err(|e| AllocError::PersistError(format!("Failed to serialize WAL entry: {}", e)))?;
        let len = serialized.len() as u32;
        file.write_all(&len.to_le_bytes())
            .map_err(|e| AllocError::PersistError(format!("Failed to write WAL: {}", e)))?;
        file.write_all(&serialized)
            .map_err(|e| AllocError::PersistError(format!("Failed to write WAL: {}", e)))?;
        file.flush()
            .map_err(|e| AllocError::PersistError(format!("Failed to flush WAL: {}", e)))?;
        if self.durability_mode == DurabilityMode::Sync {
            file.get_mut()
                .sync_all()
                .map_err(|e| AllocError::PersistError(format!("Failed to sync WAL: {}", e)))?;
        }
        self.entries_since_checkpoint += 1;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<WalEntry>> {
        if !self.wal_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.wal_path)
            .map_err(|e| AllocError::PersistError(format!("Failed to open WAL for reading: {}", e)))?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(AllocError::PersistError(format!(
                        "Failed to read WAL entry length: {}",
                        e
                    )));
                }
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            reader.read_exact(&mut data).map_err(|e| {
                AllocError::PersistError(format!("Failed to read WAL entry data: {}", e))
            })?;
            let entry: WalEntry = rmp_serde::from_slice(&data).map_err(|e| {
                AllocError::PersistError(format!("Failed to deserialize WAL entry: {}", e))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.wal_file = None;
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.wal_path)
            .map_err(|e| AllocError::PersistError(format!("Failed to truncate WAL: {}", e)))?;
        self.wal_file = Some(BufWriter::new(file));
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.entries_since_checkpoint >= self.checkpoint_threshold
    }

    pub fn entries_since_checkpoint(&self) -> usize {
        self.entries_since_checkpoint
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold;
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn save(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AllocError::PersistError(format!("Failed to create snapshot directory: {}", e))
            })?;
        }
        // Write to a temp file, then rename: readers never see a torn snapshot
        let temp_path = self.snapshot_path.with_extension("tmp");
        let temp_file = File::create(&temp_path)
            .map_err(|e| AllocError::PersistError(format!("Failed to create temp file: {}", e)))?;
        let mut writer = BufWriter::new(temp_file);
        let serialized = rmp_serde::to_vec(snapshot)
            .map_err(|e| AllocError::PersistError(format!("Failed to serialize snapshot: {}", e)))?;
        writer
            .write_all(&serialized)
            .map_err(|e| AllocError::PersistError(format!("Failed to write snapshot: {}", e)))?;
        writer
            .flush()
            .map_err(|e| AllocError::PersistError(format!("Failed to flush snapshot: {}", e)))?;
        writer
            .get_mut()
            .sync_all()
            .map_err(|e| AllocError::PersistError(format!("Failed to sync snapshot: {}", e)))?;
        fs::rename(&temp_path, &self.snapshot_path)
            .map_err(|e| AllocError::PersistError(format!("Failed to rename snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<RegistrySnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.snapshot_path)
            .map_err(|e| AllocError::PersistError(format!("Failed to open snapshot: {}", e)))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| AllocError::PersistError(format!("Failed to read snapshot: {}", e)))?;
        let snapshot: RegistrySnapshot = rmp_serde::from_slice(&data).map_err(|e| {
            AllocError::PersistError(format!("Failed to deserialize snapshot: {}", e))
        })?;
        Ok(Some(snapshot))
    }

    /// Human-readable export for debugging and audits
    pub fn export_json<P: AsRef<Path>>(&self, snapshot: &RegistrySnapshot, path: P) -> Result<()> {
        write_snapshot_json(snapshot, path)
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    pub fn delete(&self) -> Result<()> {
        if self.snapshot_path.exists() {
            fs::remove_file(&self.snapshot_path)
                .map_err(|e| AllocError::PersistError(format!("Failed to delete snapshot: {}", e)))?;
        }
        Ok(())
    }
}

/// Human-readable snapshot export, shared by persistent and in-memory
/// registries.
pub fn write_snapshot_json<P: AsRef<Path>>(snapshot: &RegistrySnapshot, path: P) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| AllocError::PersistError(format!("Failed to encode snapshot: {}", e)))?;
    fs::write(path, json)
        .map_err(|e| AllocError::PersistError(format!("Failed to write JSON export: {}", e)))?;
    Ok(())
}

// ============================================================================
// Persistence Manager
// ============================================================================

pub struct PersistenceManager {
    wal: WalManager,
    snapshot: SnapshotManager,
    durability_mode: DurabilityMode,
}

impl PersistenceManager {
    pub fn new<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let wal_path = data_dir.join("seqcode.wal");
        let snapshot_path = data_dir.join("seqcode.snapshot");
        let wal = WalManager::new(wal_path, durability_mode)?;
        let snapshot = SnapshotManager::new(snapshot_path);
        Ok(Self {
            wal,
            snapshot,
            durability_mode,
        })
    }

    pub fn log(&mut self, entry: &WalEntry) -> Result<()> {
        self.wal.append(entry)
    }

    pub fn checkpoint(&mut self, namespaces: &HashMap<String, NamespaceRecord>) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let snapshot = RegistrySnapshot::new(namespaces.clone());
        self.snapshot.save(&snapshot)?;
        self.wal.clear()?;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.needs_checkpoint()
    }

    /// Rebuild namespace records from the last snapshot plus WAL replay.
    /// Returns `None` when there is nothing on disk.
    pub fn recover(&self) -> Result<Option<HashMap<String, NamespaceRecord>>> {
        let mut namespaces = if let Some(snapshot) = self.snapshot.load()? {
            snapshot.namespaces
        } else {
            HashMap::new()
        };

        let wal_entries = self.wal.read_all()?;
        if namespaces.is_empty() && wal_entries.is_empty() {
            return Ok(None);
        }

        for entry in wal_entries {
            match entry {
                WalEntry::CreateNamespace { name, config } => {
                    namespaces.insert(
                        name,
                        NamespaceRecord {
                            config,
                            state: SequenceState::new(),
                        },
                    );
                }
                WalEntry::DropNamespace { name } => {
                    namespaces.remove(&name);
                }
                WalEntry::Issue { namespace, value }
                | WalEntry::AdoptHighWater { namespace, value } => {
                    if let Some(record) = namespaces.get_mut(&namespace) {
                        record.state.raise_to(value);
                    }
                }
            }
        }
        Ok(Some(namespaces))
    }

    pub fn wal(&self) -> &WalManager {
        &self.wal
    }
    pub fn wal_mut(&mut self) -> &mut WalManager {
        &mut self.wal
    }
    pub fn snapshot(&self) -> &SnapshotManager {
        &self.snapshot
    }
    pub fn durability_mode(&self) -> DurabilityMode {
        self.durability_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wal_append_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");
        let mut wal = WalManager::new(&wal_path, DurabilityMode::Sync).unwrap();
        wal.append(&WalEntry::CreateNamespace {
            name: "client".to_string(),
            config: NamespaceConfig::new(),
        })
        .unwrap();
        wal.append(&WalEntry::Issue {
            namespace: "client".to_string(),
            value: 1,
        })
        .unwrap();
        let entries = wal.read_all().unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_wal_disabled_in_none_mode() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");
        let mut wal = WalManager::new(&wal_path, DurabilityMode::None).unwrap();
        wal.append(&WalEntry::Issue {
            namespace: "client".to_string(),
            value: 1,
        })
        .unwrap();
        assert!(wal.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot_path = temp_dir.path().join("test.snapshot");
        let snapshot_mgr = SnapshotManager::new(&snapshot_path);

        let mut namespaces = HashMap::new();
        namespaces.insert(
            "client".to_string(),
            NamespaceRecord {
                config: NamespaceConfig::new().prefix("CL").pad_width(3),
                state: SequenceState {
                    last_issued: Some(7),
                },
            },
        );
        let snapshot = RegistrySnapshot::new(namespaces);
        snapshot_mgr.save(&snapshot).unwrap();
        assert!(snapshot_mgr.exists());

        let loaded = snapshot_mgr.load().unwrap().unwrap();
        assert_eq!(loaded.metadata.namespace_count, 1);
        assert_eq!(loaded.metadata.issued_total, 7);
        assert_eq!(
            loaded.namespaces.get("client").unwrap().state.last_issued,
            Some(7)
        );
    }

    #[test]
    fn test_snapshot_json_export() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot_mgr = SnapshotManager::new(temp_dir.path().join("test.snapshot"));
        let snapshot = RegistrySnapshot::new(HashMap::new());
        let json_path = temp_dir.path().join("export.json");
        snapshot_mgr.export_json(&snapshot, &json_path).unwrap();
        let text = fs::read_to_string(&json_path).unwrap();
        assert!(text.contains("\"version\": 1"));
    }

    #[test]
    fn test_checkpoint_clears_wal() {
        let temp_dir = TempDir::new().unwrap();
        let mut persistence =
            PersistenceManager::new(temp_dir.path(), DurabilityMode::Sync).unwrap();
        persistence
            .log(&WalEntry::Issue {
                namespace: "client".to_string(),
                value: 1,
            })
            .unwrap();
        persistence
            .log(&WalEntry::Issue {
                namespace: "client".to_string(),
                value: 2,
            })
            .unwrap();
        assert_eq!(persistence.wal().entries_since_checkpoint(), 2);
        persistence.checkpoint(&HashMap::new()).unwrap();
        assert_eq!(persistence.wal().entries_since_checkpoint(), 0);
    }

    #[test]
    fn test_recovery_from_wal_only() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut persistence =
                PersistenceManager::new(temp_dir.path(), DurabilityMode::Sync).unwrap();
            persistence
                .log(&WalEntry::CreateNamespace {
                    name: "client".to_string(),
                    config: NamespaceConfig::new(),
                })
                .unwrap();
            persistence
                .log(&WalEntry::Issue {
                    namespace: "client".to_string(),
                    value: 1,
                })
                .unwrap();
            persistence
                .log(&WalEntry::Issue {
                    namespace: "client".to_string(),
                    value: 2,
                })
                .unwrap();
        }

        let persistence = PersistenceManager::new(temp_dir.path(), DurabilityMode::Sync).unwrap();
        let recovered = persistence.recover().unwrap().unwrap();
        let record = recovered.get("client").unwrap();
        assert_eq!(record.state.last_issued, Some(2));
    }

    #[test]
    fn test_recovery_snapshot_plus_wal() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut persistence =
                PersistenceManager::new(temp_dir.path(), DurabilityMode::Sync).unwrap();
            let mut namespaces = HashMap::new();
            namespaces.insert(
                "invoice".to_string(),
                NamespaceRecord {
                    config: NamespaceConfig::new(),
                    state: SequenceState {
                        last_issued: Some(10),
                    },
                },
            );
            persistence.checkpoint(&namespaces).unwrap();
            persistence
                .log(&WalEntry::Issue {
                    namespace: "invoice".to_string(),
                    value: 11,
                })
                .unwrap();
        }

        let persistence = PersistenceManager::new(temp_dir.path(), DurabilityMode::Sync).unwrap();
        let recovered = persistence.recover().unwrap().unwrap();
        assert_eq!(
            recovered.get("invoice").unwrap().state.last_issued,
            Some(11)
        );
    }

    #[test]
    fn test_recovery_empty_dir_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = PersistenceManager::new(temp_dir.path(), DurabilityMode::Sync).unwrap();
        assert!(persistence.recover().unwrap().is_none());
    }

    #[test]
    fn test_recovery_drop_namespace_wins() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut persistence =
                PersistenceManager::new(temp_dir.path(), DurabilityMode::Sync).unwrap();
            persistence
                .log(&WalEntry::CreateNamespace {
                    name: "todo".to_string(),
                    config: NamespaceConfig::new(),
                })
                .unwrap();
            persistence
                .log(&WalEntry::DropNamespace {
                    name: "todo".to_string(),
                })
                .unwrap();
        }

        let persistence = PersistenceManager::new(temp_dir.path(), DurabilityMode::Sync).unwrap();
        let recovered = persistence.recover().unwrap();
        // WAL was non-empty, so recovery reports state, just without the namespace
        assert!(recovered.unwrap().is_empty());
    }
}
