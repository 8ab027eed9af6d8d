use crate::allocator::RetryPolicy;
use crate::store::DurabilityMode;
use std::path::PathBuf;

/// Registry open configuration
///
/// With no data directory the registry is purely in-memory; with one it
/// writes a WAL, checkpoints into a snapshot, and recovers on open.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Directory for WAL and snapshot files; `None` disables persistence
    pub data_dir: Option<PathBuf>,

    /// WAL durability mode
    pub durability: DurabilityMode,

    /// WAL entries between automatic checkpoints
    pub checkpoint_threshold: usize,

    /// Retry policy for conflict-retrying allocation
    pub retry: RetryPolicy,
}

impl AllocatorConfig {
    pub fn new() -> Self {
        Self {
            data_dir: None,
            durability: DurabilityMode::default(),
            checkpoint_threshold: 1000,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the data directory, enabling persistence
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set the WAL durability mode
    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    /// Set the checkpoint threshold
    pub fn checkpoint_threshold(mut self, threshold: usize) -> Self {
        self.checkpoint_threshold = threshold;
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set the number of retry attempts, keeping the default backoff
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry.attempts = attempts;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.checkpoint_threshold == 0 {
            return Err("checkpoint_threshold must be > 0".to_string());
        }
        self.retry.validate()?;
        // Requesting fsync durability with nowhere to write is a mistake,
        // not something to silently ignore
        if self.data_dir.is_none() && self.durability == DurabilityMode::Sync {
            return Err("durability Sync requires a data_dir".to_string());
        }
        Ok(())
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self::new()
    }
}
