use crate::allocator::engine::EngineMetrics;
use crate::core::{Code, NamespaceConfig, Result, SequenceState};
use crate::store::{PersistenceManager, WalEntry};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// A reserved-but-not-yet-durable code value.
///
/// The reservation owns the namespace issue guard, so no other caller
/// can compute or commit a value for the same namespace while it is
/// alive. [`commit`](Self::commit) makes the value durable, which is
/// when the caller should persist it onto the owning entity. Dropping
/// the reservation without committing releases the value: the next
/// allocation returns the same number, keeping the sequence gap-free.
pub struct Reservation {
    namespace: String,
    value: u64,
    token: Uuid,
    config: NamespaceConfig,
    state: Arc<RwLock<SequenceState>>,
    persistence: Option<Arc<Mutex<PersistenceManager>>>,
    metrics: Arc<EngineMetrics>,
    committed: bool,
    _guard: OwnedMutexGuard<()>,
}

impl Reservation {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        namespace: String,
        value: u64,
        config: NamespaceConfig,
        state: Arc<RwLock<SequenceState>>,
        persistence: Option<Arc<Mutex<PersistenceManager>>>,
        metrics: Arc<EngineMetrics>,
        guard: OwnedMutexGuard<()>,
    ) -> Self {
        Self {
            namespace,
            value,
            token: Uuid::new_v4(),
            config,
            state,
            persistence,
            metrics,
            committed: false,
            _guard: guard,
        }
    }

    /// The value this reservation will commit
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Opaque token identifying this reservation
    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The display form the committed code will carry
    pub fn display(&self) -> String {
        self.config.render(self.value)
    }

    /// Make the reserved value durable and return the issued code.
    ///
    /// The WAL append and the counter update form one critical section
    /// under the persistence lock: a concurrent checkpoint serializes
    /// on the same lock, so its snapshot can never miss a value whose
    /// WAL entry the checkpoint truncates away. Within the section the
    /// entry is written before the counter advances, so a crash between
    /// the two can only re-issue durability, never lose an issued value.
    pub async fn commit(mut self) -> Result<Code> {
        match &self.persistence {
            Some(persistence) => {
                let mut manager = persistence.lock().await;
                manager.log(&WalEntry::Issue {
                    namespace: self.namespace.clone(),
                    value: self.value,
                })?;
                self.state.write().await.last_issued = Some(self.value);
            }
            None => {
                self.state.write().await.last_issued = Some(self.value);
            }
        }

        self.committed = true;
        self.metrics.issued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            namespace = %self.namespace,
            value = self.value,
            token = %self.token,
            "code issued"
        );

        Ok(Code::new(&self.namespace, self.value, &self.config))
    }

    /// Release the reservation without consuming the value.
    /// Equivalent to dropping it; provided for explicit call sites.
    pub fn abort(self) {}
}

// Hand-written: the persistence handle has no Debug impl, and the
// guard and metrics are noise anyway.
impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("namespace", &self.namespace)
            .field("value", &self.value)
            .field("token", &self.token)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            self.metrics.aborted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                namespace = %self.namespace,
                value = self.value,
                token = %self.token,
                "reservation released without commit"
            );
        }
    }
}
