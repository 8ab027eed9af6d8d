// ============================================================================
// Allocation Engine
// ============================================================================

use crate::allocator::reservation::Reservation;
use crate::allocator::retry::RetryPolicy;
use crate::core::{AllocError, Code, NamespaceConfig, Result};
use crate::store::{Catalog, CodeSource, CounterHandle, InMemoryCounters, PersistenceManager, WalEntry};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

/// Engine-level counters, shared with live reservations.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub issued: AtomicU64,
    pub conflicts: AtomicU64,
    pub aborted: AtomicU64,
}

/// Per-namespace sequential allocation over the counter store.
///
/// Every path that can consume a value runs under the namespace's issue
/// lock, so allocation behaves as if serialized even when requests
/// arrive concurrently. The scan-derived "max existing + 1" read exists
/// only behind [`adopt_high_water`](Self::adopt_high_water) and never
/// feeds an allocation directly.
pub struct AllocatorEngine {
    catalog: Arc<RwLock<Catalog>>,
    counters: Arc<InMemoryCounters>,
    persistence: Option<Arc<Mutex<PersistenceManager>>>,
    metrics: Arc<EngineMetrics>,
}

impl AllocatorEngine {
    pub fn new(
        catalog: Arc<RwLock<Catalog>>,
        counters: Arc<InMemoryCounters>,
        persistence: Option<Arc<Mutex<PersistenceManager>>>,
    ) -> Self {
        Self {
            catalog,
            counters,
            persistence,
            metrics: Arc::new(EngineMetrics::default()),
        }
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    async fn lookup(&self, namespace: &str) -> Result<(NamespaceConfig, CounterHandle)> {
        let config = self.catalog.read().await.get(namespace)?.clone();
        let handle = self.counters.handle(namespace).await?;
        Ok((config, handle))
    }

    /// Allocate the next code: reserve and commit in one step.
    pub async fn next_code(&self, namespace: &str) -> Result<Code> {
        let reservation = self.reserve(namespace).await?;
        reservation.commit().await
    }

    /// Reserve the next value, waiting for the issue lock if another
    /// reservation is in flight.
    pub async fn reserve(&self, namespace: &str) -> Result<Reservation> {
        let (config, handle) = self.lookup(namespace).await?;
        let guard = handle.issue_lock().lock_owned().await;
        self.build_reservation(namespace, config, handle, guard).await
    }

    /// Non-blocking reserve: fails with a retryable error when the
    /// issue lock is already held.
    pub async fn try_reserve(&self, namespace: &str) -> Result<Reservation> {
        let (config, handle) = self.lookup(namespace).await?;
        let guard = handle
            .issue_lock()
            .try_lock_owned()
            .map_err(|_| AllocError::ReservationHeld(namespace.to_string()))?;
        self.build_reservation(namespace, config, handle, guard).await
    }

    async fn build_reservation(
        &self,
        namespace: &str,
        config: NamespaceConfig,
        handle: CounterHandle,
        guard: tokio::sync::OwnedMutexGuard<()>,
    ) -> Result<Reservation> {
        let state = handle.state().await;
        let value = state
            .next_value(&config)
            .ok_or_else(|| AllocError::LimitExceeded {
                namespace: namespace.to_string(),
                max: config.max,
            })?;

        Ok(Reservation::new(
            namespace.to_string(),
            value,
            config,
            handle.state_cell(),
            self.persistence.clone(),
            Arc::clone(&self.metrics),
            guard,
        ))
    }

    /// Allocate with bounded retry over retryable conflicts.
    pub async fn next_code_with_retry(
        &self,
        namespace: &str,
        policy: RetryPolicy,
    ) -> Result<Code> {
        // A zero-attempt policy still tries once; reporting Contention
        // without ever touching the namespace would be a lie.
        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            match self.try_reserve(namespace).await {
                Ok(reservation) => return reservation.commit().await,
                Err(e) if e.is_retryable() => {
                    self.metrics.conflicts.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(namespace, attempt, attempts, "allocation conflict, retrying");
                    tokio::time::sleep(policy.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(AllocError::Contention {
            namespace: namespace.to_string(),
            attempts,
        })
    }

    /// Constraint-style allocation for callers that computed a value
    /// themselves: only the exact next value is accepted.
    ///
    /// A duplicate (the value was issued meanwhile) is the retryable
    /// conflict the unique-constraint strategy produces; the caller
    /// should recompute and claim again. A value ahead of the sequence
    /// would tear a gap into it and is rejected outright.
    pub async fn claim(&self, namespace: &str, value: u64) -> Result<Code> {
        let (config, handle) = self.lookup(namespace).await?;
        let _guard = handle.issue_lock().lock_owned().await;

        let cell = handle.state_cell();
        let expected = {
            let state = cell.read().await;
            state
                .next_value(&config)
                .ok_or_else(|| AllocError::LimitExceeded {
                    namespace: namespace.to_string(),
                    max: config.max,
                })?
        };

        if value < expected {
            self.metrics.conflicts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(namespace, value, expected, "duplicate claim rejected");
            return Err(AllocError::DuplicateCode {
                namespace: namespace.to_string(),
                value,
            });
        }
        if value > expected {
            return Err(AllocError::NonSequential {
                namespace: namespace.to_string(),
                value,
                expected,
            });
        }

        // WAL append and counter update stay inside one persistence-lock
        // critical section, same as Reservation::commit, so a concurrent
        // checkpoint sees either both or neither.
        match &self.persistence {
            Some(persistence) => {
                let mut manager = persistence.lock().await;
                manager.log(&WalEntry::Issue {
                    namespace: namespace.to_string(),
                    value,
                })?;
                cell.write().await.last_issued = Some(value);
            }
            None => {
                cell.write().await.last_issued = Some(value);
            }
        }
        self.metrics.issued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(namespace, value, "code claimed");

        Ok(Code::new(namespace, value, &config))
    }

    /// Read-only: the value the next allocation would return.
    pub async fn peek(&self, namespace: &str) -> Result<u64> {
        let (config, handle) = self.lookup(namespace).await?;
        let state = handle.state().await;
        state
            .next_value(&config)
            .ok_or_else(|| AllocError::LimitExceeded {
                namespace: namespace.to_string(),
                max: config.max,
            })
    }

    /// Adopt the high-water mark from an external entity scan.
    ///
    /// Raises `last_issued` to the scanned maximum; never lowers it.
    /// Returns the adopted value when the mark moved.
    pub async fn adopt_high_water(
        &self,
        namespace: &str,
        source: &dyn CodeSource,
    ) -> Result<Option<u64>> {
        let (config, handle) = self.lookup(namespace).await?;
        let _guard = handle.issue_lock().lock_owned().await;

        let Some(scanned) = source.max_assigned(namespace).await? else {
            return Ok(None);
        };

        if scanned > config.max {
            return Err(AllocError::StoreError(format!(
                "Scanned high water {} exceeds ceiling {} for namespace '{}'",
                scanned, config.max, namespace
            )));
        }

        // The issue guard keeps the state stable between the read and
        // the write; the persistence lock keeps the WAL entry and the
        // raise atomic relative to a concurrent checkpoint.
        let cell = handle.state_cell();
        if cell.read().await.last_issued.is_some_and(|last| last >= scanned) {
            return Ok(None);
        }

        match &self.persistence {
            Some(persistence) => {
                let mut manager = persistence.lock().await;
                manager.log(&WalEntry::AdoptHighWater {
                    namespace: namespace.to_string(),
                    value: scanned,
                })?;
                cell.write().await.raise_to(scanned);
            }
            None => {
                cell.write().await.raise_to(scanned);
            }
        }
        tracing::info!(namespace, value = scanned, "adopted high-water mark from entity scan");

        Ok(Some(scanned))
    }
}
