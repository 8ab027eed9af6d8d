use std::time::Duration;

/// Bounded retry over retryable allocation conflicts.
///
/// A stale `claim` or a held reservation guard is worth re-attempting;
/// an exhausted namespace is not. When attempts run out the engine
/// reports `Contention` instead of looping forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts,
            backoff: Duration::from_millis(2),
        }
    }

    /// Set the pause between attempts
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Validate policy
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.attempts == 0 {
            return Err("attempts must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
