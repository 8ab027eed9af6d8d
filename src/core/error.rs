use thiserror::Error;

#[derive(Error, Debug)]
pub enum AllocError {
    #[error("Namespace '{0}' already exists")]
    NamespaceExists(String),

    #[error("Namespace '{0}' not found")]
    NamespaceNotFound(String),

    #[error("Sequence limit reached for namespace '{namespace}': maximum code {max} already issued, contact administrator")]
    LimitExceeded { namespace: String, max: u64 },

    #[error("Code {value} already issued in namespace '{namespace}'")]
    DuplicateCode { namespace: String, value: u64 },

    #[error("Code {value} is ahead of sequence in namespace '{namespace}' (expected {expected})")]
    NonSequential {
        namespace: String,
        value: u64,
        expected: u64,
    },

    #[error("Reservation already held for namespace '{0}'")]
    ReservationHeld(String),

    #[error("Allocation contention in namespace '{namespace}': gave up after {attempts} attempts")]
    Contention { namespace: String, attempts: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Persistence error: {0}")]
    PersistError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, AllocError>;

impl AllocError {
    /// Conflicts that a caller may resolve by re-invoking allocation.
    /// `LimitExceeded` is terminal: the namespace is exhausted.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DuplicateCode { .. } | Self::ReservationHeld(_)
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for AllocError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AllocError::DuplicateCode {
            namespace: "client".to_string(),
            value: 7,
        }
        .is_retryable());
        assert!(AllocError::ReservationHeld("client".to_string()).is_retryable());

        assert!(!AllocError::LimitExceeded {
            namespace: "client".to_string(),
            max: 999,
        }
        .is_retryable());
        assert!(!AllocError::NamespaceNotFound("client".to_string()).is_retryable());
    }

    #[test]
    fn test_limit_exceeded_message_is_actionable() {
        let err = AllocError::LimitExceeded {
            namespace: "client".to_string(),
            max: 999,
        };
        let msg = err.to_string();
        assert!(msg.contains("client"));
        assert!(msg.contains("999"));
        assert!(msg.contains("contact administrator"));
    }
}
