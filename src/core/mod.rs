pub mod error;
pub mod types;

pub use error::{AllocError, Result};
pub use types::{Code, NamespaceConfig, SequenceState, DEFAULT_MAX, DEFAULT_START};
