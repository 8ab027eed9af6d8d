pub mod registry;

pub use registry::{CodeRegistry, RegistryStats};
