pub mod engine;
pub mod reservation;
pub mod retry;

pub use engine::{AllocatorEngine, EngineMetrics};
pub use reservation::Reservation;
pub use retry::RetryPolicy;
