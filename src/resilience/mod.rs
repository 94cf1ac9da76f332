//! Resilience layer: circuit breakers, stall detection, cancellation.

pub mod breaker;
pub mod shutdown;
pub mod stall;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState, HostHealth};
pub use shutdown::ShutdownSignal;
pub use stall::{spawn_stall_detector, Heartbeat};
