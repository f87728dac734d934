//! Low-latency audio output engine
//!
//! Split into the lifecycle state machine ([`core`]), the real-time
//! callback path ([`callback`]), performance accounting ([`metrics`]),
//! the atomic lifecycle cell ([`state`]), and the native stream drivers
//! ([`driver`]).

pub mod callback;
pub mod core;
pub mod driver;
pub mod metrics;
pub mod state;

pub use self::core::{AudioEngine, START_TIMEOUT};
pub use metrics::PerformanceMetrics;
pub use state::EngineState;
