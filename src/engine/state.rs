//! Engine lifecycle state and its atomic cell
//!
//! The engine state is the single authoritative lifecycle value, read by
//! control threads and written by both control threads and the driver's
//! error callback. It is therefore published through an atomic cell rather
//! than a mutex: the real-time path must never wait on a control-thread
//! lock just to observe "is the engine running".

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of one engine instance
///
/// Initial state is `Uninitialized`; the only terminal exit is explicit
/// destruction via the registry. `Stopping` and `Starting` are transient
/// states visible to concurrent readers during control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Uninitialized = 0,
    Initialized = 1,
    Starting = 2,
    Running = 3,
    Paused = 4,
    Stopping = 5,
    Error = 6,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Initialized,
            2 => EngineState::Starting,
            3 => EngineState::Running,
            4 => EngineState::Paused,
            5 => EngineState::Stopping,
            6 => EngineState::Error,
            _ => EngineState::Uninitialized,
        }
    }
}

/// Lock-free cell holding an [`EngineState`]
///
/// Shared between control threads and the driver's asynchronous error
/// callback via `Arc`.
#[derive(Debug)]
pub struct AtomicEngineState {
    inner: AtomicU8,
}

impl AtomicEngineState {
    pub fn new(state: EngineState) -> Self {
        Self {
            inner: AtomicU8::new(state as u8),
        }
    }

    pub fn load(&self) -> EngineState {
        EngineState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn store(&self, state: EngineState) {
        self.inner.store(state as u8, Ordering::Release);
    }
}

impl Default for AtomicEngineState {
    fn default() -> Self {
        Self::new(EngineState::Uninitialized)
    }
}
