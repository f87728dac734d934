//! Opaque handle registry for engines owned across the foreign boundary
//!
//! The foreign caller never holds an engine pointer; it holds an opaque
//! `i64` handle issued here. Handles are allocated from 1000 upward and
//! never reused within a process, so a stale handle can never alias a
//! newer engine. Lookup hands out a clone of the engine's `Arc`, which
//! keeps the registry map lock out of every engine operation: a
//! concurrent erase drops the map entry while in-flight calls finish on
//! their own reference.

use log::warn;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::engine::AudioEngine;

/// First handle value; everything below is reserved for error codes
pub const HANDLE_BASE: i64 = 1000;

/// Opaque engine identifier issued to the foreign caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(i64);

impl EngineHandle {
    /// Reconstruct a handle from the raw value a caller passed back
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw value handed across the boundary
    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle-to-engine map with process-unique handle allocation
///
/// Injectable: production code uses one registry per foreign binding,
/// tests construct their own so they never interfere with each other.
pub struct EngineRegistry {
    engines: Mutex<HashMap<EngineHandle, Arc<Mutex<AudioEngine>>>>,
    next_handle: AtomicI64,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            engines: Mutex::new(HashMap::new()),
            next_handle: AtomicI64::new(HANDLE_BASE),
        }
    }

    /// Store an engine and issue its handle
    pub fn register(&self, engine: AudioEngine) -> EngineHandle {
        let handle = EngineHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut engines = match self.engines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        engines.insert(handle, Arc::new(Mutex::new(engine)));
        handle
    }

    /// Resolve a handle to its engine, if still registered
    ///
    /// Returns a clone of the engine's `Arc`; the caller locks the engine
    /// itself, never the registry map.
    pub fn lookup(&self, handle: EngineHandle) -> Option<Arc<Mutex<AudioEngine>>> {
        let engines = match self.engines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        engines.get(&handle).map(Arc::clone)
    }

    /// Remove a handle; dropping the last reference shuts the engine down
    ///
    /// Unknown handles are a logged no-op.
    pub fn erase(&self, handle: EngineHandle) {
        let removed = {
            let mut engines = match self.engines.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            engines.remove(&handle)
        };
        if removed.is_none() {
            warn!("Attempted to erase unknown engine handle {}", handle);
        }
    }

    pub fn len(&self) -> usize {
        match self.engines.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
