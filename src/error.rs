// Error types for the audio engine core
//
// This module defines the engine error taxonomy, providing structured error
// handling with numeric codes suitable for FFI communication. Errors cross
// the foreign boundary as discrete codes, never as panics or exceptions.

use log::error;
use std::fmt;

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the FFI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// FFI error code constants
///
/// These are negative so that `initialize_engine` can return either a valid
/// handle (>= 1000) or an error code in the same `i64`. Handle allocation
/// starts well above zero to keep the two ranges disjoint.
pub struct EngineErrorCodes {}

impl EngineErrorCodes {
    /// Configuration rejected by validation
    pub const INVALID_CONFIG: i32 = -1;

    /// Driver stream could not be opened
    pub const HARDWARE_UNAVAILABLE: i32 = -2;

    /// Buffer allocation failed
    pub const OUT_OF_MEMORY: i32 = -3;

    /// Operation requires the engine to not be running
    pub const ALREADY_RUNNING: i32 = -4;

    /// Operation requires an initialized engine
    pub const NOT_INITIALIZED: i32 = -5;

    /// Driver start/stop/pause request failed or timed out
    pub const PROCESSING_FAILED: i32 = -6;

    /// Reserved: measured latency exceeded the configured target
    pub const LATENCY_TOO_HIGH: i32 = -7;
}

/// Log an engine error with structured context
///
/// Logs the numeric code and message alongside the control operation that
/// failed. Non-blocking and never panics.
pub fn log_engine_error(err: &EngineError, context: &str) {
    error!(
        "Engine error in {}: code={}, component=AudioEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Engine errors surfaced by lifecycle and control operations
///
/// Validation failures and synchronous driver failures are reported to the
/// calling control operation. Asynchronous driver failures are absorbed into
/// the `Error` engine state instead of being raised here; recovery is an
/// explicit `shutdown` followed by re-`initialize`.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Configuration violates a documented bound. Deliberately coarse: the
    /// failing field is named in the logged diagnostics, not in the error.
    InvalidConfig,

    /// Driver stream could not be opened
    HardwareUnavailable { reason: String },

    /// Scratch buffer allocation failed
    OutOfMemory,

    /// Engine is initialized or running and the operation requires otherwise
    AlreadyRunning,

    /// Engine is not in a state that permits the operation
    NotInitialized,

    /// Driver request failed or the start confirmation timed out
    ProcessingFailed { reason: String },

    /// Reserved, not currently raised
    LatencyTooHigh,
}

impl ErrorCode for EngineError {
    fn code(&self) -> i32 {
        match self {
            EngineError::InvalidConfig => EngineErrorCodes::INVALID_CONFIG,
            EngineError::HardwareUnavailable { .. } => EngineErrorCodes::HARDWARE_UNAVAILABLE,
            EngineError::OutOfMemory => EngineErrorCodes::OUT_OF_MEMORY,
            EngineError::AlreadyRunning => EngineErrorCodes::ALREADY_RUNNING,
            EngineError::NotInitialized => EngineErrorCodes::NOT_INITIALIZED,
            EngineError::ProcessingFailed { .. } => EngineErrorCodes::PROCESSING_FAILED,
            EngineError::LatencyTooHigh => EngineErrorCodes::LATENCY_TOO_HIGH,
        }
    }

    fn message(&self) -> String {
        match self {
            EngineError::InvalidConfig => {
                "Invalid configuration (see logged diagnostics for the failing bound)".to_string()
            }
            EngineError::HardwareUnavailable { reason } => {
                format!("Audio hardware unavailable: {}", reason)
            }
            EngineError::OutOfMemory => "Audio buffer allocation failed".to_string(),
            EngineError::AlreadyRunning => {
                "Engine already running. Call stop() or shutdown() first.".to_string()
            }
            EngineError::NotInitialized => {
                "Engine not initialized. Call initialize() first.".to_string()
            }
            EngineError::ProcessingFailed { reason } => {
                format!("Audio processing failed: {}", reason)
            }
            EngineError::LatencyTooHigh => "Measured latency exceeds target".to_string(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EngineError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::HardwareUnavailable {
            reason: err.to_string(),
        }
    }
}
