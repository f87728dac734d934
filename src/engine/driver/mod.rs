//! Driver abstraction for the native audio stream
//!
//! The platform stream API is treated as a black box behind [`AudioDriver`]:
//! it opens an output stream, invokes the data callback on its own
//! real-time thread once per period, and reports asynchronous failures
//! through the error callback. Three implementations exist: a cpal-backed
//! desktop driver, an oboe-backed Android driver, and a deterministic
//! simulated driver for tests and headless environments.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Disposition returned by the data callback
///
/// `Continue` in all non-fatal cases; only the driver's own fatal-error
/// path stops the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCallbackResult {
    Continue,
    Stop,
}

/// Driver-side stream state, distinct from the engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Closed,
    Open,
    Starting,
    Started,
    Paused,
    Stopped,
}

/// Presentation timestamp reported by the driver
#[derive(Debug, Clone, Copy)]
pub struct StreamTimestamp {
    /// Frames presented to the device since the stream started
    pub frame_position: i64,
    /// Monotonic clock time of that presentation in nanoseconds
    pub time_ns: i64,
}

/// Periodic buffer-fill callback, invoked on the driver's real-time thread
///
/// Receives the caller-owned interleaved output buffer and the frame count.
pub type DataCallback = Box<dyn FnMut(&mut [f32], usize) -> DataCallbackResult + Send + 'static>;

/// Asynchronous stream-failure callback
///
/// May run on any driver-owned thread; implementations must be cheap and
/// non-blocking.
pub type ErrorCallback = Box<dyn Fn(&str) + Send + Sync + 'static>;

/// Black-box native stream driver
///
/// One driver instance backs one engine instance. All methods are called
/// from control threads; the driver owns the real-time thread that invokes
/// the data callback.
pub trait AudioDriver: Send {
    /// Open the output stream and install the callbacks
    fn open_stream(
        &mut self,
        config: &EngineConfig,
        on_data: DataCallback,
        on_error: ErrorCallback,
    ) -> Result<(), EngineError>;

    /// Ask the driver to start delivering callbacks
    fn request_start(&mut self) -> Result<(), EngineError>;

    /// Ask the driver to pause callback delivery
    fn request_pause(&mut self) -> Result<(), EngineError>;

    /// Ask the driver to stop callback delivery
    fn request_stop(&mut self) -> Result<(), EngineError>;

    /// Block until the stream leaves `from`, up to `timeout`
    ///
    /// Returns the state observed when the wait ended; if the timeout
    /// expires the returned state equals `from`.
    fn wait_for_state_change(&self, from: StreamState, timeout: Duration) -> StreamState;

    /// Current presentation timestamp, if the stream supports one
    fn timestamp(&self) -> Option<StreamTimestamp>;

    /// Driver buffer size in frames, once a stream is open
    fn buffer_size_frames(&self) -> Option<u32>;

    /// Frames delivered per burst/callback, once a stream is open
    fn frames_per_burst(&self) -> Option<u32>;

    /// Release the stream; safe to call when no stream is open
    fn close_stream(&mut self);
}

/// Shared stream-state cell with change notification
///
/// Used by driver implementations to publish their stream state to
/// `wait_for_state_change` callers.
#[derive(Debug)]
pub(crate) struct StateCell {
    state: Mutex<StreamState>,
    changed: Condvar,
}

impl StateCell {
    pub(crate) fn new(initial: StreamState) -> Self {
        Self {
            state: Mutex::new(initial),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn get(&self) -> StreamState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub(crate) fn set(&self, state: StreamState) {
        match self.state.lock() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
        self.changed.notify_all();
    }

    pub(crate) fn wait_leave(&self, from: StreamState, timeout: Duration) -> StreamState {
        let deadline = Instant::now() + timeout;
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *guard == from {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return *guard,
            };
            guard = match self.changed.wait_timeout(guard, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *guard
    }
}

mod sim;
pub use sim::{SimBehavior, SimController, SimDriver};

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use self::cpal::CpalDriver;

#[cfg(target_os = "android")]
mod oboe;
#[cfg(target_os = "android")]
pub use self::oboe::OboeDriver;

/// Platform default driver for real audio output
#[cfg(not(target_os = "android"))]
pub fn default_driver() -> Box<dyn AudioDriver> {
    Box::new(CpalDriver::new())
}

/// Platform default driver for real audio output
#[cfg(target_os = "android")]
pub fn default_driver() -> Box<dyn AudioDriver> {
    Box::new(OboeDriver::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_state_cell_set_get() {
        let cell = StateCell::new(StreamState::Closed);
        assert_eq!(cell.get(), StreamState::Closed);

        cell.set(StreamState::Open);
        assert_eq!(cell.get(), StreamState::Open);
    }

    #[test]
    fn test_wait_leave_times_out() {
        let cell = StateCell::new(StreamState::Starting);
        let observed = cell.wait_leave(StreamState::Starting, Duration::from_millis(20));
        assert_eq!(observed, StreamState::Starting);
    }

    #[test]
    fn test_wait_leave_returns_immediately_when_already_left() {
        let cell = StateCell::new(StreamState::Started);
        let observed = cell.wait_leave(StreamState::Starting, Duration::from_secs(1));
        assert_eq!(observed, StreamState::Started);
    }

    #[test]
    fn test_wait_leave_observes_concurrent_change() {
        let cell = Arc::new(StateCell::new(StreamState::Starting));
        let writer = Arc::clone(&cell);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            writer.set(StreamState::Started);
        });

        let observed = cell.wait_leave(StreamState::Starting, Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(observed, StreamState::Started);
    }
}
