//! Simulated driver for deterministic testing and headless environments
//!
//! Stands in for the native stream API without touching audio hardware.
//! The [`SimController`] handle lets a test drive the "real-time thread"
//! explicitly: pump data callbacks one period at a time, inspect the
//! rendered buffer, stall the start confirmation, or raise asynchronous
//! stream errors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::error::EngineError;

use super::{
    AudioDriver, DataCallback, ErrorCallback, StateCell, StreamState, StreamTimestamp,
};

/// Failure injection switches, fixed at construction
#[derive(Debug, Clone, Copy, Default)]
pub struct SimBehavior {
    /// `open_stream` fails with `HardwareUnavailable`
    pub fail_open: bool,
    /// `request_start` fails synchronously
    pub fail_start: bool,
    /// `request_start` succeeds but the stream never confirms `Started`
    pub stall_start: bool,
    /// `request_pause` fails
    pub fail_pause: bool,
    /// `request_stop` fails
    pub fail_stop: bool,
}

struct SimStream {
    on_data: DataCallback,
    on_error: ErrorCallback,
    buffer: Vec<f32>,
    frames_per_period: u32,
    buffer_capacity: u32,
}

struct SimShared {
    state: StateCell,
    behavior: SimBehavior,
    stream: Mutex<Option<SimStream>>,
    frames_pumped: AtomicU64,
    opened_at: Mutex<Option<Instant>>,
}

/// Deterministic in-process driver
pub struct SimDriver {
    shared: Arc<SimShared>,
}

impl SimDriver {
    pub fn new() -> Self {
        Self::with_behavior(SimBehavior::default())
    }

    pub fn with_behavior(behavior: SimBehavior) -> Self {
        Self {
            shared: Arc::new(SimShared {
                state: StateCell::new(StreamState::Closed),
                behavior,
                stream: Mutex::new(None),
                frames_pumped: AtomicU64::new(0),
                opened_at: Mutex::new(None),
            }),
        }
    }

    /// Controller sharing this driver's state, kept by the test after the
    /// driver itself has been handed to an engine
    pub fn controller(&self) -> SimController {
        SimController {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDriver for SimDriver {
    fn open_stream(
        &mut self,
        config: &EngineConfig,
        on_data: DataCallback,
        on_error: ErrorCallback,
    ) -> Result<(), EngineError> {
        if self.shared.behavior.fail_open {
            return Err(EngineError::HardwareUnavailable {
                reason: "simulated open failure".to_string(),
            });
        }

        let stream = SimStream {
            on_data,
            on_error,
            buffer: vec![0.0; config.period_samples()],
            frames_per_period: config.frames_per_period,
            buffer_capacity: config.buffer_capacity_frames(),
        };

        if let Ok(mut slot) = self.shared.stream.lock() {
            *slot = Some(stream);
        }
        if let Ok(mut opened) = self.shared.opened_at.lock() {
            *opened = Some(Instant::now());
        }
        self.shared.frames_pumped.store(0, Ordering::Relaxed);
        self.shared.state.set(StreamState::Open);
        Ok(())
    }

    fn request_start(&mut self) -> Result<(), EngineError> {
        if self.shared.state.get() == StreamState::Closed {
            return Err(EngineError::ProcessingFailed {
                reason: "no open stream".to_string(),
            });
        }
        if self.shared.behavior.fail_start {
            return Err(EngineError::ProcessingFailed {
                reason: "simulated start failure".to_string(),
            });
        }

        self.shared.state.set(StreamState::Starting);
        if !self.shared.behavior.stall_start {
            self.shared.state.set(StreamState::Started);
        }
        Ok(())
    }

    fn request_pause(&mut self) -> Result<(), EngineError> {
        if self.shared.behavior.fail_pause {
            return Err(EngineError::ProcessingFailed {
                reason: "simulated pause failure".to_string(),
            });
        }
        self.shared.state.set(StreamState::Paused);
        Ok(())
    }

    fn request_stop(&mut self) -> Result<(), EngineError> {
        if self.shared.behavior.fail_stop {
            return Err(EngineError::ProcessingFailed {
                reason: "simulated stop failure".to_string(),
            });
        }
        self.shared.state.set(StreamState::Stopped);
        Ok(())
    }

    fn wait_for_state_change(&self, from: StreamState, timeout: Duration) -> StreamState {
        self.shared.state.wait_leave(from, timeout)
    }

    fn timestamp(&self) -> Option<StreamTimestamp> {
        let opened = (*self.shared.opened_at.lock().ok()?)?;
        Some(StreamTimestamp {
            frame_position: self.shared.frames_pumped.load(Ordering::Relaxed) as i64,
            time_ns: opened.elapsed().as_nanos() as i64,
        })
    }

    fn buffer_size_frames(&self) -> Option<u32> {
        let guard = self.shared.stream.lock().ok()?;
        // The capacity a real driver would have been asked for
        guard.as_ref().map(|s| s.buffer_capacity)
    }

    fn frames_per_burst(&self) -> Option<u32> {
        let guard = self.shared.stream.lock().ok()?;
        guard.as_ref().map(|s| s.frames_per_period)
    }

    fn close_stream(&mut self) {
        if let Ok(mut slot) = self.shared.stream.lock() {
            *slot = None;
        }
        self.shared.state.set(StreamState::Closed);
    }
}

/// Test-side handle that plays the role of the driver's real-time thread
#[derive(Clone)]
pub struct SimController {
    shared: Arc<SimShared>,
}

impl SimController {
    /// Deliver one data callback and return a copy of the filled buffer
    ///
    /// Returns `None` unless the stream is in `Started`.
    pub fn pump_one(&self) -> Option<Vec<f32>> {
        if self.shared.state.get() != StreamState::Started {
            return None;
        }
        let mut guard = self.shared.stream.lock().ok()?;
        let stream = guard.as_mut()?;

        let frames = stream.frames_per_period as usize;
        (stream.on_data)(&mut stream.buffer, frames);
        self.shared
            .frames_pumped
            .fetch_add(frames as u64, Ordering::Relaxed);
        Some(stream.buffer.clone())
    }

    /// Deliver `periods` data callbacks; returns how many were delivered
    pub fn pump(&self, periods: usize) -> usize {
        (0..periods).take_while(|_| self.pump_one().is_some()).count()
    }

    /// Confirm a stalled start (moves `Starting` to `Started`)
    pub fn confirm_start(&self) {
        if self.shared.state.get() == StreamState::Starting {
            self.shared.state.set(StreamState::Started);
        }
    }

    /// Invoke the asynchronous error callback, as the driver would on a
    /// stream failure
    pub fn raise_error(&self, reason: &str) {
        if let Ok(guard) = self.shared.stream.lock() {
            if let Some(stream) = guard.as_ref() {
                (stream.on_error)(reason);
            }
        }
    }

    /// Current driver-side stream state
    pub fn stream_state(&self) -> StreamState {
        self.shared.state.get()
    }
}
