//! Engine lifecycle state machine
//!
//! `AudioEngine` owns the configuration, the driver stream, and the single
//! authoritative lifecycle state, and mediates every control operation.
//! Control threads call into it at will; the driver's real-time thread only
//! ever sees the callback state built at `initialize` and the atomic
//! lifecycle cell, so no control operation can block the audio path.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::engine::callback::OutputCallback;
use crate::engine::driver::{self, AudioDriver, DataCallback, ErrorCallback, StreamState};
use crate::engine::metrics::{PerformanceMetrics, SessionState};
use crate::engine::state::{AtomicEngineState, EngineState};
use crate::error::{EngineError, ErrorCode};

/// Bound on the wait for the driver's start confirmation
pub const START_TIMEOUT: Duration = Duration::from_secs(1);

/// A single low-latency audio output engine
///
/// Created with an injected [`AudioDriver`]; one driver backs one engine.
/// The engine is `Send` and is normally owned by an
/// [`EngineRegistry`](crate::registry::EngineRegistry) behind a mutex, so
/// control operations take `&mut self`.
pub struct AudioEngine {
    state: Arc<AtomicEngineState>,
    config: EngineConfig,
    session: Arc<SessionState>,
    driver: Box<dyn AudioDriver>,
}

impl AudioEngine {
    /// Create an engine in `Uninitialized` over the given driver
    pub fn new(driver: Box<dyn AudioDriver>) -> Self {
        Self {
            state: Arc::new(AtomicEngineState::default()),
            config: EngineConfig::default(),
            session: Arc::new(SessionState::new()),
            driver,
        }
    }

    /// Create an engine over the platform's real audio driver
    pub fn with_default_driver() -> Self {
        Self::new(driver::default_driver())
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        self.state.load()
    }

    /// Currently committed configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate and commit a configuration, open the driver stream, and
    /// move to `Initialized`
    ///
    /// Fails with `AlreadyRunning` unless the engine is `Uninitialized`,
    /// `InvalidConfig` on a bound violation, `OutOfMemory` if the scratch
    /// buffer cannot be allocated, and `HardwareUnavailable` if the driver
    /// cannot open the stream; in every failure case the engine remains
    /// `Uninitialized`.
    pub fn initialize(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        if self.state.load() != EngineState::Uninitialized {
            error!("Engine already initialized");
            return Err(EngineError::AlreadyRunning);
        }

        config.validate()?;
        log_configuration(&config);

        let session = Arc::new(SessionState::new());
        let mut callback = OutputCallback::new(Arc::clone(&session), &config)?;
        let on_data: DataCallback =
            Box::new(move |buffer, frames| callback.on_audio_ready(buffer, frames));

        let state = Arc::clone(&self.state);
        let on_error: ErrorCallback = Box::new(move |reason| {
            error!("Driver reported stream error: {}", reason);
            state.store(EngineState::Error);
        });

        self.driver
            .open_stream(&config, on_data, on_error)
            .map_err(|err| {
                error!("Failed to open driver stream: {}", err.message());
                match err {
                    EngineError::HardwareUnavailable { .. } => err,
                    other => EngineError::HardwareUnavailable {
                        reason: other.message(),
                    },
                }
            })?;

        if let Some(burst) = self.driver.frames_per_burst() {
            if burst != config.frames_per_period {
                debug!(
                    "Frames per burst adjusted from {} to {} by the driver",
                    config.frames_per_period, burst
                );
            }
        }

        self.session = session;
        self.config = config;
        self.state.store(EngineState::Initialized);
        info!("Audio engine initialized");
        Ok(())
    }

    /// Start (or resume) playback, waiting up to [`START_TIMEOUT`] for the
    /// driver's confirmation
    ///
    /// Requires `Initialized` or `Paused`. On confirmed start the
    /// session-scoped counters and the tone phase reset and the engine is
    /// `Running`; on timeout or driver failure it is `Error`.
    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.state.load() {
            EngineState::Initialized | EngineState::Paused => {}
            _ => {
                error!("Engine not ready for playback");
                return Err(EngineError::NotInitialized);
            }
        }

        self.state.store(EngineState::Starting);

        if let Err(err) = self.driver.request_start() {
            error!("Failed to request stream start: {}", err.message());
            self.state.store(EngineState::Error);
            return Err(EngineError::ProcessingFailed {
                reason: err.message(),
            });
        }

        let observed = self
            .driver
            .wait_for_state_change(StreamState::Starting, START_TIMEOUT);
        if observed == StreamState::Started {
            self.session.begin_session();
            self.state.store(EngineState::Running);
            info!("Audio playback started");
            Ok(())
        } else {
            error!("Stream did not confirm start (state {:?})", observed);
            self.state.store(EngineState::Error);
            Err(EngineError::ProcessingFailed {
                reason: format!("stream did not confirm start (state {:?})", observed),
            })
        }
    }

    /// Stop playback; a no-op success when there is nothing to stop
    ///
    /// Best-effort: the engine advances to `Initialized` even when the
    /// driver's stop request fails, and the failure is still reported.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        match self.state.load() {
            EngineState::Running | EngineState::Paused | EngineState::Starting => {}
            _ => {
                debug!("Engine not running, nothing to stop");
                return Ok(());
            }
        }

        self.state.store(EngineState::Stopping);
        let result = self.driver.request_stop();
        self.state.store(EngineState::Initialized);

        match result {
            Ok(()) => {
                info!("Audio playback stopped");
                Ok(())
            }
            Err(err) => {
                error!("Failed to stop stream: {}", err.message());
                Err(EngineError::ProcessingFailed {
                    reason: err.message(),
                })
            }
        }
    }

    /// Pause playback; requires `Running`
    ///
    /// On driver failure the state is left unchanged.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        if self.state.load() != EngineState::Running {
            return Err(EngineError::NotInitialized);
        }

        if let Err(err) = self.driver.request_pause() {
            error!("Failed to pause stream: {}", err.message());
            return Err(EngineError::ProcessingFailed {
                reason: err.message(),
            });
        }

        self.state.store(EngineState::Paused);
        info!("Audio playback paused");
        Ok(())
    }

    /// Resume playback
    ///
    /// The driver abstraction does not distinguish resume from start.
    pub fn resume(&mut self) -> Result<(), EngineError> {
        self.start()
    }

    /// Tear down unconditionally and return to `Uninitialized`
    ///
    /// Idempotent and callable from any state, including `Error`. An
    /// active stream gets a best-effort stop before the stream is closed.
    pub fn shutdown(&mut self) {
        if self.state.load() == EngineState::Uninitialized {
            return;
        }

        if matches!(
            self.state.load(),
            EngineState::Running | EngineState::Paused | EngineState::Starting
        ) {
            if let Err(err) = self.stop() {
                warn!("Best-effort stop during shutdown failed: {}", err);
            }
        }

        self.driver.close_stream();
        self.state.store(EngineState::Uninitialized);
        info!("Audio engine shutdown complete");
    }

    /// Validate and replace the stored configuration
    ///
    /// Rejected with `AlreadyRunning` while `Running`. The driver stream
    /// is not reopened: the new config takes acoustic effect only after a
    /// full re-`initialize`.
    pub fn update_configuration(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        if self.state.load() == EngineState::Running {
            return Err(EngineError::AlreadyRunning);
        }

        config.validate()?;
        self.config = config;
        info!("Configuration updated; takes effect after the next initialize");
        Ok(())
    }

    /// Process one caller-supplied buffer outside the stream path
    ///
    /// Currently a passthrough copy; this is the extension point where
    /// real DSP would live.
    pub fn process_audio_buffer(
        &self,
        input: &[f32],
        output: &mut [f32],
    ) -> Result<(), EngineError> {
        match self.state.load() {
            EngineState::Initialized | EngineState::Running => {}
            _ => return Err(EngineError::NotInitialized),
        }

        if input.is_empty() || input.len() != output.len() {
            return Err(EngineError::ProcessingFailed {
                reason: format!(
                    "buffer size mismatch: input {}, output {}",
                    input.len(),
                    output.len()
                ),
            });
        }

        output.copy_from_slice(input);
        Ok(())
    }

    /// Estimate the stream latency and store it in the metrics record
    ///
    /// Control-thread operation: queries the driver's buffer sizing and
    /// timestamp, computes `(buffer + burst) * 1000 / sample_rate` ms and
    /// splits it 80/20 into output/input estimates.
    pub fn measure_latency(&mut self) -> Result<f64, EngineError> {
        if self.state.load() == EngineState::Uninitialized {
            return Err(EngineError::NotInitialized);
        }

        let timestamp = self
            .driver
            .timestamp()
            .ok_or_else(|| EngineError::ProcessingFailed {
                reason: "no stream timestamp available".to_string(),
            })?;
        debug!(
            "Stream timestamp: frame {} at {} ns",
            timestamp.frame_position, timestamp.time_ns
        );

        let buffer_frames = self
            .driver
            .buffer_size_frames()
            .unwrap_or_else(|| self.config.buffer_capacity_frames());
        let burst_frames = self
            .driver
            .frames_per_burst()
            .unwrap_or(self.config.frames_per_period);

        let total_ms =
            (buffer_frames + burst_frames) as f64 * 1000.0 / self.config.sample_rate as f64;

        let mut metrics =
            self.session
                .metrics
                .lock()
                .map_err(|_| EngineError::ProcessingFailed {
                    reason: "metrics lock poisoned".to_string(),
                })?;
        metrics.record_latency(total_ms);

        debug!(
            "Measured latency: {:.2} ms (target: {:.2} ms)",
            total_ms, self.config.target_latency_ms
        );
        Ok(total_ms)
    }

    /// Point-in-time copy of the metrics record
    pub fn performance_metrics(&self) -> Result<PerformanceMetrics, EngineError> {
        self.session
            .metrics
            .lock()
            .map(|metrics| metrics.clone())
            .map_err(|_| EngineError::ProcessingFailed {
                reason: "metrics lock poisoned".to_string(),
            })
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn log_configuration(config: &EngineConfig) {
    info!("Audio engine configuration:");
    info!("  Sample rate: {} Hz", config.sample_rate);
    info!("  Frames per period: {}", config.frames_per_period);
    info!("  Channel count: {}", config.channel_count);
    info!("  Target latency: {:.2} ms", config.target_latency_ms);
    info!(
        "  Low latency mode: {}",
        if config.low_latency { "enabled" } else { "disabled" }
    );
    info!(
        "  DSP processing: {}",
        if config.dsp_enabled { "enabled" } else { "disabled" }
    );
}
