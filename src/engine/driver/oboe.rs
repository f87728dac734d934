//! Android driver backed by oboe (AAudio/OpenSL ES)
//!
//! The oboe builder fixes the channel layout in the type system, so the
//! driver instantiates one of two callback wrappers: mono passes the
//! buffer straight through, stereo interleaves through a pre-allocated
//! scratch so the real-time path stays allocation-free.

use log::{debug, warn};
use oboe::{
    AudioOutputCallback, AudioOutputStreamSafe, AudioStream, AudioStreamAsync, AudioStreamBase,
    AudioStreamBuilder, Output, PerformanceMode, SharingMode,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::error::EngineError;

use super::{
    AudioDriver, DataCallback, DataCallbackResult, ErrorCallback, StateCell, StreamState,
    StreamTimestamp,
};

struct CallbackShared {
    on_data: DataCallback,
    on_error: ErrorCallback,
    frames_played: Arc<AtomicU64>,
}

impl CallbackShared {
    fn fill(&mut self, buffer: &mut [f32], frames: usize) -> oboe::DataCallbackResult {
        let result = (self.on_data)(buffer, frames);
        self.frames_played.fetch_add(frames as u64, Ordering::Relaxed);
        match result {
            DataCallbackResult::Continue => oboe::DataCallbackResult::Continue,
            DataCallbackResult::Stop => oboe::DataCallbackResult::Stop,
        }
    }

    fn fail(&self, error: oboe::Error) {
        (self.on_error)(&format!("{:?}", error));
    }
}

struct MonoCallback {
    shared: CallbackShared,
}

impl AudioOutputCallback for MonoCallback {
    type FrameType = (f32, oboe::Mono);

    fn on_audio_ready(
        &mut self,
        _stream: &mut dyn AudioOutputStreamSafe,
        frames: &mut [f32],
    ) -> oboe::DataCallbackResult {
        let count = frames.len();
        self.shared.fill(frames, count)
    }

    fn on_error_before_close(&mut self, _stream: &mut dyn AudioOutputStreamSafe, error: oboe::Error) {
        self.shared.fail(error);
    }
}

struct StereoCallback {
    shared: CallbackShared,
    // Interleaved staging buffer, sized at open for the largest burst
    scratch: Vec<f32>,
}

impl AudioOutputCallback for StereoCallback {
    type FrameType = (f32, oboe::Stereo);

    fn on_audio_ready(
        &mut self,
        _stream: &mut dyn AudioOutputStreamSafe,
        frames: &mut [(f32, f32)],
    ) -> oboe::DataCallbackResult {
        let count = frames.len().min(self.scratch.len() / 2);
        let interleaved = &mut self.scratch[..count * 2];
        let result = self.shared.fill(interleaved, count);

        for (frame, pair) in frames.iter_mut().zip(interleaved.chunks_exact(2)) {
            frame.0 = pair[0];
            frame.1 = pair[1];
        }
        for frame in frames.iter_mut().skip(count) {
            *frame = (0.0, 0.0);
        }
        result
    }

    fn on_error_before_close(&mut self, _stream: &mut dyn AudioOutputStreamSafe, error: oboe::Error) {
        self.shared.fail(error);
    }
}

enum Stream {
    Mono(AudioStreamAsync<Output, MonoCallback>),
    Stereo(AudioStreamAsync<Output, StereoCallback>),
}

macro_rules! with_stream {
    ($stream:expr, $name:ident => $body:expr) => {
        match $stream {
            Stream::Mono($name) => $body,
            Stream::Stereo($name) => $body,
        }
    };
}

/// Driver over an oboe output stream
pub struct OboeDriver {
    stream: Option<Stream>,
    state: Arc<StateCell>,
    frames_played: Arc<AtomicU64>,
    opened_at: Option<Instant>,
}

impl OboeDriver {
    pub fn new() -> Self {
        Self {
            stream: None,
            state: Arc::new(StateCell::new(StreamState::Closed)),
            frames_played: Arc::new(AtomicU64::new(0)),
            opened_at: None,
        }
    }

    fn shared(&self, on_data: DataCallback, on_error: ErrorCallback) -> CallbackShared {
        CallbackShared {
            on_data,
            on_error,
            frames_played: Arc::clone(&self.frames_played),
        }
    }
}

impl Default for OboeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDriver for OboeDriver {
    fn open_stream(
        &mut self,
        config: &EngineConfig,
        on_data: DataCallback,
        on_error: ErrorCallback,
    ) -> Result<(), EngineError> {
        if self.stream.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let performance_mode = if config.low_latency {
            PerformanceMode::LowLatency
        } else {
            PerformanceMode::None
        };

        let mut builder = AudioStreamBuilder::default()
            .set_performance_mode(performance_mode)
            .set_sharing_mode(SharingMode::Exclusive)
            .set_direction::<Output>()
            .set_sample_rate(config.sample_rate as i32)
            .set_frames_per_callback(config.frames_per_period as i32)
            .set_buffer_capacity_in_frames(config.buffer_capacity_frames() as i32);
        if config.device_id != 0 {
            builder = builder.set_device_id(config.device_id);
        }

        let stream = match config.channel_count {
            1 => builder
                .set_channel_count::<oboe::Mono>()
                .set_format::<f32>()
                .set_callback(MonoCallback {
                    shared: self.shared(on_data, on_error),
                })
                .open_stream()
                .map(Stream::Mono)
                .map_err(|e| EngineError::HardwareUnavailable {
                    reason: format!("output stream: {:?}", e),
                })?,
            2 => builder
                .set_channel_count::<oboe::Stereo>()
                .set_format::<f32>()
                .set_callback(StereoCallback {
                    shared: self.shared(on_data, on_error),
                    scratch: vec![0.0; config.max_buffer_frames as usize * 2],
                })
                .open_stream()
                .map(Stream::Stereo)
                .map_err(|e| EngineError::HardwareUnavailable {
                    reason: format!("output stream: {:?}", e),
                })?,
            other => {
                return Err(EngineError::HardwareUnavailable {
                    reason: format!("{} channels not supported by this backend (mono or stereo only)", other),
                });
            }
        };

        self.frames_played.store(0, Ordering::Relaxed);
        self.opened_at = Some(Instant::now());
        self.stream = Some(stream);
        self.state.set(StreamState::Open);
        debug!(
            "Opened oboe output stream: {} Hz, {} channels, {} frames per period",
            config.sample_rate, config.channel_count, config.frames_per_period
        );
        Ok(())
    }

    fn request_start(&mut self) -> Result<(), EngineError> {
        let stream = self.stream.as_mut().ok_or(EngineError::NotInitialized)?;
        self.state.set(StreamState::Starting);
        with_stream!(stream, s => s.start()).map_err(|e| EngineError::ProcessingFailed {
            reason: format!("failed to start stream: {:?}", e),
        })?;
        self.state.set(StreamState::Started);
        Ok(())
    }

    fn request_pause(&mut self) -> Result<(), EngineError> {
        let stream = self.stream.as_mut().ok_or(EngineError::NotInitialized)?;
        with_stream!(stream, s => s.pause()).map_err(|e| EngineError::ProcessingFailed {
            reason: format!("failed to pause stream: {:?}", e),
        })?;
        self.state.set(StreamState::Paused);
        Ok(())
    }

    fn request_stop(&mut self) -> Result<(), EngineError> {
        let stream = self.stream.as_mut().ok_or(EngineError::NotInitialized)?;
        with_stream!(stream, s => s.stop()).map_err(|e| EngineError::ProcessingFailed {
            reason: format!("failed to stop stream: {:?}", e),
        })?;
        self.state.set(StreamState::Stopped);
        Ok(())
    }

    fn wait_for_state_change(&self, from: StreamState, timeout: Duration) -> StreamState {
        self.state.wait_leave(from, timeout)
    }

    fn timestamp(&self) -> Option<StreamTimestamp> {
        // Software frame counter; the hardware presentation timestamp
        // needs a mutable stream handle, which this read path does not have
        let opened = self.opened_at?;
        self.stream.as_ref()?;
        Some(StreamTimestamp {
            frame_position: self.frames_played.load(Ordering::Relaxed) as i64,
            time_ns: opened.elapsed().as_nanos() as i64,
        })
    }

    fn buffer_size_frames(&self) -> Option<u32> {
        let stream = self.stream.as_ref()?;
        Some(with_stream!(stream, s => s.get_buffer_size_in_frames()) as u32)
    }

    fn frames_per_burst(&self) -> Option<u32> {
        let stream = self.stream.as_ref()?;
        Some(with_stream!(stream, s => s.get_frames_per_burst()) as u32)
    }

    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = with_stream!(&mut stream, s => s.stop()) {
                warn!("Failed to stop stream during close: {:?}", e);
            }
        }
        self.opened_at = None;
        self.state.set(StreamState::Closed);
    }
}
