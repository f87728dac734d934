//! Desktop driver backed by cpal
//!
//! `cpal::Stream` is not `Send`, so the stream lives on a dedicated owner
//! thread for its whole life. Control operations talk to that thread over
//! a command channel and block on the reply; the audio callback itself is
//! installed once at open and never crosses the channel.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::error::EngineError;

use super::{
    AudioDriver, DataCallback, DataCallbackResult, ErrorCallback, StateCell, StreamState,
    StreamTimestamp,
};

enum Command {
    Play(mpsc::Sender<Result<(), String>>),
    Pause(mpsc::Sender<Result<(), String>>),
    Close,
}

struct Worker {
    commands: mpsc::Sender<Command>,
    handle: thread::JoinHandle<()>,
}

/// Driver over the default cpal output device
pub struct CpalDriver {
    worker: Option<Worker>,
    state: Arc<StateCell>,
    frames_played: Arc<AtomicU64>,
    frames_per_period: u32,
    opened_at: Option<Instant>,
}

impl CpalDriver {
    pub fn new() -> Self {
        Self {
            worker: None,
            state: Arc::new(StateCell::new(StreamState::Closed)),
            frames_played: Arc::new(AtomicU64::new(0)),
            frames_per_period: 0,
            opened_at: None,
        }
    }

    fn send(&self, make: impl FnOnce(mpsc::Sender<Result<(), String>>) -> Command) -> Result<(), EngineError> {
        let worker = self.worker.as_ref().ok_or(EngineError::NotInitialized)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        worker
            .commands
            .send(make(reply_tx))
            .map_err(|_| EngineError::ProcessingFailed {
                reason: "stream owner thread is gone".to_string(),
            })?;
        reply_rx
            .recv()
            .map_err(|_| EngineError::ProcessingFailed {
                reason: "stream owner thread dropped the reply".to_string(),
            })?
            .map_err(|reason| EngineError::ProcessingFailed { reason })
    }
}

impl Default for CpalDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDriver for CpalDriver {
    fn open_stream(
        &mut self,
        config: &EngineConfig,
        on_data: DataCallback,
        on_error: ErrorCallback,
    ) -> Result<(), EngineError> {
        if self.worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let stream_config = cpal::StreamConfig {
            channels: config.channel_count,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.frames_per_period),
        };
        let channel_count = config.channel_count as usize;
        let frames_played = Arc::clone(&self.frames_played);

        let (commands_tx, commands_rx) = mpsc::channel::<Command>();
        let (opened_tx, opened_rx) = mpsc::channel::<Result<(), String>>();

        let handle = thread::Builder::new()
            .name("warp-audio-stream".to_string())
            .spawn(move || {
                stream_owner(
                    stream_config,
                    channel_count,
                    on_data,
                    on_error,
                    frames_played,
                    commands_rx,
                    opened_tx,
                );
            })
            .map_err(|e| EngineError::HardwareUnavailable {
                reason: format!("failed to spawn stream owner thread: {}", e),
            })?;

        match opened_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                let _ = handle.join();
                return Err(EngineError::HardwareUnavailable { reason });
            }
            Err(_) => {
                let _ = handle.join();
                return Err(EngineError::HardwareUnavailable {
                    reason: "stream owner thread exited during open".to_string(),
                });
            }
        }

        self.worker = Some(Worker {
            commands: commands_tx,
            handle,
        });
        self.frames_per_period = config.frames_per_period;
        self.frames_played.store(0, Ordering::Relaxed);
        self.opened_at = Some(Instant::now());
        self.state.set(StreamState::Open);
        debug!(
            "Opened cpal output stream: {} Hz, {} channels, {} frames per period",
            config.sample_rate, config.channel_count, config.frames_per_period
        );
        Ok(())
    }

    fn request_start(&mut self) -> Result<(), EngineError> {
        self.state.set(StreamState::Starting);
        self.send(Command::Play)?;
        self.state.set(StreamState::Started);
        Ok(())
    }

    fn request_pause(&mut self) -> Result<(), EngineError> {
        self.send(Command::Pause)?;
        self.state.set(StreamState::Paused);
        Ok(())
    }

    fn request_stop(&mut self) -> Result<(), EngineError> {
        // cpal has no stop distinct from pause
        self.send(Command::Pause)?;
        self.state.set(StreamState::Stopped);
        Ok(())
    }

    fn wait_for_state_change(&self, from: StreamState, timeout: Duration) -> StreamState {
        self.state.wait_leave(from, timeout)
    }

    fn timestamp(&self) -> Option<StreamTimestamp> {
        let opened = self.opened_at?;
        Some(StreamTimestamp {
            frame_position: self.frames_played.load(Ordering::Relaxed) as i64,
            time_ns: opened.elapsed().as_nanos() as i64,
        })
    }

    fn buffer_size_frames(&self) -> Option<u32> {
        // cpal does not report the realized buffer size; assume double
        // buffering of the requested fixed period
        self.worker.as_ref().map(|_| self.frames_per_period * 2)
    }

    fn frames_per_burst(&self) -> Option<u32> {
        self.worker.as_ref().map(|_| self.frames_per_period)
    }

    fn close_stream(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.commands.send(Command::Close);
            if worker.handle.join().is_err() {
                warn!("Stream owner thread panicked during close");
            }
        }
        self.opened_at = None;
        self.state.set(StreamState::Closed);
    }
}

impl Drop for CpalDriver {
    fn drop(&mut self) {
        self.close_stream();
    }
}

/// Body of the stream owner thread
///
/// Builds the stream, reports the outcome, then serves control commands
/// until `Close`. The stream is dropped when this function returns.
fn stream_owner(
    stream_config: cpal::StreamConfig,
    channel_count: usize,
    mut on_data: DataCallback,
    on_error: ErrorCallback,
    frames_played: Arc<AtomicU64>,
    commands: mpsc::Receiver<Command>,
    opened: mpsc::Sender<Result<(), String>>,
) {
    let build = || -> Result<cpal::Stream, String> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| "no default output device".to_string())?;

        let supported = device
            .default_output_config()
            .map_err(|e| format!("failed to query default output config: {:?}", e))?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(format!(
                "only F32 output is supported, device reports {:?}",
                supported.sample_format()
            ));
        }

        let on_error = Arc::new(on_error);
        let err_fn = {
            let on_error = Arc::clone(&on_error);
            move |err: cpal::StreamError| on_error(&err.to_string())
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channel_count;
                    match on_data(data, frames) {
                        DataCallbackResult::Continue => {}
                        DataCallbackResult::Stop => data.fill(0.0),
                    }
                    frames_played.fetch_add(frames as u64, Ordering::Relaxed);
                },
                err_fn,
                None,
            )
            .map_err(|e| format!("failed to build output stream: {:?}", e))?;

        // Some hosts start streams on creation; normalize to paused
        stream
            .pause()
            .map_err(|e| format!("failed to pause new stream: {:?}", e))?;

        Ok(stream)
    };

    let stream = match build() {
        Ok(stream) => {
            let _ = opened.send(Ok(()));
            stream
        }
        Err(reason) => {
            let _ = opened.send(Err(reason));
            return;
        }
    };

    for command in commands {
        match command {
            Command::Play(reply) => {
                let _ = reply.send(stream.play().map_err(|e| e.to_string()));
            }
            Command::Pause(reply) => {
                let _ = reply.send(stream.pause().map_err(|e| e.to_string()));
            }
            Command::Close => break,
        }
    }
}
