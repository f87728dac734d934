//! Foreign-boundary API
//!
//! Flat functions over a handle [`EngineRegistry`], shaped for a caller
//! that cannot consume Rust types: engines are referenced by opaque `i64`
//! handles, failures come back as sentinels (negative codes, `false`,
//! `-1.0`, `None`) and the full diagnostics go to the log. Nothing here
//! panics across the boundary.

use log::{info, warn};

use crate::config::EngineConfig;
use crate::engine::{AudioEngine, PerformanceMetrics};
use crate::error::{log_engine_error, ErrorCode};
use crate::registry::{EngineHandle, EngineRegistry};

/// Sentinel returned by [`measure_latency`] on any failure
pub const LATENCY_UNAVAILABLE: f64 = -1.0;

fn with_engine<R>(
    registry: &EngineRegistry,
    handle: i64,
    operation: &str,
    f: impl FnOnce(&mut AudioEngine) -> R,
) -> Option<R> {
    let engine = registry.lookup(EngineHandle::from_raw(handle)).or_else(|| {
        warn!("{} called with unknown engine handle {}", operation, handle);
        None
    })?;
    let mut guard = match engine.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    Some(f(&mut guard))
}

/// Create an engine over the platform driver, initialize it, and register it
///
/// Returns the engine handle (>= 1000) on success or a negative error code.
/// A failed initialize registers nothing.
pub fn initialize_engine(registry: &EngineRegistry, config: EngineConfig) -> i64 {
    initialize_engine_with_driver(registry, config, AudioEngine::with_default_driver())
}

/// [`initialize_engine`] over a caller-supplied engine, for injected drivers
pub fn initialize_engine_with_driver(
    registry: &EngineRegistry,
    config: EngineConfig,
    mut engine: AudioEngine,
) -> i64 {
    match engine.initialize(config) {
        Ok(()) => {
            let handle = registry.register(engine);
            info!("Engine initialized with handle {}", handle);
            handle.raw()
        }
        Err(err) => {
            log_engine_error(&err, "initialize_engine");
            err.code() as i64
        }
    }
}

/// Start playback; `false` on failure or unknown handle
pub fn start_playback(registry: &EngineRegistry, handle: i64) -> bool {
    with_engine(registry, handle, "start_playback", |engine| {
        match engine.start() {
            Ok(()) => true,
            Err(err) => {
                log_engine_error(&err, "start_playback");
                false
            }
        }
    })
    .unwrap_or(false)
}

/// Stop playback; `false` on failure or unknown handle
pub fn stop_playback(registry: &EngineRegistry, handle: i64) -> bool {
    with_engine(registry, handle, "stop_playback", |engine| {
        match engine.stop() {
            Ok(()) => true,
            Err(err) => {
                log_engine_error(&err, "stop_playback");
                false
            }
        }
    })
    .unwrap_or(false)
}

/// Pause playback; `false` on failure or unknown handle
pub fn pause_playback(registry: &EngineRegistry, handle: i64) -> bool {
    with_engine(registry, handle, "pause_playback", |engine| {
        match engine.pause() {
            Ok(()) => true,
            Err(err) => {
                log_engine_error(&err, "pause_playback");
                false
            }
        }
    })
    .unwrap_or(false)
}

/// Resume playback; `false` on failure or unknown handle
pub fn resume_playback(registry: &EngineRegistry, handle: i64) -> bool {
    with_engine(registry, handle, "resume_playback", |engine| {
        match engine.resume() {
            Ok(()) => true,
            Err(err) => {
                log_engine_error(&err, "resume_playback");
                false
            }
        }
    })
    .unwrap_or(false)
}

/// Run one buffer through the engine's processing path
///
/// The input length must be a non-zero multiple of the engine's channel
/// count. Returns the processed buffer, or `None` on any failure.
pub fn process_audio_buffer(
    registry: &EngineRegistry,
    handle: i64,
    input: Vec<f32>,
) -> Option<Vec<f32>> {
    with_engine(registry, handle, "process_audio_buffer", |engine| {
        let channels = engine.config().channel_count as usize;
        if input.is_empty() || input.len() % channels != 0 {
            warn!(
                "process_audio_buffer: {} samples is not a multiple of {} channels",
                input.len(),
                channels
            );
            return None;
        }

        let mut output = vec![0.0_f32; input.len()];
        match engine.process_audio_buffer(&input, &mut output) {
            Ok(()) => Some(output),
            Err(err) => {
                log_engine_error(&err, "process_audio_buffer");
                None
            }
        }
    })
    .flatten()
}

/// Estimated total latency in milliseconds, or [`LATENCY_UNAVAILABLE`]
pub fn measure_latency(registry: &EngineRegistry, handle: i64) -> f64 {
    with_engine(registry, handle, "measure_latency", |engine| {
        match engine.measure_latency() {
            Ok(latency_ms) => latency_ms,
            Err(err) => {
                log_engine_error(&err, "measure_latency");
                LATENCY_UNAVAILABLE
            }
        }
    })
    .unwrap_or(LATENCY_UNAVAILABLE)
}

/// Point-in-time metrics copy, or `None` on failure or unknown handle
pub fn get_performance_metrics(
    registry: &EngineRegistry,
    handle: i64,
) -> Option<PerformanceMetrics> {
    with_engine(registry, handle, "get_performance_metrics", |engine| {
        match engine.performance_metrics() {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                log_engine_error(&err, "get_performance_metrics");
                None
            }
        }
    })
    .flatten()
}

/// Replace the stored configuration; `false` on failure or unknown handle
pub fn update_configuration(registry: &EngineRegistry, handle: i64, config: EngineConfig) -> bool {
    with_engine(registry, handle, "update_configuration", |engine| {
        match engine.update_configuration(config) {
            Ok(()) => true,
            Err(err) => {
                log_engine_error(&err, "update_configuration");
                false
            }
        }
    })
    .unwrap_or(false)
}

/// Shut the engine down and release its handle
///
/// Always succeeds from the caller's perspective; an unknown handle is a
/// logged no-op.
pub fn shutdown_engine(registry: &EngineRegistry, handle: i64) {
    let handle = EngineHandle::from_raw(handle);
    if let Some(engine) = registry.lookup(handle) {
        let mut guard = match engine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.shutdown();
    }
    registry.erase(handle);
}
