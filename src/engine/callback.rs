//! Real-time output callback path
//!
//! Invoked by the driver's dedicated thread once per period. The contract
//! here is strict: no allocation, no unbounded blocking, and completion
//! within `frames_per_period / sample_rate` seconds. The only lock taken
//! is the metrics mutex, held for a single record update.
//!
//! The audio content is an explicit placeholder for genuine DSP: digital
//! silence when the DSP path is disabled, a quiet phase-continuous 440 Hz
//! sine otherwise. Any real processing that replaces it must preserve the
//! same no-alloc/no-block/within-budget contract.

use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::engine::driver::DataCallbackResult;
use crate::engine::metrics::SessionState;
use crate::error::EngineError;

/// Test tone frequency in Hz
pub const TONE_FREQUENCY_HZ: f64 = 440.0;

/// Test tone amplitude (full scale = 1.0)
pub const TONE_AMPLITUDE: f64 = 0.1;

const TWO_PI: f64 = std::f64::consts::TAU;

/// State owned by the real-time callback
///
/// Built on the control thread at `initialize` and moved into the driver.
/// All audio is rendered through the pre-allocated scratch buffer, so the
/// callback never allocates regardless of how many frames the driver
/// presents. Configuration values are snapshots taken at stream-open time;
/// config is immutable for the duration of a run.
pub(crate) struct OutputCallback {
    session: Arc<SessionState>,
    scratch: Vec<f32>,
    channel_count: usize,
    dsp_enabled: bool,
    phase_increment: f64,
    period_budget_us: f64,
}

impl OutputCallback {
    /// Allocate the scratch buffer and capture the config snapshot
    ///
    /// The scratch buffer is `frames_per_period * channel_count` samples,
    /// zero-filled; allocation failure surfaces as `OutOfMemory` instead
    /// of aborting.
    pub(crate) fn new(
        session: Arc<SessionState>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let samples = config.period_samples();
        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(samples)
            .map_err(|_| EngineError::OutOfMemory)?;
        scratch.resize(samples, 0.0);

        Ok(Self {
            session,
            scratch,
            channel_count: config.channel_count as usize,
            dsp_enabled: config.dsp_enabled,
            phase_increment: TWO_PI * TONE_FREQUENCY_HZ / config.sample_rate as f64,
            period_budget_us: config.period_budget_us(),
        })
    }

    /// Fill the caller-owned output buffer for one period
    ///
    /// Always returns `Continue`; transient issues are recorded as metrics,
    /// never surfaced as failures that would interrupt the stream.
    pub(crate) fn on_audio_ready(
        &mut self,
        output: &mut [f32],
        num_frames: usize,
    ) -> DataCallbackResult {
        let started = Instant::now();

        let samples = (num_frames * self.channel_count).min(output.len());
        let output = &mut output[..samples];

        if self.dsp_enabled {
            self.write_tone(output);
        } else {
            output.fill(0.0);
        }

        let processing_us = started.elapsed().as_secs_f64() * 1_000_000.0;
        if let Ok(mut metrics) = self.session.metrics.lock() {
            metrics.record_callback(processing_us, self.period_budget_us);
        }

        DataCallbackResult::Continue
    }

    /// Render the test tone through the scratch buffer in period-sized
    /// chunks, identical across channels, phase-continuous across calls
    fn write_tone(&mut self, output: &mut [f32]) {
        let mut phase = self.session.phase();

        for chunk in output.chunks_mut(self.scratch.len()) {
            let frames = chunk.len() / self.channel_count;
            let written = frames * self.channel_count;
            for frame in 0..frames {
                let sample = (TONE_AMPLITUDE * phase.sin()) as f32;
                let base = frame * self.channel_count;
                for ch in 0..self.channel_count {
                    self.scratch[base + ch] = sample;
                }
                phase += self.phase_increment;
                if phase >= TWO_PI {
                    phase -= TWO_PI;
                }
            }
            chunk[..written].copy_from_slice(&self.scratch[..written]);
            // A trailing partial frame carries no tone data
            chunk[written..].fill(0.0);
        }

        self.session.set_phase(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback_with(dsp_enabled: bool) -> (OutputCallback, Arc<SessionState>) {
        let session = Arc::new(SessionState::new());
        let config = EngineConfig {
            dsp_enabled,
            ..EngineConfig::default()
        };
        let callback = OutputCallback::new(Arc::clone(&session), &config).unwrap();
        (callback, session)
    }

    #[test]
    fn test_silence_is_exact_zero() {
        let (mut callback, _session) = callback_with(false);
        let mut buffer = vec![1.0_f32; 512];

        let result = callback.on_audio_ready(&mut buffer, 256);

        assert_eq!(result, DataCallbackResult::Continue);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_tone_replicated_across_channels() {
        let (mut callback, _session) = callback_with(true);
        let mut buffer = vec![0.0_f32; 512];

        callback.on_audio_ready(&mut buffer, 256);

        for frame in buffer.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        // Not silence
        assert!(buffer.iter().any(|&s| s != 0.0));
        // Bounded by the configured amplitude
        assert!(buffer.iter().all(|&s| s.abs() <= TONE_AMPLITUDE as f32 + 1e-6));
    }

    #[test]
    fn test_tone_phase_continuity_across_callbacks() {
        let (mut split, _s1) = callback_with(true);
        let mut first = vec![0.0_f32; 512];
        let mut second = vec![0.0_f32; 512];
        split.on_audio_ready(&mut first, 256);
        split.on_audio_ready(&mut second, 256);

        let (mut whole, _s2) = callback_with(true);
        let mut joined = vec![0.0_f32; 1024];
        whole.on_audio_ready(&mut joined, 512);

        for (i, (&a, &b)) in first
            .iter()
            .chain(second.iter())
            .zip(joined.iter())
            .enumerate()
        {
            assert!(
                (a - b).abs() < 1e-6,
                "discontinuity at sample {}: {} vs {}",
                i,
                a,
                b
            );
        }
    }

    #[test]
    fn test_phase_wraps_within_two_pi() {
        let (mut callback, session) = callback_with(true);
        let mut buffer = vec![0.0_f32; 512];

        // Many periods of 440 Hz at 48 kHz fit in 100 callbacks
        for _ in 0..100 {
            callback.on_audio_ready(&mut buffer, 256);
        }

        let phase = session.phase();
        assert!((0.0..TWO_PI).contains(&phase), "phase {} out of range", phase);
    }

    #[test]
    fn test_phase_reset_restarts_waveform() {
        let (mut callback, session) = callback_with(true);
        let mut first = vec![0.0_f32; 512];
        callback.on_audio_ready(&mut first, 256);

        session.begin_session();
        let mut replay = vec![0.0_f32; 512];
        callback.on_audio_ready(&mut replay, 256);

        assert_eq!(first, replay);
    }

    #[test]
    fn test_oversized_buffer_renders_without_allocation_in_chunks() {
        let (mut callback, _session) = callback_with(true);
        // Driver presents four periods at once; scratch is one period
        let mut buffer = vec![0.0_f32; 2048];

        let result = callback.on_audio_ready(&mut buffer, 1024);

        assert_eq!(result, DataCallbackResult::Continue);
        assert!(buffer.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_partial_trailing_frame_is_silent() {
        let (mut callback, _session) = callback_with(true);
        // Stereo, but the last sample does not complete a frame
        let mut buffer = vec![1.0_f32; 511];

        callback.on_audio_ready(&mut buffer, 256);

        assert_eq!(buffer[510], 0.0);
        // Whole frames still carry the tone
        assert!(buffer[..510].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_callback_feeds_metrics() {
        let (mut callback, session) = callback_with(true);
        let mut buffer = vec![0.0_f32; 512];

        callback.on_audio_ready(&mut buffer, 256);
        callback.on_audio_ready(&mut buffer, 256);

        let metrics = session.metrics.lock().unwrap();
        assert_eq!(metrics.callback_count, 2);
        assert!(metrics.average_processing_time_us >= 0.0);
        assert!(metrics.max_processing_time_us >= metrics.average_processing_time_us - 1e-9);
    }

    #[test]
    fn test_scratch_allocation_matches_period() {
        let session = Arc::new(SessionState::new());
        let config = EngineConfig {
            frames_per_period: 128,
            channel_count: 4,
            ..EngineConfig::default()
        };
        let callback = OutputCallback::new(session, &config).unwrap();
        assert_eq!(callback.scratch.len(), 512);
        assert!(callback.scratch.iter().all(|&s| s == 0.0));
    }
}
