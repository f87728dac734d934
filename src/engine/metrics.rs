//! Performance metrics accounting for the real-time callback path
//!
//! A single mutable record guarded by a mutex that is held only for the
//! brief update/read critical section, never across a whole callback. The
//! real-time thread is the only writer during playback; control threads
//! read point-in-time copies on demand. This is the only lock the
//! real-time thread ever touches.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Callback load above which an underrun is inferred, in percent
///
/// Heuristic, not driver-confirmed: a callback that consumed more than
/// this share of its period budget is counted as a likely underrun.
pub const UNDERRUN_LOAD_THRESHOLD: f64 = 80.0;

/// Share of total buffer latency attributed to the output side
const OUTPUT_LATENCY_SHARE: f64 = 0.8;

/// Running statistics for one engine instance
///
/// Counters are cumulative for the engine lifetime except the
/// session-scoped ones (`callback_count`, `missed_callbacks`,
/// `max_processing_time_us`), which reset at each transition into
/// `Running`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Data callbacks delivered this session
    pub callback_count: u64,
    /// Estimated callbacks the driver skipped this session
    pub missed_callbacks: u64,
    /// Inferred underruns (see [`UNDERRUN_LOAD_THRESHOLD`])
    pub buffer_underruns: u64,
    /// Running mean of callback processing time in microseconds
    pub average_processing_time_us: f64,
    /// Maximum callback processing time this session, microseconds
    pub max_processing_time_us: f64,
    /// Share of the period budget the last callback consumed, percent
    pub callback_load_percent: f64,
    /// Estimated input-side latency in milliseconds
    pub input_latency_ms: f64,
    /// Estimated output-side latency in milliseconds
    pub output_latency_ms: f64,
    /// Estimated total latency in milliseconds
    pub total_latency_ms: f64,
}

impl PerformanceMetrics {
    /// Fold one callback's processing time into the running statistics
    ///
    /// `available_us` is the period budget (`1e6 * frames_per_period /
    /// sample_rate`); exceeding [`UNDERRUN_LOAD_THRESHOLD`] percent of it
    /// counts as a heuristic underrun.
    pub(crate) fn record_callback(&mut self, processing_us: f64, available_us: f64) {
        self.callback_count += 1;

        let n = self.callback_count as f64;
        self.average_processing_time_us =
            (self.average_processing_time_us * (n - 1.0) + processing_us) / n;

        if processing_us > self.max_processing_time_us {
            self.max_processing_time_us = processing_us;
        }

        self.callback_load_percent = (processing_us / available_us) * 100.0;
        if self.callback_load_percent > UNDERRUN_LOAD_THRESHOLD {
            self.buffer_underruns += 1;
        }
    }

    /// Reset the session-scoped counters at a transition into `Running`
    pub(crate) fn begin_session(&mut self) {
        self.callback_count = 0;
        self.missed_callbacks = 0;
        self.max_processing_time_us = 0.0;
    }

    /// Store a latency measurement, split 80/20 between output and input
    pub(crate) fn record_latency(&mut self, total_ms: f64) {
        self.total_latency_ms = total_ms;
        self.output_latency_ms = total_ms * OUTPUT_LATENCY_SHARE;
        self.input_latency_ms = total_ms * (1.0 - OUTPUT_LATENCY_SHARE);
    }
}

/// Per-engine session state shared with the real-time callback
///
/// Holds the metrics record and the tone phase accumulator. Phase lives
/// here, per engine, so two concurrently running engines never share
/// generator state; it is reset at each transition into `Running`. Phase
/// is stored as raw f64 bits in an atomic so the real-time thread can
/// advance it without taking any lock.
#[derive(Debug, Default)]
pub struct SessionState {
    pub(crate) metrics: Mutex<PerformanceMetrics>,
    phase_bits: AtomicU64,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn phase(&self) -> f64 {
        f64::from_bits(self.phase_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_phase(&self, phase: f64) {
        self.phase_bits.store(phase.to_bits(), Ordering::Relaxed);
    }

    /// Reset session counters and phase at a transition into `Running`
    pub(crate) fn begin_session(&self) {
        self.set_phase(0.0);
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.begin_session();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET_US: f64 = 5333.0; // 256 frames at 48 kHz

    #[test]
    fn test_callback_count_increments() {
        let mut metrics = PerformanceMetrics::default();
        for _ in 0..100 {
            metrics.record_callback(100.0, BUDGET_US);
        }
        assert_eq!(metrics.callback_count, 100);
    }

    #[test]
    fn test_average_is_true_running_mean() {
        let mut metrics = PerformanceMetrics::default();
        let samples = [120.0, 80.0, 100.0, 300.0, 55.0];
        for s in samples {
            metrics.record_callback(s, BUDGET_US);
        }
        let expected: f64 = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((metrics.average_processing_time_us - expected).abs() < 1e-9);
    }

    #[test]
    fn test_max_is_monotone_within_session() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record_callback(200.0, BUDGET_US);
        metrics.record_callback(50.0, BUDGET_US);
        assert_eq!(metrics.max_processing_time_us, 200.0);

        metrics.record_callback(350.0, BUDGET_US);
        assert_eq!(metrics.max_processing_time_us, 350.0);
    }

    #[test]
    fn test_underrun_heuristic() {
        let mut metrics = PerformanceMetrics::default();

        // 50% load: no underrun
        metrics.record_callback(BUDGET_US * 0.5, BUDGET_US);
        assert_eq!(metrics.buffer_underruns, 0);

        // 90% load: counted
        metrics.record_callback(BUDGET_US * 0.9, BUDGET_US);
        assert_eq!(metrics.buffer_underruns, 1);
        assert!(metrics.callback_load_percent > UNDERRUN_LOAD_THRESHOLD);
    }

    #[test]
    fn test_begin_session_resets_session_counters_only() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record_callback(BUDGET_US * 0.9, BUDGET_US);
        metrics.record_latency(12.0);

        metrics.begin_session();

        assert_eq!(metrics.callback_count, 0);
        assert_eq!(metrics.missed_callbacks, 0);
        assert_eq!(metrics.max_processing_time_us, 0.0);
        // Underruns and latency estimates survive across sessions
        assert_eq!(metrics.buffer_underruns, 1);
        assert_eq!(metrics.total_latency_ms, 12.0);
    }

    #[test]
    fn test_mean_recovers_after_session_reset() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record_callback(500.0, BUDGET_US);
        metrics.begin_session();

        // With count back at zero the first sample defines the mean exactly
        metrics.record_callback(40.0, BUDGET_US);
        assert!((metrics.average_processing_time_us - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_latency_split() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record_latency(10.0);
        assert!((metrics.output_latency_ms - 8.0).abs() < 1e-9);
        assert!((metrics.input_latency_ms - 2.0).abs() < 1e-9);
        assert!((metrics.total_latency_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_session_phase_round_trip() {
        let session = SessionState::new();
        assert_eq!(session.phase(), 0.0);

        session.set_phase(std::f64::consts::PI);
        assert_eq!(session.phase(), std::f64::consts::PI);

        session.begin_session();
        assert_eq!(session.phase(), 0.0);
    }
}
