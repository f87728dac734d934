//! Engine configuration and validation
//!
//! This module provides the output-stream configuration committed to an
//! engine at initialize/update time, plus runtime loading from JSON files
//! so stream parameters can be adjusted without recompilation.
//!
//! An engine never holds an invalid config: every config is validated
//! before being committed, and the bounds below are the single source of
//! truth for what "valid" means.

use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::EngineError;

/// Accepted sample rate range in Hz
pub const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8_000..=768_000;

/// Accepted channel count range
pub const CHANNEL_COUNT_RANGE: std::ops::RangeInclusive<u16> = 1..=8;

/// Accepted frames-per-period range
pub const FRAMES_PER_PERIOD_RANGE: std::ops::RangeInclusive<u32> = 64..=2048;

/// Accepted target latency range in milliseconds
pub const TARGET_LATENCY_MS_RANGE: std::ops::RangeInclusive<f64> = 1.0..=1000.0;

/// PCM sample format requested from the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    Pcm16,
    Pcm24,
    Float32,
}

/// Configuration for a single low-latency output stream
///
/// Copied into the engine at `initialize`/`update_configuration`, never
/// shared. Changes committed while the engine is stopped take acoustic
/// effect only after the next `initialize` (the driver stream is not
/// reopened on update).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Frames delivered per data callback
    pub frames_per_period: u32,
    /// Number of interleaved output channels
    pub channel_count: u16,
    /// Requested PCM format
    pub sample_format: SampleFormat,
    /// Driver device identifier (0 = default device)
    pub device_id: i32,
    /// Request the driver's low-latency performance mode
    pub low_latency: bool,
    /// Enable the DSP path (currently the 440 Hz test tone)
    pub dsp_enabled: bool,
    /// Target end-to-end latency in milliseconds
    pub target_latency_ms: f64,
    /// Lower bound for driver buffer sizing in frames
    pub min_buffer_frames: u32,
    /// Upper bound for driver buffer sizing in frames
    pub max_buffer_frames: u32,
    /// Hint for the callback thread priority (platform-specific)
    pub thread_priority: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frames_per_period: 256,
            channel_count: 2,
            sample_format: SampleFormat::Float32,
            device_id: 0,
            low_latency: true,
            dsp_enabled: true,
            target_latency_ms: 10.0,
            min_buffer_frames: 64,
            max_buffer_frames: 2048,
            thread_priority: -19,
        }
    }
}

impl EngineConfig {
    /// Validate this configuration against the documented bounds
    ///
    /// Pure check with no side effects beyond diagnostics. The returned
    /// error is deliberately coarse (`InvalidConfig` names no field); the
    /// failing bound is named in the error log instead.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            error!("Invalid sample rate: {} Hz", self.sample_rate);
            return Err(EngineError::InvalidConfig);
        }

        if !CHANNEL_COUNT_RANGE.contains(&self.channel_count) {
            error!("Invalid channel count: {}", self.channel_count);
            return Err(EngineError::InvalidConfig);
        }

        if !FRAMES_PER_PERIOD_RANGE.contains(&self.frames_per_period) {
            error!("Invalid frames per period: {}", self.frames_per_period);
            return Err(EngineError::InvalidConfig);
        }

        if !TARGET_LATENCY_MS_RANGE.contains(&self.target_latency_ms) {
            error!("Invalid target latency: {:.2} ms", self.target_latency_ms);
            return Err(EngineError::InvalidConfig);
        }

        Ok(())
    }

    /// Samples per callback period (`frames_per_period * channel_count`)
    pub fn period_samples(&self) -> usize {
        self.frames_per_period as usize * self.channel_count as usize
    }

    /// Wall-clock budget of one callback period in microseconds
    pub fn period_budget_us(&self) -> f64 {
        1_000_000.0 * self.frames_per_period as f64 / self.sample_rate as f64
    }

    /// Buffer capacity requested from the driver, in frames
    ///
    /// Double buffering of the callback period, clamped to the configured
    /// sizing bounds.
    pub fn buffer_capacity_frames(&self) -> u32 {
        (self.frames_per_period * 2).clamp(self.min_buffer_frames, self.max_buffer_frames)
    }

    /// Load configuration from a JSON file, falling back to defaults
    ///
    /// Missing or malformed files log a warning and yield the default
    /// config, so callers can ship without a config file present.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_sample_rate_bounds() {
        let mut config = EngineConfig::default();

        config.sample_rate = 7_999;
        assert_eq!(config.validate(), Err(EngineError::InvalidConfig));

        config.sample_rate = 8_000;
        assert!(config.validate().is_ok());

        config.sample_rate = 768_000;
        assert!(config.validate().is_ok());

        config.sample_rate = 768_001;
        assert_eq!(config.validate(), Err(EngineError::InvalidConfig));
    }

    #[test]
    fn test_channel_count_bounds() {
        let mut config = EngineConfig::default();

        config.channel_count = 0;
        assert_eq!(config.validate(), Err(EngineError::InvalidConfig));

        config.channel_count = 1;
        assert!(config.validate().is_ok());

        config.channel_count = 8;
        assert!(config.validate().is_ok());

        config.channel_count = 9;
        assert_eq!(config.validate(), Err(EngineError::InvalidConfig));
    }

    #[test]
    fn test_frames_per_period_bounds() {
        let mut config = EngineConfig::default();

        config.frames_per_period = 63;
        assert_eq!(config.validate(), Err(EngineError::InvalidConfig));

        config.frames_per_period = 64;
        assert!(config.validate().is_ok());

        config.frames_per_period = 2048;
        assert!(config.validate().is_ok());

        config.frames_per_period = 2049;
        assert_eq!(config.validate(), Err(EngineError::InvalidConfig));
    }

    #[test]
    fn test_target_latency_bounds() {
        let mut config = EngineConfig::default();

        config.target_latency_ms = 0.5;
        assert_eq!(config.validate(), Err(EngineError::InvalidConfig));

        config.target_latency_ms = 1.0;
        assert!(config.validate().is_ok());

        config.target_latency_ms = 1000.0;
        assert!(config.validate().is_ok());

        config.target_latency_ms = 1000.1;
        assert_eq!(config.validate(), Err(EngineError::InvalidConfig));
    }

    #[test]
    fn test_period_samples() {
        let config = EngineConfig {
            frames_per_period: 256,
            channel_count: 2,
            ..EngineConfig::default()
        };
        assert_eq!(config.period_samples(), 512);
    }

    #[test]
    fn test_period_budget_us() {
        let config = EngineConfig {
            sample_rate: 48_000,
            frames_per_period: 480,
            ..EngineConfig::default()
        };
        // 480 frames at 48 kHz is exactly 10ms
        assert!((config.period_budget_us() - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_buffer_capacity_clamped_to_bounds() {
        let config = EngineConfig::default();
        assert_eq!(config.buffer_capacity_frames(), 512);

        let config = EngineConfig {
            frames_per_period: 64,
            min_buffer_frames: 256,
            ..EngineConfig::default()
        };
        assert_eq!(config.buffer_capacity_frames(), 256);

        let config = EngineConfig {
            frames_per_period: 2048,
            max_buffer_frames: 2048,
            ..EngineConfig::default()
        };
        assert_eq!(config.buffer_capacity_frames(), 2048);
    }

    #[test]
    fn test_load_missing_file_falls_back_to_default() {
        let config = EngineConfig::load(Path::new("/nonexistent/warp_audio.json"));
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.frames_per_period, 256);
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = EngineConfig {
            sample_rate: 96_000,
            dsp_enabled: false,
            ..EngineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.sample_rate, 96_000);
        assert!(!parsed.dsp_enabled);
    }
}
