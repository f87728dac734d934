//! Integration tests for the engine lifecycle through the handle API
//!
//! Drives the public surface the way a foreign caller would: engines are
//! created and controlled through `i64` handles against an injected
//! registry, with a simulated driver standing in for the audio hardware.

use warp_audio::api;
use warp_audio::engine::driver::{SimBehavior, SimController, SimDriver};
use warp_audio::engine::AudioEngine;
use warp_audio::registry::HANDLE_BASE;
use warp_audio::{EngineConfig, EngineRegistry};

fn initialize_sim(registry: &EngineRegistry, config: EngineConfig) -> (i64, SimController) {
    let driver = SimDriver::new();
    let controller = driver.controller();
    let handle =
        api::initialize_engine_with_driver(registry, config, AudioEngine::new(Box::new(driver)));
    (handle, controller)
}

#[test]
fn test_full_playback_session() {
    let registry = EngineRegistry::new();
    let config = EngineConfig {
        sample_rate: 48_000,
        frames_per_period: 256,
        channel_count: 2,
        target_latency_ms: 10.0,
        ..EngineConfig::default()
    };

    let (handle, controller) = initialize_sim(&registry, config);
    assert!(handle >= HANDLE_BASE);

    assert!(api::start_playback(&registry, handle));

    // One hundred periods of audio
    assert_eq!(controller.pump(100), 100);

    let metrics = api::get_performance_metrics(&registry, handle).unwrap();
    assert_eq!(metrics.callback_count, 100);
    assert!(metrics.average_processing_time_us >= 0.0);
    assert!(metrics.max_processing_time_us >= metrics.average_processing_time_us - 1e-9);

    let latency = api::measure_latency(&registry, handle);
    // Sim driver: (512 + 256) frames at 48 kHz
    assert!((latency - 16.0).abs() < 1e-9);

    assert!(api::stop_playback(&registry, handle));
    api::shutdown_engine(&registry, handle);
    assert!(registry.is_empty());

    // Idempotent from the caller's perspective
    api::shutdown_engine(&registry, handle);
}

#[test]
fn test_rendered_audio_is_quiet_tone() {
    let registry = EngineRegistry::new();
    let (handle, controller) = initialize_sim(&registry, EngineConfig::default());
    assert!(api::start_playback(&registry, handle));

    let buffer = controller.pump_one().unwrap();
    assert!(buffer.iter().any(|&s| s != 0.0));
    assert!(buffer.iter().all(|&s| s.abs() <= 0.11));
    // Stereo frames carry the same sample on both channels
    for frame in buffer.chunks(2) {
        assert_eq!(frame[0], frame[1]);
    }
}

#[test]
fn test_invalid_config_registers_nothing() {
    let registry = EngineRegistry::new();
    let config = EngineConfig {
        frames_per_period: 32,
        ..EngineConfig::default()
    };

    let (result, _controller) = initialize_sim(&registry, config);
    assert!(result < 0);
    assert!(registry.is_empty());
}

#[test]
fn test_unknown_handles_fail_softly() {
    let registry = EngineRegistry::new();

    assert!(!api::start_playback(&registry, 1234));
    assert!(!api::stop_playback(&registry, 1234));
    assert!(!api::pause_playback(&registry, 1234));
    assert_eq!(api::measure_latency(&registry, 1234), -1.0);
    assert!(api::get_performance_metrics(&registry, 1234).is_none());
    api::shutdown_engine(&registry, 1234);
}

#[test]
fn test_handles_are_unique_across_engines() {
    let registry = EngineRegistry::new();

    let (first, _c1) = initialize_sim(&registry, EngineConfig::default());
    let (second, _c2) = initialize_sim(&registry, EngineConfig::default());
    assert_ne!(first, second);

    // Each engine's playback state is independent
    assert!(api::start_playback(&registry, first));
    assert!(api::pause_playback(&registry, first));
    assert!(api::start_playback(&registry, second));
    assert!(!api::start_playback(&registry, second));

    api::shutdown_engine(&registry, first);
    assert!(api::stop_playback(&registry, second));
    api::shutdown_engine(&registry, second);
}

#[test]
fn test_two_running_engines_have_independent_phase() {
    let registry = EngineRegistry::new();
    let (first, c1) = initialize_sim(&registry, EngineConfig::default());
    let (second, c2) = initialize_sim(&registry, EngineConfig::default());

    assert!(api::start_playback(&registry, first));
    // Advance the first engine before the second even starts
    c1.pump(5);
    assert!(api::start_playback(&registry, second));

    let from_first = c1.pump_one().unwrap();
    let from_second = c2.pump_one().unwrap();
    // Second engine starts from phase zero, first is five periods in
    assert_ne!(from_first, from_second);
}

#[test]
fn test_restart_replays_from_phase_zero() {
    let registry = EngineRegistry::new();
    let (handle, controller) = initialize_sim(&registry, EngineConfig::default());

    assert!(api::start_playback(&registry, handle));
    let first_period = controller.pump_one().unwrap();
    controller.pump(7);

    assert!(api::stop_playback(&registry, handle));
    assert!(api::start_playback(&registry, handle));
    let replayed = controller.pump_one().unwrap();

    assert_eq!(first_period, replayed);
}

#[test]
fn test_driver_error_forces_error_state_until_shutdown() {
    let registry = EngineRegistry::new();
    let (handle, controller) = initialize_sim(&registry, EngineConfig::default());

    assert!(api::start_playback(&registry, handle));
    controller.raise_error("simulated device loss");

    // Everything but shutdown is refused from the error state
    assert!(!api::start_playback(&registry, handle));
    assert!(!api::pause_playback(&registry, handle));
    assert!(api::process_audio_buffer(&registry, handle, vec![0.0; 4]).is_none());

    api::shutdown_engine(&registry, handle);
    assert!(registry.is_empty());
}

#[test]
fn test_start_timeout_reports_failure() {
    let registry = EngineRegistry::new();
    let driver = SimDriver::with_behavior(SimBehavior {
        stall_start: true,
        ..SimBehavior::default()
    });
    let handle = api::initialize_engine_with_driver(
        &registry,
        EngineConfig::default(),
        AudioEngine::new(Box::new(driver)),
    );
    assert!(handle >= HANDLE_BASE);

    // The stream never confirms; the bounded wait expires
    assert!(!api::start_playback(&registry, handle));
    api::shutdown_engine(&registry, handle);
}

#[test]
fn test_update_configuration_between_sessions() {
    let registry = EngineRegistry::new();
    let (handle, _controller) = initialize_sim(&registry, EngineConfig::default());

    assert!(api::start_playback(&registry, handle));
    // Rejected while running
    assert!(!api::update_configuration(
        &registry,
        handle,
        EngineConfig {
            sample_rate: 96_000,
            ..EngineConfig::default()
        }
    ));

    assert!(api::stop_playback(&registry, handle));
    assert!(api::update_configuration(
        &registry,
        handle,
        EngineConfig {
            sample_rate: 96_000,
            ..EngineConfig::default()
        }
    ));

    // Out-of-bounds update is rejected even when stopped
    assert!(!api::update_configuration(
        &registry,
        handle,
        EngineConfig {
            target_latency_ms: 0.0,
            ..EngineConfig::default()
        }
    ));
}

#[test]
fn test_underruns_accumulate_across_sessions() {
    let registry = EngineRegistry::new();
    let (handle, controller) = initialize_sim(&registry, EngineConfig::default());

    assert!(api::start_playback(&registry, handle));
    controller.pump(20);
    let before = api::get_performance_metrics(&registry, handle)
        .unwrap()
        .buffer_underruns;

    assert!(api::stop_playback(&registry, handle));
    assert!(api::start_playback(&registry, handle));

    let after = api::get_performance_metrics(&registry, handle).unwrap();
    // Session counters reset, cumulative ones survive
    assert_eq!(after.callback_count, 0);
    assert_eq!(after.buffer_underruns, before);
}
