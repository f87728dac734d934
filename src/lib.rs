// Warp Audio - low-latency audio output engine core
// Engine lifecycle state machine, real-time callback path, and an opaque
// handle registry for foreign callers.

// Module declarations
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;

// Re-exports for convenience
pub use api::*;
pub use config::EngineConfig;
pub use engine::{AudioEngine, EngineState, PerformanceMetrics};
pub use error::{EngineError, ErrorCode};
pub use registry::{EngineHandle, EngineRegistry};

#[cfg(target_os = "android")]
use log::info;

/// Initialize Android logging
#[cfg(target_os = "android")]
pub fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Debug)
            .with_tag("WarpAudio"),
    );
}

#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    let _ = env_logger::try_init();
}

/// JNI_OnLoad is called when the native library is loaded by Android.
/// Initializes logging and the Android context required by oboe.
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    init_logging();
    info!("JNI_OnLoad called - initializing Android context");

    // SAFETY: the JavaVM pointer is valid for the process lifetime; the
    // audio subsystem does not need an application context object
    unsafe {
        ndk_context::initialize_android_context(
            vm.get_java_vm_pointer() as *mut std::ffi::c_void,
            std::ptr::null_mut(),
        );
    }

    jni::sys::JNI_VERSION_1_6
}
