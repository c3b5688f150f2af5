//! Cyclometer - wheel revolution counter and speedometer
//!
//! This library re-exports the detection engine and capture backends from
//! `cyclometer-core`, plus the console application's configuration.

pub mod config;

pub use cyclometer_core::{capture, detector};

pub use cyclometer_core::{
    CaptureBackend, CaptureError, CaptureStream, ConfigError, CpalBackend, DetectionState,
    DetectorError, MemoryBackend, RevolutionData, RevolutionTracker, TrackerConfig,
    VelocityProjection,
};
pub use cyclometer_core::{BUILD_DATE, DEFAULT_SAMPLE_RATE, FEET_PER_MILE, VERSION};
