//! Cyclometer Core - Dip detection, revolution tracking and audio capture
//!
//! Turns a stream of raw amplitude samples from a wheel-mounted sensor into a
//! revolution count and a velocity estimate. Each wheel revolution shows up as a
//! short drop ("dip") in the variance of the sensor signal; a self-calibrating
//! threshold state machine counts those dips and a tracker publishes the result
//! to any number of reader threads.

pub mod capture;
pub mod config;
pub mod detector;

pub use capture::{
    device::CpalBackend, memory::MemoryBackend, CaptureBackend, CaptureError, CaptureStream,
};
pub use config::{ConfigError, TrackerConfig};
pub use detector::{
    tracker::RevolutionTracker, velocity::VelocityProjection, DetectionState, DetectorError,
    RevolutionData,
};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default capture sample rate (96kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 96000;

/// Feet in a mile, used by every speed and distance conversion
pub const FEET_PER_MILE: f64 = 5280.0;
