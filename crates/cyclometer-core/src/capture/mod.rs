//! Sample capture
//!
//! The tracker's producer loop reads fixed-size buffers from a
//! [`CaptureStream`] opened by a [`CaptureBackend`]. The backend is shared
//! with the tracker; the stream is opened on the producer thread itself and
//! dropped there, since audio streams are generally not `Send`.
//!
//! - cpal input devices ([`device`])
//! - In-memory sample queues for replay and tests ([`memory`])

pub mod device;
pub mod memory;

use crate::config::ConfigError;
use thiserror::Error;

/// Errors from opening or reading a capture source
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Audio host not available: {0}")]
    HostUnavailable(String),

    #[error("Input device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open capture stream: {0}")]
    Init(String),

    #[error("Capture backlog of {queued} samples exceeds limit of {limit}")]
    Overload { queued: usize, limit: usize },

    #[error("Short read: expected {expected} samples, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Producer thread failed to start: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Tracker not started: {0}")]
    Config(#[from] ConfigError),
}

/// Factory for capture streams
pub trait CaptureBackend: Send + Sync {
    /// Open the source identified by `source_id` and begin capturing
    ///
    /// Called on the producer thread.
    fn open(&self, source_id: &str) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// A live capture queue of mono i16 samples
///
/// Dropping the stream stops capture and releases the device.
pub trait CaptureStream {
    /// Samples captured and not yet dequeued
    fn queued_samples(&self) -> usize;

    /// Discard every queued sample
    fn clear(&mut self);

    /// Move up to `buffer.len()` samples into `buffer`, returning how many were written
    fn dequeue(&mut self, buffer: &mut [i16]) -> usize;
}
