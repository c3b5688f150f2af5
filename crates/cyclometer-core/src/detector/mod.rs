//! Revolution detection
//!
//! This module contains the detection pipeline, leaves first:
//! - Per-buffer mean and standard deviation ([`statistics`])
//! - Baseline variance accumulation during warm-up ([`calibration`])
//! - The Calibrating / NoDip / Dip threshold state machine ([`fsm`])
//! - Snapshot publication and producer lifecycle ([`tracker`])
//! - Displayed speed and distance formulas ([`velocity`])

pub mod calibration;
pub mod fsm;
pub mod statistics;
pub mod tracker;
pub mod velocity;

use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors raised while turning a buffer into a detector reading
///
/// Neither variant is fatal: the offending buffer is rejected and the
/// detector state is left untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("Buffer too short for statistics: {len} samples (need at least 2)")]
    InsufficientSamples { len: usize },

    #[error("Non-finite stdev reading: {stdev}")]
    NonFiniteReading { stdev: f64 },
}

/// Current phase of the dip detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    /// Establishing the baseline stdev; no dips are reported
    Calibrating,
    /// Signal variance at or above the dip threshold
    NoDip,
    /// Signal variance below the dip threshold (sensor passing)
    Dip,
}

/// Snapshot of the revolution counter
///
/// Published as a whole value on every confirmed dip so readers never see
/// a count from one revolution paired with the timestamp of another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevolutionData {
    /// Revolutions counted since start
    pub count: u64,
    /// Speed implied by the last two revolutions (0 until the second one)
    pub velocity_mph: f64,
    /// When the latest revolution was confirmed
    pub timestamp: Instant,
}

impl RevolutionData {
    /// Snapshot with no revolutions, stamped at `timestamp`
    pub fn initial(timestamp: Instant) -> Self {
        Self {
            count: 0,
            velocity_mph: 0.0,
            timestamp,
        }
    }

    /// Time elapsed between this snapshot and `now`
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }
}

/// Convert a duration to fractional hours
pub(crate) fn hours(duration: Duration) -> f64 {
    duration.as_secs_f64() / 3600.0
}
