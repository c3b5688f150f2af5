//! Threshold state machine for dip detection
//!
//! The transition table lives in [`transition`], a pure function of
//! `(state, calibration, event)`. [`ThresholdFsm`] wraps it with the mutable
//! calibration accumulator and hands [`Effect::DipDetected`] back to its owner
//! instead of calling out, so the owner decides what a dip means.
//!
//! ```text
//! Calibrating --Reading--> Calibrating (accumulate)
//! Calibrating --CalibrationDone--> NoDip
//! NoDip --Reading[stdev < f*mean] / DipDetected--> Dip
//! Dip   --Reading[stdev > f*mean]--> NoDip
//! ```
//!
//! Entry and exit share the same threshold; there is no hysteresis band.

use super::calibration::{CalibrationAccumulator, CalibrationInfo};
use super::{DetectionState, DetectorError};

/// Default fraction of the calibrated mean stdev that marks a dip
pub const DEFAULT_THRESHOLD_FRACTION: f64 = 0.75;

/// Default number of readings used for calibration
pub const DEFAULT_CALIBRATION_READINGS: u32 = 250;

/// Input to the state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// Stdev of one sample buffer
    Reading { stdev: f64 },
    /// Raised internally once the accumulator reaches its target
    CalibrationDone,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// Fold the reading into the calibration mean
    Accumulate(f64),
    /// A new revolution was detected
    DipDetected,
}

/// Apply one event to a state
///
/// Events not listed in the transition table leave the state unchanged.
pub fn transition(
    state: DetectionState,
    calibration: &CalibrationInfo,
    threshold_fraction: f64,
    event: Event,
) -> (DetectionState, Option<Effect>) {
    let threshold = calibration.mean * threshold_fraction;

    match (state, event) {
        (DetectionState::Calibrating, Event::Reading { stdev }) => {
            (DetectionState::Calibrating, Some(Effect::Accumulate(stdev)))
        }
        (DetectionState::Calibrating, Event::CalibrationDone) => (DetectionState::NoDip, None),
        (DetectionState::NoDip, Event::Reading { stdev }) if stdev < threshold => {
            (DetectionState::Dip, Some(Effect::DipDetected))
        }
        (DetectionState::Dip, Event::Reading { stdev }) if stdev > threshold => {
            (DetectionState::NoDip, None)
        }
        (state, _) => (state, None),
    }
}

/// Dip detector state machine
///
/// Not reentrant: each event runs to completion under `&mut self`.
#[derive(Debug, Clone)]
pub struct ThresholdFsm {
    state: DetectionState,
    calibration: CalibrationAccumulator,
    threshold_fraction: f64,
}

impl ThresholdFsm {
    /// Create a state machine in `Calibrating`
    ///
    /// # Arguments
    /// * `calibration_readings` - Readings averaged into the baseline
    /// * `threshold_fraction` - Fraction of the baseline below which a reading is a dip
    pub fn new(calibration_readings: u32, threshold_fraction: f64) -> Self {
        Self {
            state: DetectionState::Calibrating,
            calibration: CalibrationAccumulator::new(calibration_readings),
            threshold_fraction,
        }
    }

    /// Feed one stdev reading
    ///
    /// Returns `Ok(Some(Effect::DipDetected))` on a NoDip to Dip transition.
    /// Non-finite readings are rejected without touching any state.
    pub fn process_reading(&mut self, stdev: f64) -> Result<Option<Effect>, DetectorError> {
        if !stdev.is_finite() {
            return Err(DetectorError::NonFiniteReading { stdev });
        }
        Ok(self.dispatch(Event::Reading { stdev }))
    }

    fn dispatch(&mut self, event: Event) -> Option<Effect> {
        let (next, effect) = transition(
            self.state,
            &self.calibration.info(),
            self.threshold_fraction,
            event,
        );
        self.state = next;

        match effect {
            Some(Effect::Accumulate(stdev)) => {
                if self.calibration.accumulate(stdev) {
                    let effect = self.dispatch(Event::CalibrationDone);
                    let info = self.calibration.info();
                    tracing::info!(
                        readings = info.readings,
                        mean_stdev = %format!("{:.3}", info.mean),
                        threshold = %format!("{:.3}", self.threshold()),
                        "calibration_complete"
                    );
                    return effect;
                }
                None
            }
            other => other,
        }
    }

    /// Current detection state
    pub fn state(&self) -> DetectionState {
        self.state
    }

    /// Copy of the calibration info
    pub fn calibration(&self) -> CalibrationInfo {
        self.calibration.info()
    }

    /// Fraction of calibration completed (0.0 to 1.0)
    pub fn calibration_progress(&self) -> f64 {
        self.calibration.progress()
    }

    /// Stdev below which a reading counts as a dip (0 while calibrating)
    pub fn threshold(&self) -> f64 {
        match self.state {
            DetectionState::Calibrating => 0.0,
            _ => self.calibration.info().mean * self.threshold_fraction,
        }
    }
}

impl Default for ThresholdFsm {
    fn default() -> Self {
        Self::new(DEFAULT_CALIBRATION_READINGS, DEFAULT_THRESHOLD_FRACTION)
    }
}
