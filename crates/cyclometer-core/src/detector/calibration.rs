//! Baseline stdev accumulation during warm-up

/// Frozen result of calibration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationInfo {
    /// Readings accumulated so far
    pub readings: u32,
    /// Running mean of the accumulated stdev readings
    pub mean: f64,
}

/// Incremental mean of stdev readings
///
/// Keeps O(1) state: the count and the running mean. No history is retained.
#[derive(Debug, Clone)]
pub struct CalibrationAccumulator {
    info: CalibrationInfo,
    target_readings: u32,
}

impl CalibrationAccumulator {
    /// Create an accumulator that completes after `target_readings` readings
    pub fn new(target_readings: u32) -> Self {
        Self {
            info: CalibrationInfo::default(),
            target_readings,
        }
    }

    /// Fold one stdev reading into the running mean
    ///
    /// Returns `true` once the target is reached. A target of zero completes
    /// on the first reading.
    pub fn accumulate(&mut self, stdev: f64) -> bool {
        self.info.readings += 1;
        self.info.mean += (stdev - self.info.mean) / f64::from(self.info.readings);
        self.info.readings >= self.target_readings
    }

    /// Copy of the current calibration info
    pub fn info(&self) -> CalibrationInfo {
        self.info
    }

    /// Fraction of calibration completed (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.target_readings == 0 {
            return 1.0;
        }
        (f64::from(self.info.readings) / f64::from(self.target_readings)).min(1.0)
    }
}
