//! Single-pass buffer statistics
//!
//! Mean and sample standard deviation are accumulated incrementally
//! (Welford's method) so large DC offsets in the sensor signal do not
//! cost precision the way a sum-of-squares formula would.

use super::DetectorError;

/// Mean and standard deviation of one sample buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferStatistics {
    /// Arithmetic mean of the samples
    pub mean: f64,
    /// Sample standard deviation (N - 1 denominator)
    pub stdev: f64,
}

/// Compute mean and standard deviation of a sample buffer
///
/// # Arguments
/// * `buffer` - Signed 16-bit samples, at least two of them
///
/// # Example
/// ```
/// use cyclometer_core::detector::statistics::compute;
///
/// let stats = compute(&[-2, 2, -2, 2]).unwrap();
/// assert!(stats.mean.abs() < 1e-12);
/// assert!((stats.stdev - (16.0f64 / 3.0).sqrt()).abs() < 1e-12);
/// ```
pub fn compute(buffer: &[i16]) -> Result<BufferStatistics, DetectorError> {
    if buffer.len() < 2 {
        return Err(DetectorError::InsufficientSamples { len: buffer.len() });
    }

    let mut mean = 0.0f64;
    let mut m2 = 0.0f64;

    for (i, &sample) in buffer.iter().enumerate() {
        let x = f64::from(sample);
        let delta = x - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (x - mean);
    }

    let variance = m2 / (buffer.len() - 1) as f64;

    Ok(BufferStatistics {
        mean,
        // Rounding can leave a tiny negative variance on constant input
        stdev: variance.max(0.0).sqrt(),
    })
}
