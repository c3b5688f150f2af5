//! Displayed speed and distance
//!
//! The tracker only learns about the wheel once per revolution. Between
//! revolutions the display projects forward from the latest snapshot, capped
//! so the shown speed never exceeds what one more revolution "right now" would
//! imply. When the input stalls the projection decays toward zero instead of
//! flagging a gap; callers decide when a snapshot is too old to show.

use super::{hours, RevolutionData};
use crate::FEET_PER_MILE;
use std::time::{Duration, Instant};

/// Speed/distance formulas for a wheel of known circumference
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityProjection {
    ft_per_rev: f64,
}

impl VelocityProjection {
    /// # Arguments
    /// * `ft_per_rev` - Distance travelled per revolution, in feet
    pub fn new(ft_per_rev: f64) -> Self {
        Self { ft_per_rev }
    }

    /// Distance per revolution in feet
    pub fn ft_per_rev(&self) -> f64 {
        self.ft_per_rev
    }

    /// Speed implied by one revolution over `elapsed`
    ///
    /// Infinite when `elapsed` is zero.
    pub fn velocity_for_interval(&self, elapsed: Duration) -> f64 {
        (self.ft_per_rev / FEET_PER_MILE) / hours(elapsed)
    }

    /// Speed if the next revolution completed at `now`
    pub fn projected_velocity_mph(&self, snapshot: &RevolutionData, now: Instant) -> f64 {
        self.velocity_for_interval(snapshot.age(now))
    }

    /// Last confirmed speed, capped by the projection
    pub fn instantaneous_velocity_mph(&self, snapshot: &RevolutionData, now: Instant) -> f64 {
        snapshot
            .velocity_mph
            .min(self.projected_velocity_mph(snapshot, now))
    }

    /// Counted distance plus distance anticipated since the last revolution
    pub fn distance_ft(&self, snapshot: &RevolutionData, now: Instant) -> f64 {
        let anticipated = self.instantaneous_velocity_mph(snapshot, now)
            * hours(snapshot.age(now))
            * FEET_PER_MILE;
        self.ft_per_rev * snapshot.count as f64 + anticipated
    }
}

/// Whether a snapshot is older than `bound` at `now`
pub fn is_stale(snapshot: &RevolutionData, now: Instant, bound: Duration) -> bool {
    snapshot.age(now) > bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FT_PER_REV: f64 = 23.0;

    fn snapshot(count: u64, velocity_mph: f64, timestamp: Instant) -> RevolutionData {
        RevolutionData {
            count,
            velocity_mph,
            timestamp,
        }
    }

    #[test]
    fn test_one_second_interval() {
        let proj = VelocityProjection::new(FT_PER_REV);
        let v = proj.velocity_for_interval(Duration::from_secs(1));
        assert_relative_eq!(v, 23.0 / 5280.0 * 3600.0, epsilon = 1e-9);
        assert_relative_eq!(v, 15.6818, epsilon = 1e-4);
    }

    #[test]
    fn test_instantaneous_uses_last_speed_when_fresh() {
        let proj = VelocityProjection::new(FT_PER_REV);
        let t0 = Instant::now();
        let snap = snapshot(5, 10.0, t0);

        // Half a second after the dip the projection (~31 mph) exceeds 10 mph
        let now = t0 + Duration::from_millis(500);
        assert_relative_eq!(proj.instantaneous_velocity_mph(&snap, now), 10.0);
    }

    #[test]
    fn test_instantaneous_capped_when_input_stalls() {
        let proj = VelocityProjection::new(FT_PER_REV);
        let t0 = Instant::now();
        let snap = snapshot(5, 15.0, t0);

        let now = t0 + Duration::from_secs(4);
        let v = proj.instantaneous_velocity_mph(&snap, now);
        assert_relative_eq!(v, proj.velocity_for_interval(Duration::from_secs(4)));
        assert!(v < 15.0);
    }

    #[test]
    fn test_zero_elapsed_is_not_capped() {
        let proj = VelocityProjection::new(FT_PER_REV);
        let t0 = Instant::now();
        let snap = snapshot(2, 12.0, t0);
        assert!(proj.projected_velocity_mph(&snap, t0).is_infinite());
        assert_relative_eq!(proj.instantaneous_velocity_mph(&snap, t0), 12.0);
        assert_relative_eq!(proj.distance_ft(&snap, t0), 46.0);
    }

    #[test]
    fn test_distance_includes_anticipated_travel() {
        let proj = VelocityProjection::new(FT_PER_REV);
        let t0 = Instant::now();
        // 15.68 mph is one revolution per second
        let snap = snapshot(10, proj.velocity_for_interval(Duration::from_secs(1)), t0);

        let now = t0 + Duration::from_millis(500);
        assert_relative_eq!(proj.distance_ft(&snap, now), 230.0 + 11.5, epsilon = 1e-6);
    }

    #[test]
    fn test_distance_before_second_revolution() {
        let proj = VelocityProjection::new(FT_PER_REV);
        let t0 = Instant::now();
        let snap = snapshot(1, 0.0, t0);
        let now = t0 + Duration::from_secs(2);
        assert_eq!(proj.instantaneous_velocity_mph(&snap, now), 0.0);
        assert_relative_eq!(proj.distance_ft(&snap, now), 23.0);
    }

    #[test]
    fn test_is_stale() {
        let t0 = Instant::now();
        let snap = snapshot(1, 0.0, t0);
        let bound = Duration::from_secs(5);
        assert!(!is_stale(&snap, t0 + Duration::from_secs(5), bound));
        assert!(is_stale(&snap, t0 + Duration::from_secs(6), bound));
    }
}
