//! Revolution tracker
//!
//! Owns the dip detector and the published [`RevolutionData`] snapshot, and
//! runs the producer thread that pulls buffers from a capture stream.
//!
//! ## Threads
//!
//! - One producer thread calls [`RevolutionTracker::process_buffer`] for every
//!   captured buffer.
//! - Any number of readers call [`RevolutionTracker::get_snapshot`],
//!   [`RevolutionTracker::is_calibrating`] and [`RevolutionTracker::is_running`].
//!
//! Detector state sits behind one short-held mutex. The snapshot has its own
//! mutex and is only ever replaced as a whole value while the detector lock is
//! held, so readers get a consistent copy without touching the detector.

use super::calibration::CalibrationInfo;
use super::fsm::{Effect, ThresholdFsm};
use super::statistics;
use super::velocity::VelocityProjection;
use super::{DetectionState, DetectorError, RevolutionData};
use crate::capture::device::CpalBackend;
use crate::capture::{CaptureBackend, CaptureError, CaptureStream};
use crate::config::TrackerConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the producer thread and readers
struct DetectionCore {
    /// Detector state machine and calibration (producer + state queries)
    fsm: Mutex<ThresholdFsm>,
    /// Latest published snapshot (replaced whole, never edited in place)
    snapshot: Mutex<RevolutionData>,
    projection: VelocityProjection,
}

impl DetectionCore {
    fn process_buffer_at(
        &self,
        buffer: &[i16],
        now: Instant,
    ) -> Result<Option<RevolutionData>, DetectorError> {
        let stats = statistics::compute(buffer)?;

        let mut fsm = lock(&self.fsm);
        let effect = fsm.process_reading(stats.stdev)?;

        // Published while the detector lock is still held
        let published = match effect {
            Some(Effect::DipDetected) => Some(self.publish_revolution(now, stats.stdev)),
            _ => None,
        };
        drop(fsm);

        Ok(published)
    }

    fn publish_revolution(&self, now: Instant, stdev: f64) -> RevolutionData {
        let mut snapshot = lock(&self.snapshot);
        let previous = *snapshot;
        let elapsed = previous.age(now);

        let velocity_mph = if previous.count == 0 || elapsed.is_zero() {
            0.0
        } else {
            self.projection.velocity_for_interval(elapsed)
        };

        let next = RevolutionData {
            count: previous.count + 1,
            velocity_mph,
            timestamp: now,
        };
        *snapshot = next;

        tracing::debug!(
            count = next.count,
            velocity_mph = %format!("{:.2}", next.velocity_mph),
            interval_ms = elapsed.as_millis() as u64,
            stdev = %format!("{:.3}", stdev),
            "revolution"
        );

        next
    }
}

/// Counts wheel revolutions from a capture source
///
/// # Example
/// ```
/// use cyclometer_core::{MemoryBackend, RevolutionTracker, TrackerConfig};
/// use std::sync::Arc;
///
/// let config = TrackerConfig {
///     calibration_readings: 4,
///     ..Default::default()
/// };
/// let tracker = RevolutionTracker::new(config, Arc::new(MemoryBackend::new()));
///
/// let loud: Vec<i16> = (0..1024).map(|i| if i % 2 == 0 { 100 } else { -100 }).collect();
/// let quiet: Vec<i16> = loud.iter().map(|s| s / 2).collect();
///
/// for _ in 0..4 {
///     tracker.process_buffer(&loud).unwrap();
/// }
/// assert!(!tracker.is_calibrating());
///
/// let revolution = tracker.process_buffer(&quiet).unwrap();
/// assert_eq!(revolution.map(|r| r.count), Some(1));
/// ```
pub struct RevolutionTracker {
    config: TrackerConfig,
    backend: Arc<dyn CaptureBackend>,
    core: Arc<DetectionCore>,
    /// Reported by `is_running`; set only once the stream is open
    running: AtomicBool,
    /// Producer loop condition
    producing: Arc<AtomicBool>,
    /// Producer thread handle; also serializes start/stop
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl RevolutionTracker {
    /// Create a stopped tracker
    ///
    /// The initial snapshot has no revolutions and is stamped now.
    ///
    /// # Arguments
    /// * `config` - Capture cadence, calibration and wheel geometry
    /// * `backend` - Opens the capture stream when the tracker starts
    pub fn new(config: TrackerConfig, backend: Arc<dyn CaptureBackend>) -> Self {
        let core = DetectionCore {
            fsm: Mutex::new(ThresholdFsm::new(
                config.calibration_readings,
                config.threshold_fraction,
            )),
            snapshot: Mutex::new(RevolutionData::initial(Instant::now())),
            projection: VelocityProjection::new(config.ft_per_rev),
        };

        Self {
            config,
            backend,
            core: Arc::new(core),
            running: AtomicBool::new(false),
            producing: Arc::new(AtomicBool::new(false)),
            producer: Mutex::new(None),
        }
    }

    /// Create a tracker capturing from cpal input devices
    pub fn with_cpal(config: TrackerConfig) -> Self {
        let backend = CpalBackend::from_config(&config);
        Self::new(config, Arc::new(backend))
    }

    /// Start capturing from `source_id`
    ///
    /// Opens the capture stream on a new producer thread and waits until it
    /// is open. Calling this while already running does nothing.
    ///
    /// # Errors
    /// Returns [`CaptureError::Config`] if the configuration is invalid, or
    /// the backend's error if the source cannot be opened. Either way the
    /// tracker is left stopped.
    pub fn start(&self, source_id: &str) -> Result<(), CaptureError> {
        let mut producer = lock(&self.producer);
        if self.running.load(Ordering::SeqCst) {
            tracing::debug!(source = source_id, "Tracker already running");
            return Ok(());
        }

        if let Err(e) = self.config.validate() {
            tracing::error!(source = source_id, error = %e, "Refusing to start tracker");
            return Err(e.into());
        }

        self.producing.store(true, Ordering::SeqCst);

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), CaptureError>>(1);
        let backend = Arc::clone(&self.backend);
        let core = Arc::clone(&self.core);
        let producing = Arc::clone(&self.producing);
        let config = self.config.clone();
        let source = source_id.to_string();

        let spawned = thread::Builder::new()
            .name("cyclometer-producer".into())
            .spawn(move || {
                let stream = match backend.open(&source) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_producer(stream, &core, &producing, &config);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.producing.store(false, Ordering::SeqCst);
                return Err(CaptureError::Spawn(e));
            }
        };

        let startup = ready_rx.recv().unwrap_or_else(|_| {
            Err(CaptureError::Init(
                "producer thread exited during startup".into(),
            ))
        });

        match startup {
            Ok(()) => {
                *producer = Some(handle);
                self.running.store(true, Ordering::SeqCst);
                tracing::info!(
                    source = source_id,
                    buffer_len = self.config.buffer_len,
                    calibration_readings = self.config.calibration_readings,
                    "Revolution tracker started"
                );
                Ok(())
            }
            Err(e) => {
                self.producing.store(false, Ordering::SeqCst);
                let _ = handle.join();
                tracing::error!(source = source_id, error = %e, "Failed to start capture");
                Err(e)
            }
        }
    }

    /// Stop capturing
    ///
    /// Blocks until the producer thread has finished its current buffer,
    /// released the capture stream and exited. No snapshot changes happen
    /// after this returns. Calling this while stopped does nothing.
    pub fn stop(&self) {
        let mut producer = lock(&self.producer);
        self.producing.store(false, Ordering::SeqCst);

        if let Some(handle) = producer.take() {
            if handle.join().is_err() {
                tracing::error!("Producer thread panicked");
            }
            tracing::info!("Revolution tracker stopped");
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether capture is open and the producer is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Feed one captured buffer, timestamped now
    ///
    /// Returns the new snapshot when the buffer completes a revolution.
    /// Only the producer should call this while the tracker is running.
    pub fn process_buffer(&self, buffer: &[i16]) -> Result<Option<RevolutionData>, DetectorError> {
        self.core.process_buffer_at(buffer, Instant::now())
    }

    /// Feed one buffer captured at `now`
    ///
    /// Used when replaying samples whose timing is known.
    pub fn process_buffer_at(
        &self,
        buffer: &[i16],
        now: Instant,
    ) -> Result<Option<RevolutionData>, DetectorError> {
        self.core.process_buffer_at(buffer, now)
    }

    /// Whether the baseline is still being established
    pub fn is_calibrating(&self) -> bool {
        self.state() == DetectionState::Calibrating
    }

    /// Current detector state
    pub fn state(&self) -> DetectionState {
        lock(&self.core.fsm).state()
    }

    /// Copy of the calibration info
    pub fn calibration(&self) -> CalibrationInfo {
        lock(&self.core.fsm).calibration()
    }

    /// Fraction of calibration completed (0.0 to 1.0)
    pub fn calibration_progress(&self) -> f64 {
        lock(&self.core.fsm).calibration_progress()
    }

    /// Stdev below which a buffer counts as a dip (0 while calibrating)
    pub fn threshold(&self) -> f64 {
        lock(&self.core.fsm).threshold()
    }

    /// Copy of the latest snapshot
    pub fn get_snapshot(&self) -> RevolutionData {
        *lock(&self.core.snapshot)
    }

    /// Speed/distance formulas for the configured wheel
    pub fn projection(&self) -> VelocityProjection {
        self.core.projection
    }

    /// Tracker configuration
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

impl Drop for RevolutionTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Producer loop: pull fixed-size buffers until `producing` clears
///
/// Overloads and short reads drop data and carry on; the stream is dropped
/// (releasing the device) before the thread exits.
fn run_producer(
    mut stream: Box<dyn CaptureStream>,
    core: &DetectionCore,
    producing: &AtomicBool,
    config: &TrackerConfig,
) {
    let mut buffer = vec![0i16; config.buffer_len];
    let poll_interval = config.poll_interval();
    let mut buffers_processed = 0u64;

    while producing.load(Ordering::SeqCst) {
        let queued = stream.queued_samples();

        if queued < config.buffer_len {
            thread::sleep(poll_interval);
            continue;
        }

        if queued > config.max_queued {
            let err = CaptureError::Overload {
                queued,
                limit: config.max_queued,
            };
            tracing::warn!("{}, not handling audio fast enough; discarding backlog", err);
            stream.clear();
            continue;
        }

        let read = stream.dequeue(&mut buffer);
        if read < buffer.len() {
            let err = CaptureError::ShortRead {
                expected: buffer.len(),
                actual: read,
            };
            tracing::warn!("{}; discarding buffer", err);
            continue;
        }

        if let Err(e) = core.process_buffer_at(&buffer, Instant::now()) {
            tracing::warn!(error = %e, "Buffer rejected");
        }

        buffers_processed += 1;
        if buffers_processed == 1 {
            tracing::info!(
                "First buffer processed: {} samples, {} queued",
                buffer.len(),
                queued
            );
        }
    }

    drop(stream);
    tracing::debug!(buffers_processed, "Producer loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::memory::MemoryBackend;
    use approx::assert_relative_eq;
    use std::time::Duration;

    const BUFFER_LEN: usize = 1024;

    /// Alternating ±amplitude buffer; stdev ≈ amplitude
    fn square_wave(amplitude: i16) -> Vec<i16> {
        (0..BUFFER_LEN)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    fn tracker() -> RevolutionTracker {
        RevolutionTracker::new(TrackerConfig::default(), Arc::new(MemoryBackend::new()))
    }

    fn calibrate(tracker: &RevolutionTracker, amplitude: i16, at: Instant) {
        let buffer = square_wave(amplitude);
        for _ in 0..tracker.config().calibration_readings {
            assert_eq!(tracker.process_buffer_at(&buffer, at).unwrap(), None);
        }
    }

    #[test]
    fn test_new_tracker_state() {
        let tracker = tracker();
        assert!(!tracker.is_running());
        assert!(tracker.is_calibrating());
        assert_eq!(tracker.state(), DetectionState::Calibrating);
        assert_eq!(tracker.get_snapshot().count, 0);
        assert_eq!(tracker.get_snapshot().velocity_mph, 0.0);
    }

    #[test]
    fn test_calibration_then_dip_and_recovery() {
        let tracker = tracker();
        let t0 = Instant::now();
        calibrate(&tracker, 100, t0);

        assert!(!tracker.is_calibrating());
        assert_eq!(tracker.state(), DetectionState::NoDip);
        let cal = tracker.calibration();
        assert_eq!(cal.readings, 250);
        assert_relative_eq!(cal.mean, 100.0, epsilon = 0.1);

        let dip = tracker
            .process_buffer_at(&square_wave(50), t0)
            .unwrap()
            .expect("dip should publish a revolution");
        assert_eq!(dip.count, 1);
        assert_eq!(dip.velocity_mph, 0.0);
        assert_eq!(tracker.state(), DetectionState::Dip);

        assert_eq!(tracker.process_buffer_at(&square_wave(150), t0).unwrap(), None);
        assert_eq!(tracker.state(), DetectionState::NoDip);
        assert_eq!(tracker.get_snapshot().count, 1);
    }

    #[test]
    fn test_velocity_from_dip_interval() {
        let tracker = tracker();
        let t0 = Instant::now();
        calibrate(&tracker, 100, t0);

        let quiet = square_wave(50);
        let loud = square_wave(100);

        tracker.process_buffer_at(&quiet, t0).unwrap();
        tracker.process_buffer_at(&loud, t0).unwrap();
        let second = tracker
            .process_buffer_at(&quiet, t0 + Duration::from_secs(1))
            .unwrap()
            .unwrap();

        assert_eq!(second.count, 2);
        assert_relative_eq!(second.velocity_mph, 23.0 / 5280.0 * 3600.0, epsilon = 1e-9);
        assert_relative_eq!(second.velocity_mph, 15.68, epsilon = 0.01);
        assert_eq!(tracker.get_snapshot(), second);
    }

    #[test]
    fn test_zero_interval_gives_zero_velocity() {
        let tracker = tracker();
        let t0 = Instant::now();
        calibrate(&tracker, 100, t0);

        for expected in 1..=3 {
            tracker.process_buffer_at(&square_wave(50), t0).unwrap();
            tracker.process_buffer_at(&square_wave(100), t0).unwrap();
            let snapshot = tracker.get_snapshot();
            assert_eq!(snapshot.count, expected);
            assert_eq!(snapshot.velocity_mph, 0.0);
        }
    }

    #[test]
    fn test_rejected_buffers_leave_state_alone() {
        let tracker = tracker();
        assert_eq!(
            tracker.process_buffer(&[5]),
            Err(DetectorError::InsufficientSamples { len: 1 })
        );
        assert_eq!(tracker.calibration().readings, 0);
        assert!(tracker.is_calibrating());
    }

    #[test]
    fn test_start_failure_leaves_tracker_stopped() {
        let backend = MemoryBackend::new();
        backend.fail_opens("no such device");
        let tracker = RevolutionTracker::new(TrackerConfig::default(), Arc::new(backend));

        assert!(matches!(tracker.start("mic"), Err(CaptureError::Init(_))));
        assert!(!tracker.is_running());
    }

    #[test]
    fn test_start_rejects_zero_calibration_readings() {
        let backend = MemoryBackend::new();
        let config = TrackerConfig {
            calibration_readings: 0,
            ..Default::default()
        };
        let tracker = RevolutionTracker::new(config, Arc::new(backend.clone()));

        assert!(matches!(tracker.start("mic"), Err(CaptureError::Config(_))));
        assert!(!tracker.is_running());
        assert_eq!(backend.open_count(), 0);
    }

    #[test]
    fn test_threshold_follows_calibration() {
        let tracker = tracker();
        assert_eq!(tracker.threshold(), 0.0);
        calibrate(&tracker, 100, Instant::now());
        assert_relative_eq!(tracker.threshold(), 75.0, epsilon = 0.1);
    }

    #[test]
    fn test_start_stop_releases_stream() {
        let backend = MemoryBackend::new();
        let tracker = RevolutionTracker::new(TrackerConfig::default(), Arc::new(backend.clone()));

        tracker.start("mic").unwrap();
        assert!(tracker.is_running());
        assert_eq!(backend.active_streams(), 1);

        tracker.stop();
        assert!(!tracker.is_running());
        assert_eq!(backend.active_streams(), 0);

        // Second stop is a no-op
        tracker.stop();
        assert!(!tracker.is_running());
    }

    #[test]
    fn test_producer_feeds_detector() {
        let backend = MemoryBackend::new();
        let config = TrackerConfig {
            calibration_readings: 5,
            poll_interval_ms: 1,
            ..Default::default()
        };
        let tracker = RevolutionTracker::new(config, Arc::new(backend.clone()));
        tracker.start("mic").unwrap();

        for _ in 0..5 {
            backend.push(&square_wave(100));
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while tracker.is_calibrating() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!tracker.is_calibrating());

        backend.push(&square_wave(40));
        while tracker.get_snapshot().count == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(tracker.get_snapshot().count, 1);

        tracker.stop();
    }
}
