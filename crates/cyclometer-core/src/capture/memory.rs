//! In-memory capture source
//!
//! Samples pushed into a [`MemoryBackend`] are served to whichever stream it
//! opened, the same way a sound card's queue would serve them. Used to replay
//! recorded or synthetic sensor data through the full producer loop.

use super::{CaptureBackend, CaptureError, CaptureStream};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MemoryShared {
    queue: Mutex<VecDeque<i16>>,
    fail_reason: Mutex<Option<String>>,
    opens: AtomicUsize,
    active_streams: AtomicUsize,
    last_source: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Capture backend fed from memory
///
/// Cloning shares the underlying queue.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<MemoryShared>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append samples to the capture queue
    pub fn push(&self, samples: &[i16]) {
        lock(&self.shared.queue).extend(samples.iter().copied());
    }

    /// Samples waiting to be dequeued
    pub fn queued(&self) -> usize {
        lock(&self.shared.queue).len()
    }

    /// Make every following `open` fail with `reason`
    pub fn fail_opens(&self, reason: &str) {
        *lock(&self.shared.fail_reason) = Some(reason.to_string());
    }

    /// Let `open` succeed again
    pub fn allow_opens(&self) {
        *lock(&self.shared.fail_reason) = None;
    }

    /// Successful opens since creation
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet dropped
    pub fn active_streams(&self) -> usize {
        self.shared.active_streams.load(Ordering::SeqCst)
    }

    /// Source id passed to the most recent successful open
    pub fn last_source(&self) -> Option<String> {
        lock(&self.shared.last_source).clone()
    }
}

impl CaptureBackend for MemoryBackend {
    fn open(&self, source_id: &str) -> Result<Box<dyn CaptureStream>, CaptureError> {
        if let Some(reason) = lock(&self.shared.fail_reason).clone() {
            return Err(CaptureError::Init(reason));
        }

        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        self.shared.active_streams.fetch_add(1, Ordering::SeqCst);
        *lock(&self.shared.last_source) = Some(source_id.to_string());

        Ok(Box::new(MemoryStream {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MemoryStream {
    shared: Arc<MemoryShared>,
}

impl CaptureStream for MemoryStream {
    fn queued_samples(&self) -> usize {
        lock(&self.shared.queue).len()
    }

    fn clear(&mut self) {
        lock(&self.shared.queue).clear();
    }

    fn dequeue(&mut self, buffer: &mut [i16]) -> usize {
        let mut queue = lock(&self.shared.queue);
        let count = buffer.len().min(queue.len());
        for (slot, sample) in buffer.iter_mut().zip(queue.drain(..count)) {
            *slot = sample;
        }
        count
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.shared.active_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_reads_pushed_samples() {
        let backend = MemoryBackend::new();
        let mut stream = backend.open("mem").unwrap();

        backend.push(&[1, 2, 3, 4, 5]);
        assert_eq!(stream.queued_samples(), 5);

        let mut buffer = [0i16; 3];
        assert_eq!(stream.dequeue(&mut buffer), 3);
        assert_eq!(buffer, [1, 2, 3]);

        assert_eq!(stream.dequeue(&mut buffer), 2);
        assert_eq!(&buffer[..2], &[4, 5]);
        assert_eq!(stream.queued_samples(), 0);
    }

    #[test]
    fn test_clear_discards_backlog() {
        let backend = MemoryBackend::new();
        let mut stream = backend.open("mem").unwrap();
        backend.push(&[7; 100]);
        stream.clear();
        assert_eq!(backend.queued(), 0);
    }

    #[test]
    fn test_open_tracking() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.open_count(), 0);

        let stream = backend.open("left-wheel").unwrap();
        assert_eq!(backend.open_count(), 1);
        assert_eq!(backend.active_streams(), 1);
        assert_eq!(backend.last_source().as_deref(), Some("left-wheel"));

        drop(stream);
        assert_eq!(backend.active_streams(), 0);
    }

    #[test]
    fn test_failing_open() {
        let backend = MemoryBackend::new();
        backend.fail_opens("device unplugged");
        match backend.open("mem") {
            Err(CaptureError::Init(reason)) => assert_eq!(reason, "device unplugged"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("open should fail"),
        }
        assert_eq!(backend.open_count(), 0);

        backend.allow_opens();
        assert!(backend.open("mem").is_ok());
    }
}
