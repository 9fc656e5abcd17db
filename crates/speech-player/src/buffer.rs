//! Bounded sample buffer between the playback worker and the device callback.
//!
//! The worker pushes whole chunks with back-pressure (this is what makes a chunk
//! "write" block like a hardware write); the CPAL callback drains it without
//! blocking and pads underruns with silence.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Thread-safe bounded FIFO of interleaved `f32` samples.
///
/// ## Design
/// - One producer (the worker) and one consumer (the audio callback).
/// - Bounded by `max_samples` so a write returns only once the device has
///   consumed enough earlier audio.
/// - A single [`Condvar`] signals every state change; `closed` lives under the
///   same mutex as the samples to avoid lost wake-ups.
pub struct DeviceBuffer {
    channels: usize,
    inner: Mutex<BufferInner>,
    cv: Condvar,
    max_samples: usize,
}

struct BufferInner {
    queue: VecDeque<f32>,
    closed: bool,
}

impl DeviceBuffer {
    pub fn new(channels: usize, max_samples: usize) -> Self {
        Self {
            channels: channels.max(1),
            inner: Mutex::new(BufferInner {
                queue: VecDeque::with_capacity(max_samples),
                closed: false,
            }),
            cv: Condvar::new(),
            max_samples: max_samples.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn len_samples(&self) -> usize {
        self.lock().queue.len()
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Mark the buffer closed and wake all waiters.
    ///
    /// Pending and future pushes return `false`. Idempotent.
    pub fn close(&self) {
        let mut g = self.lock();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Drop all buffered samples.
    pub fn clear(&self) {
        let mut g = self.lock();
        g.queue.clear();
        drop(g);
        self.cv.notify_all();
    }

    /// Push interleaved samples, blocking while the buffer is full.
    ///
    /// Returns `false` if the buffer was closed before every sample was accepted.
    pub fn push_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;

        while offset < samples.len() {
            let mut g = self.lock();

            while g.queue.len() >= self.max_samples && !g.closed {
                g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
            }
            if g.closed {
                return false;
            }

            let room = self.max_samples - g.queue.len();
            let take = room.min(samples.len() - offset);
            g.queue.extend(&samples[offset..offset + take]);
            offset += take;

            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Copy up to `out.len()` buffered samples into `out` without blocking.
    ///
    /// Only whole frames are taken. Returns the number of samples written.
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut g = self.lock();
        let available = g.queue.len() - g.queue.len() % self.channels;
        let want = out.len() - out.len() % self.channels;
        let take = available.min(want);
        for (dst, src) in out.iter_mut().zip(g.queue.drain(..take)) {
            *dst = src;
        }
        drop(g);
        if take > 0 {
            self.cv.notify_all();
        }
        take
    }

    /// Block until the buffer is empty, `cancel` returns `true`, or the buffer closes.
    ///
    /// Returns `true` only when the buffer drained normally.
    pub fn wait_until_empty_or_cancel(&self, cancel: &dyn Fn() -> bool, poll: Duration) -> bool {
        let mut g = self.lock();
        loop {
            if g.queue.is_empty() {
                return true;
            }
            if g.closed || cancel() {
                return false;
            }
            let (ng, _timeout) = self
                .cv
                .wait_timeout(g, poll)
                .unwrap_or_else(PoisonError::into_inner);
            g = ng;
        }
    }
}
