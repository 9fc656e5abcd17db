//! Pending-item FIFO plus the item status table.
//!
//! Both live under one mutex so a status snapshot can never observe an item
//! half-way through a transition. The worker waits on the [`Condvar`] for new
//! work; `enqueue`, `stop`, and shutdown all signal it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use speech_queue_types::{ItemStatus, QueueItemInfo, QueueStatus};

use crate::error::EnqueueError;

/// Failure reason recorded on an item cut short by `stop`.
pub const STOPPED_REASON: &str = "stopped";
/// Failure reason recorded on an item cut short by shutdown.
pub const SHUTDOWN_REASON: &str = "shutdown";

/// One unit of audio waiting for (or undergoing) playback.
///
/// The worker takes ownership of the samples when it dequeues the item.
#[derive(Debug)]
pub struct QueueItem {
    pub id: String,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub enqueued_at: SystemTime,
}

impl QueueItem {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames() as u64).saturating_mul(1000) / self.sample_rate as u64
    }
}

#[derive(Debug, Clone)]
struct ItemRecord {
    id: String,
    status: ItemStatus,
    queued_at: f64,
    duration_ms: u64,
    error: Option<String>,
}

impl ItemRecord {
    /// Apply a forward transition; anything else is ignored.
    fn advance(&mut self, next: ItemStatus, error: Option<String>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next == ItemStatus::Failed {
            self.error = error;
        }
        true
    }

    fn info(&self) -> QueueItemInfo {
        QueueItemInfo {
            id: self.id.clone(),
            status: self.status,
            queued_at: self.queued_at,
            duration_ms: self.duration_ms,
            error: self.error.clone(),
        }
    }
}

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<QueueItem>,
    records: VecDeque<ItemRecord>,
    currently_playing: Option<String>,
    playing: bool,
    device: Option<String>,
}

impl QueueInner {
    fn record_mut(&mut self, id: &str) -> Option<&mut ItemRecord> {
        self.records.iter_mut().rev().find(|r| r.id == id)
    }

    fn fail_current(&mut self, reason: &str) {
        if let Some(id) = self.currently_playing.take() {
            if let Some(record) = self.record_mut(&id) {
                record.advance(ItemStatus::Failed, Some(reason.to_string()));
            }
        }
        self.playing = false;
    }

    fn discard_pending(&mut self) -> usize {
        let discarded: Vec<String> = self.pending.drain(..).map(|item| item.id).collect();
        if !discarded.is_empty() {
            self.records.retain(|r| !discarded.contains(&r.id));
        }
        discarded.len()
    }

    fn prune_terminal(&mut self, keep: usize) {
        let mut terminal = self.records.iter().filter(|r| r.status.is_terminal()).count();
        while terminal > keep {
            match self.records.iter().position(|r| r.status.is_terminal()) {
                Some(idx) => {
                    self.records.remove(idx);
                    terminal -= 1;
                }
                None => break,
            }
        }
    }
}

/// An item the worker has claimed and marked `playing`.
#[derive(Debug)]
pub struct ClaimedItem {
    pub item: QueueItem,
    /// Stop epoch at claim time; a later `stop` bumps the epoch and cancels this item.
    pub epoch: u64,
}

/// Result of [`PlaybackQueue::next_item`].
#[derive(Debug)]
pub enum NextItem {
    Item(ClaimedItem),
    /// Nothing arrived within the idle interval.
    Idle,
    /// Shutdown was requested; the worker should exit.
    Shutdown,
}

/// What a `stop` call discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopOutcome {
    pub discarded: usize,
    pub interrupted: bool,
}

/// Thread-safe FIFO of pending items plus the status table.
pub struct PlaybackQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
    next_id: AtomicU64,
    stop_epoch: AtomicU64,
    shutdown: AtomicBool,
    max_retained: usize,
}

impl PlaybackQueue {
    pub fn new(max_retained: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            cv: Condvar::new(),
            next_id: AtomicU64::new(1),
            stop_epoch: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            max_retained,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate and queue interleaved samples. Returns the new item id.
    ///
    /// Never waits on the worker.
    pub fn enqueue(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
    ) -> Result<String, EnqueueError> {
        validate(&samples, sample_rate, channels)?;
        if self.shutdown.load(Ordering::Acquire) {
            return Err(EnqueueError::ShuttingDown);
        }

        let id = format!("audio_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let enqueued_at = SystemTime::now();
        let item = QueueItem {
            id: id.clone(),
            samples,
            sample_rate,
            channels,
            enqueued_at,
        };
        let record = ItemRecord {
            id: id.clone(),
            status: ItemStatus::Queued,
            queued_at: unix_seconds(enqueued_at),
            duration_ms: item.duration_ms(),
            error: None,
        };

        let mut g = self.lock();
        if self.shutdown.load(Ordering::Acquire) {
            return Err(EnqueueError::ShuttingDown);
        }
        g.records.push_back(record);
        g.pending.push_back(item);
        let depth = g.pending.len();
        drop(g);
        self.cv.notify_all();

        tracing::debug!(item_id = %id, depth, "item queued");
        Ok(id)
    }

    /// Claim the next pending item, waiting up to `idle` for one to arrive.
    ///
    /// The claimed item is marked `playing` and becomes `currently_playing` in the
    /// same critical section that removes it from the FIFO.
    pub fn next_item(&self, idle: Duration) -> NextItem {
        let mut g = self.lock();
        if self.shutdown.load(Ordering::Acquire) {
            return NextItem::Shutdown;
        }
        if g.pending.is_empty() {
            let (ng, _timeout) = self
                .cv
                .wait_timeout(g, idle)
                .unwrap_or_else(PoisonError::into_inner);
            g = ng;
            if self.shutdown.load(Ordering::Acquire) {
                return NextItem::Shutdown;
            }
        }
        let Some(item) = g.pending.pop_front() else {
            return NextItem::Idle;
        };

        if let Some(record) = g.record_mut(&item.id) {
            record.advance(ItemStatus::Playing, None);
        }
        g.currently_playing = Some(item.id.clone());
        g.playing = true;
        NextItem::Item(ClaimedItem {
            item,
            epoch: self.stop_epoch.load(Ordering::Acquire),
        })
    }

    /// Whether an item claimed at `epoch` must abort.
    pub fn is_cancelled(&self, epoch: u64) -> bool {
        self.shutdown.load(Ordering::Acquire) || self.stop_epoch.load(Ordering::Acquire) != epoch
    }

    /// Record the terminal state of a claimed item.
    ///
    /// `Err(reason)` marks it `failed`. A record already made terminal by `stop`
    /// keeps its state.
    pub fn finish(&self, id: &str, outcome: Result<(), String>) {
        let mut g = self.lock();
        if let Some(record) = g.record_mut(id) {
            match outcome {
                Ok(()) => record.advance(ItemStatus::Completed, None),
                Err(reason) => record.advance(ItemStatus::Failed, Some(reason)),
            };
        }
        if g.currently_playing.as_deref() == Some(id) {
            g.currently_playing = None;
            g.playing = false;
        }
        g.prune_terminal(self.max_retained);
    }

    /// Cancel the playing item and drop everything still queued.
    ///
    /// The interrupted item is marked `failed` ("stopped"); discarded items are
    /// removed from the table. Idempotent.
    pub fn stop(&self) -> StopOutcome {
        let mut g = self.lock();
        self.stop_epoch.fetch_add(1, Ordering::AcqRel);
        let interrupted = g.currently_playing.is_some();
        g.fail_current(STOPPED_REASON);
        let discarded = g.discard_pending();
        g.prune_terminal(self.max_retained);
        drop(g);
        self.cv.notify_all();
        StopOutcome {
            discarded,
            interrupted,
        }
    }

    /// Stop everything and tell the worker to exit. Later enqueues are rejected.
    pub fn begin_shutdown(&self) -> StopOutcome {
        let mut g = self.lock();
        self.shutdown.store(true, Ordering::Release);
        let interrupted = g.currently_playing.is_some();
        g.fail_current(SHUTDOWN_REASON);
        let discarded = g.discard_pending();
        drop(g);
        self.cv.notify_all();
        StopOutcome {
            discarded,
            interrupted,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn set_device(&self, name: Option<String>) {
        self.lock().device = name;
    }

    /// Items waiting in the FIFO.
    pub fn depth(&self) -> usize {
        self.lock().pending.len()
    }

    /// Consistent point-in-time view of the queue.
    pub fn snapshot(&self) -> QueueStatus {
        let g = self.lock();
        QueueStatus {
            currently_playing: g.currently_playing.clone(),
            queue_size: g.pending.len(),
            is_playing: g.playing,
            items: g.records.iter().map(ItemRecord::info).collect(),
            device: g.device.clone(),
        }
    }
}

/// Reject buffers the worker cannot play.
pub fn validate(samples: &[f32], sample_rate: u32, channels: u16) -> Result<(), EnqueueError> {
    if samples.is_empty() {
        return Err(EnqueueError::EmptyBuffer);
    }
    if sample_rate == 0 {
        return Err(EnqueueError::InvalidSampleRate(sample_rate));
    }
    if !matches!(channels, 1 | 2) {
        return Err(EnqueueError::UnsupportedChannels(channels));
    }
    if samples.len() % channels as usize != 0 {
        return Err(EnqueueError::RaggedFrames {
            samples: samples.len(),
            channels,
        });
    }
    if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
        return Err(EnqueueError::NonFiniteSample { index });
    }
    Ok(())
}

fn unix_seconds(at: SystemTime) -> f64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
