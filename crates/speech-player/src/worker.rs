//! Playback worker thread.
//!
//! The worker is the only owner of the output sink. It claims items from the
//! [`PlaybackQueue`], converts them to the device format, and streams them chunk by
//! chunk. Cancellation is cooperative: the stop epoch is checked before every chunk
//! write and while waiting for the device to drain. A sink that reports a lost
//! device is closed and reopened before the next item plays.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::config::OutputConfig;
use crate::error::StartError;
use crate::process::{HEADROOM_PEAK, chunk_count, normalize_peak, padded_chunks, remix};
use crate::queue::{NextItem, PlaybackQueue, QueueItem, STOPPED_REASON};
use crate::resample::resample;
use crate::sink::{OpenSink, OutputSink};

/// How an item left the streaming loop without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Played {
    Completed,
    Cancelled,
}

/// Handle to the running worker thread.
pub struct WorkerHandle {
    thread: Option<JoinHandle<()>>,
    done_rx: Receiver<()>,
}

impl WorkerHandle {
    /// Wait up to `timeout` for the worker to exit, then join it.
    ///
    /// The caller must have signalled shutdown on the queue first. Returns `false`
    /// if the worker did not finish in time; the thread is then left detached.
    pub fn join(mut self, timeout: Duration) -> bool {
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        tracing::warn!("playback worker panicked during shutdown");
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "playback worker did not stop in time; detaching"
                );
                false
            }
        }
    }
}

/// Signals `done` when the worker thread unwinds for any reason.
struct DoneGuard(Sender<()>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// Spawn the worker and open the sink on it.
///
/// Returns only after the sink has been opened, so a device failure is reported
/// here as [`StartError::DeviceOpen`].
pub fn spawn_worker(
    queue: Arc<PlaybackQueue>,
    config: OutputConfig,
    mut open: OpenSink,
) -> Result<WorkerHandle, StartError> {
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);

    let thread = thread::Builder::new()
        .name("speech-playback".to_string())
        .spawn(move || {
            let _done = DoneGuard(done_tx);
            let sink = match open(&config) {
                Ok(sink) => sink,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            queue.set_device(sink.device_name());
            let _ = ready_tx.send(Ok(()));
            run(&queue, &config, sink, open);
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(WorkerHandle {
            thread: Some(thread),
            done_rx,
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(StartError::DeviceOpen(e))
        }
        Err(_) => {
            let _ = thread.join();
            Err(StartError::WorkerExited)
        }
    }
}

fn run(
    queue: &PlaybackQueue,
    config: &OutputConfig,
    mut sink: Box<dyn OutputSink>,
    mut open: OpenSink,
) {
    let device = sink.device_name().unwrap_or_else(|| "unknown".to_string());
    tracing::info!(
        device = %device,
        rate_hz = config.sample_rate,
        channels = config.channels,
        "playback worker started"
    );
    loop {
        match queue.next_item(config.idle_poll) {
            NextItem::Item(claimed) => {
                if sink.is_failed() {
                    if let Err(e) = reopen(queue, config, &mut open, &mut sink) {
                        tracing::error!(item_id = %claimed.item.id, "item failed: {e:#}");
                        queue.finish(&claimed.item.id, Err(format!("{e:#}")));
                        continue;
                    }
                }
                play_item(queue, config, sink.as_mut(), claimed.item, claimed.epoch)
            }
            NextItem::Idle => tracing::trace!("playback worker idle"),
            NextItem::Shutdown => break,
        }
    }
    sink.close();
    tracing::info!("playback worker stopped");
}

/// Replace a sink whose device was lost.
///
/// On failure the old sink stays in place, still failed, so the next item retries.
fn reopen(
    queue: &PlaybackQueue,
    config: &OutputConfig,
    open: &mut OpenSink,
    sink: &mut Box<dyn OutputSink>,
) -> Result<()> {
    tracing::warn!("output device failed; reopening");
    sink.close();
    let fresh = open(config).context("reopen output device")?;
    queue.set_device(fresh.device_name());
    tracing::info!(device = ?fresh.device_name(), "output device reopened");
    *sink = fresh;
    Ok(())
}

fn play_item(
    queue: &PlaybackQueue,
    config: &OutputConfig,
    sink: &mut dyn OutputSink,
    item: QueueItem,
    epoch: u64,
) {
    let started = Instant::now();
    tracing::info!(
        item_id = %item.id,
        frames = item.frames(),
        rate_hz = item.sample_rate,
        channels = item.channels,
        "playing item"
    );

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        stream_item(queue, config, &mut *sink, &item, epoch)
    }))
    .unwrap_or_else(|payload| Err(anyhow::anyhow!("playback panicked: {}", panic_message(&*payload))));

    if sink.is_active() {
        if let Err(e) = sink.stop() {
            tracing::warn!(item_id = %item.id, "output stream stop failed: {e:#}");
        }
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(Played::Completed) => {
            tracing::info!(item_id = %item.id, elapsed_ms, "item completed");
            queue.finish(&item.id, Ok(()));
        }
        Ok(Played::Cancelled) => {
            tracing::info!(item_id = %item.id, elapsed_ms, "item interrupted");
            queue.finish(&item.id, Err(STOPPED_REASON.to_string()));
        }
        Err(e) => {
            tracing::error!(item_id = %item.id, "item failed: {e:#}");
            queue.finish(&item.id, Err(format!("{e:#}")));
        }
    }
}

fn stream_item(
    queue: &PlaybackQueue,
    config: &OutputConfig,
    sink: &mut dyn OutputSink,
    item: &QueueItem,
    epoch: u64,
) -> Result<Played> {
    let cancelled = || queue.is_cancelled(epoch);

    let samples = prepare(item, config);
    if cancelled() {
        return Ok(Played::Cancelled);
    }

    if !sink.is_active() {
        sink.start().context("start output stream")?;
    }

    let chunk_samples = config.chunk_samples();
    tracing::debug!(
        item_id = %item.id,
        chunks = chunk_count(samples.len(), chunk_samples),
        "streaming item"
    );
    for chunk in padded_chunks(&samples, chunk_samples) {
        if cancelled() {
            return Ok(Played::Cancelled);
        }
        sink.write(&chunk).context("write chunk to output")?;
    }

    if !sink.drain(&cancelled).context("drain output")? {
        return Ok(Played::Cancelled);
    }
    Ok(Played::Completed)
}

/// Convert an item to the device format: resample, map channels, normalize.
pub fn prepare(item: &QueueItem, config: &OutputConfig) -> Vec<f32> {
    let src_channels = item.channels.max(1) as usize;
    let resampled = resample(&item.samples, src_channels, item.sample_rate, config.sample_rate);
    let mut samples = remix(&resampled, src_channels, config.channels.max(1) as usize).into_owned();
    if let Some(gain) = normalize_peak(&mut samples, HEADROOM_PEAK) {
        tracing::trace!(item_id = %item.id, gain, "normalized");
    }
    samples
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
