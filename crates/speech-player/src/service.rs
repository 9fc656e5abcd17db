//! Public façade over the queue and the playback worker.

use std::sync::{Arc, Mutex, PoisonError};

use speech_queue_types::QueueStatus;

use crate::config::OutputConfig;
use crate::device::cpal_opener;
use crate::error::{EnqueueError, StartError};
use crate::queue::{PlaybackQueue, StopOutcome};
use crate::sink::OpenSink;
use crate::worker::{WorkerHandle, spawn_worker};

/// Serialized audio playback service.
///
/// Owns the playback worker for its lifetime. All methods take `&self` and may
/// be called from any thread; only `shutdown` waits on the worker.
pub struct SpeechQueue {
    queue: Arc<PlaybackQueue>,
    config: OutputConfig,
    worker: Mutex<Option<WorkerHandle>>,
}

impl SpeechQueue {
    /// Open the configured audio device and start the playback worker.
    pub fn start(config: OutputConfig) -> Result<Self, StartError> {
        Self::start_with(config, cpal_opener())
    }

    /// Start with a custom sink factory (tests, alternative backends).
    pub fn start_with(config: OutputConfig, open: OpenSink) -> Result<Self, StartError> {
        let queue = Arc::new(PlaybackQueue::new(config.max_retained_items));
        let worker = spawn_worker(queue.clone(), config.clone(), open)?;
        Ok(Self {
            queue,
            config,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue mono samples for playback. Returns the new item id without waiting.
    pub fn enqueue(&self, samples: Vec<f32>, sample_rate: u32) -> Result<String, EnqueueError> {
        self.enqueue_interleaved(samples, sample_rate, 1)
    }

    /// Queue interleaved mono or stereo samples for playback.
    pub fn enqueue_interleaved(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
    ) -> Result<String, EnqueueError> {
        self.queue.enqueue(samples, sample_rate, channels)
    }

    /// Cancel the current item and clear the queue. Safe to call at any time.
    pub fn stop(&self) -> StopOutcome {
        let outcome = self.queue.stop();
        tracing::info!(
            discarded = outcome.discarded,
            interrupted = outcome.interrupted,
            "playback stopped"
        );
        outcome
    }

    /// Point-in-time snapshot of the queue.
    pub fn status(&self) -> QueueStatus {
        self.queue.snapshot()
    }

    /// Stop the worker and release the output device. Idempotent.
    ///
    /// Waits at most `shutdown_timeout` for the worker to finish its current chunk.
    pub fn shutdown(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };
        let outcome = self.queue.begin_shutdown();
        tracing::info!(
            discarded = outcome.discarded,
            interrupted = outcome.interrupted,
            "shutting down playback"
        );
        if worker.join(self.config.shutdown_timeout) {
            tracing::info!("playback shut down");
        }
    }

    /// Whether the worker is still running (`shutdown` not yet called).
    pub fn is_running(&self) -> bool {
        !self.queue.is_shutting_down()
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }
}

impl Drop for SpeechQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
