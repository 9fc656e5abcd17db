//! Errors surfaced at the [`SpeechQueue`](crate::SpeechQueue) boundary.
//!
//! Per-item playback failures never appear here; the worker records them on the item.

use thiserror::Error;

/// Rejected enqueue request. No item is created when this is returned.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("audio buffer is empty")]
    EmptyBuffer,
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),
    #[error("unsupported channel count {0} (expected 1 or 2)")]
    UnsupportedChannels(u16),
    #[error("{samples} samples do not divide into {channels}-channel frames")]
    RaggedFrames { samples: usize, channels: u16 },
    #[error("sample {index} is not a finite number")]
    NonFiniteSample { index: usize },
    #[error("playback queue is shutting down")]
    ShuttingDown,
}

/// Fatal engine startup failure.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("open output device: {0:#}")]
    DeviceOpen(anyhow::Error),
    #[error("spawn playback worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
    #[error("playback worker exited before reporting device state")]
    WorkerExited,
}
