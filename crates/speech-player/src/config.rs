use std::time::Duration;

/// Fixed output format and engine tuning, set once for the service lifetime.
#[derive(Clone, Debug)]
pub struct OutputConfig {
    /// Device sample rate in Hz. Every item is resampled to this rate.
    pub sample_rate: u32,
    /// Device channel count (1 or 2).
    pub channels: u16,
    /// Frames per chunk written to the device.
    pub chunk_frames: usize,
    /// Device-side buffering, in chunks, between the worker and the audio callback.
    pub buffer_chunks: usize,
    /// Case-insensitive substring used to pick the output device.
    pub device: Option<String>,
    /// Upper bound on how long the idle worker sleeps before re-checking the queue.
    pub idle_poll: Duration,
    /// How long `shutdown` waits for the worker before giving up on it.
    pub shutdown_timeout: Duration,
    /// Terminal items kept for status queries before the oldest are pruned.
    pub max_retained_items: usize,
}

impl Default for OutputConfig {
    /// Defaults match a ReSpeaker-class USB sound card: 48 kHz stereo f32.
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            chunk_frames: 1024,
            buffer_chunks: 4,
            device: Some("seeed".to_string()),
            idle_poll: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(5),
            max_retained_items: 256,
        }
    }
}

impl OutputConfig {
    /// Samples (not frames) in one device chunk.
    pub fn chunk_samples(&self) -> usize {
        self.chunk_frames.max(1) * self.channels.max(1) as usize
    }

    /// Capacity of the device-side buffer in samples.
    pub fn buffer_samples(&self) -> usize {
        self.chunk_samples() * self.buffer_chunks.max(1)
    }

    /// Wall-clock duration of one chunk at the device rate.
    pub fn chunk_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.chunk_frames as f64 / self.sample_rate as f64)
    }
}
