//! Output sink: the device stream handle owned by the playback worker.
//!
//! [`OutputSink`] is the seam between the worker and the hardware. The production
//! implementation, [`CpalSink`], wraps a CPAL output stream whose real-time callback
//! drains a bounded [`DeviceBuffer`]:
//! - `write` pushes one chunk and blocks while the buffer is full
//! - the callback converts `f32` to the device sample format and pads underruns with silence
//! - `drain` returns once the callback has pushed the last frame through the host latency
//! - device loss latches a failure flag; the worker then reopens the sink

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::buffer::DeviceBuffer;
use crate::config::OutputConfig;

const DRAIN_POLL: Duration = Duration::from_millis(5);

/// Upper bound on waiting for the host to confirm playout after the buffer empties.
const PLAYOUT_GRACE: Duration = Duration::from_secs(1);

/// An open output stream with a fixed format.
///
/// Only the playback worker holds a sink. The stream starts stopped; `start`
/// must be called before the first `write`.
pub trait OutputSink {
    /// Human-readable device name for status reporting.
    fn device_name(&self) -> Option<String> {
        None
    }

    /// Whether the stream is currently running.
    fn is_active(&self) -> bool;

    /// Start (or resume) the stream.
    fn start(&mut self) -> Result<()>;

    /// Write exactly one chunk of interleaved samples, blocking until the device accepts it.
    fn write(&mut self, chunk: &[f32]) -> Result<()>;

    /// Wait until every written frame has been played by the device.
    ///
    /// Returns `Ok(false)` if `cancel` fired first.
    fn drain(&mut self, cancel: &dyn Fn() -> bool) -> Result<bool>;

    /// Stop the stream and discard unplayed audio. The stream stays open.
    fn stop(&mut self) -> Result<()>;

    /// Stop if active and release the device. Calling it again is a no-op.
    fn close(&mut self);

    /// Whether the device was lost and the sink must be reopened before further use.
    fn is_failed(&self) -> bool {
        false
    }
}

/// Factory run on the worker thread to open the sink.
///
/// Streams are not required to be `Send`, so the handle is created where it lives.
/// The worker calls it again to replace a sink that reports [`OutputSink::is_failed`].
pub type OpenSink = Box<dyn FnMut(&OutputConfig) -> Result<Box<dyn OutputSink>> + Send>;

/// State shared between a [`CpalSink`] and its stream callbacks.
///
/// Playout is confirmed by counting frames: the last written frame has reached
/// the DAC once the callback has popped it and then emitted at least one host
/// latency worth of silence after it.
struct StreamState {
    buffer: Arc<DeviceBuffer>,
    channels: usize,
    sample_rate: u32,
    failed: AtomicBool,
    /// Real frames taken from the buffer since the stream was built.
    popped_frames: AtomicU64,
    /// Silent frames emitted after the most recent real frame.
    silent_frames: AtomicU64,
    /// Host latency plus one callback period, in frames, as last reported.
    tail_frames: AtomicU64,
}

impl StreamState {
    fn new(channels: usize, sample_rate: u32, max_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            buffer: Arc::new(DeviceBuffer::new(channels, max_samples)),
            channels,
            sample_rate,
            failed: AtomicBool::new(false),
            popped_frames: AtomicU64::new(0),
            silent_frames: AtomicU64::new(0),
            tail_frames: AtomicU64::new(0),
        }
    }

    /// Fill one callback's worth of `f32` output, padding with silence.
    ///
    /// `latency` is the host's predicted delay between this callback and playback.
    /// Returns the number of real samples written.
    fn fill(&self, out: &mut [f32], latency: Option<Duration>) -> usize {
        let got = self.buffer.pop_into(out);
        out[got..].fill(0.0);

        let frames = (out.len() / self.channels) as u64;
        let real = (got / self.channels) as u64;
        let latency_frames = latency
            .map(|d| (d.as_secs_f64() * self.sample_rate as f64).ceil() as u64)
            .unwrap_or(0);
        self.tail_frames.store(latency_frames + frames, Ordering::Relaxed);
        if real > 0 {
            self.silent_frames.store(frames - real, Ordering::Relaxed);
            self.popped_frames.fetch_add(real, Ordering::Release);
        } else {
            self.silent_frames.fetch_add(frames, Ordering::Relaxed);
        }
        got
    }

    /// Whether every one of the first `written_frames` frames has been played.
    fn played_out(&self, written_frames: u64) -> bool {
        self.popped_frames.load(Ordering::Acquire) >= written_frames
            && self.silent_frames.load(Ordering::Relaxed) >= self.tail_frames.load(Ordering::Relaxed)
    }

    fn popped_frames(&self) -> u64 {
        self.popped_frames.load(Ordering::Acquire)
    }

    /// Handle an error reported by the stream.
    ///
    /// Underruns are glitches the host already recovered from. Anything else means the
    /// stream is unusable: the failure is latched and blocked writers are released.
    fn report(&self, err: &cpal::StreamError) {
        match err {
            cpal::StreamError::BufferUnderrun => {
                tracing::warn!("output stream underrun");
            }
            other => {
                tracing::error!("output stream error: {other}");
                self.failed.store(true, Ordering::Relaxed);
                self.buffer.close();
            }
        }
    }

    fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }
}

/// CPAL-backed [`OutputSink`].
pub struct CpalSink {
    stream: Option<cpal::Stream>,
    state: Arc<StreamState>,
    active: bool,
    device_name: String,
    chunk_samples: usize,
    /// Frames the callback must pop before the current item counts as played.
    written_frames: u64,
    playout_timeout: Duration,
}

impl CpalSink {
    /// Build a stopped output stream on `device`.
    ///
    /// `sample_format` is the device's native format; samples are written as `f32`
    /// and converted inside the callback.
    pub fn build(
        device: &cpal::Device,
        device_name: String,
        stream_config: &cpal::StreamConfig,
        sample_format: cpal::SampleFormat,
        cfg: &OutputConfig,
    ) -> Result<Self> {
        let state = Arc::new(StreamState::new(
            cfg.channels as usize,
            stream_config.sample_rate,
            cfg.buffer_samples(),
        ));

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(device, stream_config, &state),
            cpal::SampleFormat::I16 => build_stream::<i16>(device, stream_config, &state),
            cpal::SampleFormat::I32 => build_stream::<i32>(device, stream_config, &state),
            cpal::SampleFormat::U16 => build_stream::<u16>(device, stream_config, &state),
            other => Err(anyhow!("Unsupported sample format: {other:?}")),
        }?;
        // Some hosts start streams on creation.
        stream.pause()?;

        Ok(Self {
            stream: Some(stream),
            state,
            active: false,
            device_name,
            chunk_samples: cfg.chunk_samples(),
            written_frames: 0,
            playout_timeout: cfg.chunk_duration() * cfg.buffer_chunks.max(1) as u32 + PLAYOUT_GRACE,
        })
    }

    fn stream(&self) -> Result<&cpal::Stream> {
        self.stream.as_ref().ok_or_else(|| anyhow!("output stream is closed"))
    }

    fn check_failed(&self) -> Result<()> {
        if self.state.is_failed() {
            bail!("output device reported an error");
        }
        Ok(())
    }
}

impl OutputSink for CpalSink {
    fn device_name(&self) -> Option<String> {
        Some(self.device_name.clone())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn start(&mut self) -> Result<()> {
        self.check_failed()?;
        self.stream()?.play()?;
        self.active = true;
        Ok(())
    }

    fn write(&mut self, chunk: &[f32]) -> Result<()> {
        if chunk.len() != self.chunk_samples {
            bail!(
                "chunk has {} samples, device expects {}",
                chunk.len(),
                self.chunk_samples
            );
        }
        if !self.active {
            bail!("write to a stopped stream");
        }
        self.check_failed()?;
        if !self.state.buffer.push_blocking(chunk) {
            bail!("output device reported an error");
        }
        self.written_frames += (chunk.len() / self.state.channels) as u64;
        Ok(())
    }

    fn drain(&mut self, cancel: &dyn Fn() -> bool) -> Result<bool> {
        if !self.state.buffer.wait_until_empty_or_cancel(cancel, DRAIN_POLL) {
            self.check_failed()?;
            return Ok(false);
        }

        let deadline = Instant::now() + self.playout_timeout;
        loop {
            self.check_failed()?;
            if self.state.played_out(self.written_frames) {
                return Ok(true);
            }
            if cancel() {
                return Ok(false);
            }
            if Instant::now() >= deadline {
                tracing::debug!(device = %self.device_name, "host did not confirm playout in time");
                return Ok(true);
            }
            std::thread::sleep(DRAIN_POLL);
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.active = false;
        let paused = self.stream()?.pause();
        self.state.buffer.clear();
        // Cleared frames will never be popped.
        self.written_frames = self.state.popped_frames();
        paused?;
        Ok(())
    }

    fn close(&mut self) {
        if self.active {
            if let Err(e) = self.stop() {
                tracing::warn!("output stream stop failed during close: {e:#}");
            }
        }
        self.state.buffer.close();
        if self.stream.take().is_some() {
            tracing::info!(device = %self.device_name, "output stream closed");
        }
    }

    fn is_failed(&self) -> bool {
        self.state.is_failed()
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    state: &Arc<StreamState>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let state_cb = state.clone();
    let state_err = state.clone();
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            let ts = info.timestamp();
            let out = &mut scratch[..data.len()];
            state_cb.fill(out, ts.playback.duration_since(&ts.callback));
            for (dst, src) in data.iter_mut().zip(out.iter()) {
                *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
            }
        },
        move |err| state_err.report(&err),
        None,
    )?;

    Ok(stream)
}
