//! Text-to-speech adapter.
//!
//! The HTTP layer only sees the [`Synthesizer`] trait. [`PiperSynthesizer`] runs the
//! external `piper` program once per request: text goes in on stdin, a WAV file comes
//! out in a private temp directory, and Symphonia decodes it to `f32`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tempfile::TempDir;
use thiserror::Error;

/// Decoded synthesizer output, ready to enqueue.
#[derive(Debug, Clone)]
pub struct Synthesized {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("text is empty")]
    EmptyText,
    #[error("start {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("synthesizer exited with {status}: {stderr}")]
    Process { status: ExitStatus, stderr: String },
    #[error("synthesizer produced no audio")]
    NoAudio,
    #[error("decode synthesized audio: {0:#}")]
    Decode(anyhow::Error),
    #[error("synthesizer io: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns text into audio. Implementations must be callable from any thread.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<Synthesized, SynthError>;
}

/// Paths for the piper command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiperConfig {
    pub program: PathBuf,
    pub model: PathBuf,
    pub model_config: Option<PathBuf>,
}

/// [`Synthesizer`] backed by the `piper` command-line program.
pub struct PiperSynthesizer {
    cfg: PiperConfig,
    workdir: TempDir,
    next: AtomicU64,
}

impl PiperSynthesizer {
    pub fn new(cfg: PiperConfig) -> anyhow::Result<Self> {
        let workdir = tempfile::Builder::new()
            .prefix("piper_")
            .tempdir()
            .context("create synthesizer temp dir")?;
        tracing::info!(
            program = %cfg.program.display(),
            model = %cfg.model.display(),
            workdir = %workdir.path().display(),
            "piper synthesizer ready"
        );
        Ok(Self {
            cfg,
            workdir,
            next: AtomicU64::new(0),
        })
    }

    fn command(&self, output: &Path) -> Command {
        let mut cmd = Command::new(&self.cfg.program);
        cmd.arg("--model").arg(&self.cfg.model);
        if let Some(config) = self.cfg.model_config.as_ref() {
            cmd.arg("--config").arg(config);
        }
        cmd.arg("--output_file")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    fn run(&self, text: &str, output: &Path) -> Result<Synthesized, SynthError> {
        let mut child = self.command(output).spawn().map_err(|source| SynthError::Spawn {
            program: self.cfg.program.clone(),
            source,
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            let written = stdin
                .write_all(text.as_bytes())
                .and_then(|()| stdin.write_all(b"\n"));
            // A program that exits early is reported through its exit status below.
            if let Err(e) = written {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }
        let out = child.wait_with_output()?;
        if !out.status.success() {
            return Err(SynthError::Process {
                status: out.status,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        let file = std::fs::File::open(output)?;
        decode_wav(Box::new(file)).map_err(SynthError::Decode)
    }
}

impl Synthesizer for PiperSynthesizer {
    fn synthesize(&self, text: &str) -> Result<Synthesized, SynthError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthError::EmptyText);
        }
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let output = self.workdir.path().join(format!("utterance_{n}.wav"));

        let result = self.run(text, &output);
        if let Err(e) = std::fs::remove_file(&output) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %output.display(), "remove synthesized file: {e}");
            }
        }

        let audio = result?;
        if audio.samples.is_empty() {
            return Err(SynthError::NoAudio);
        }
        tracing::debug!(
            chars = text.chars().count(),
            frames = audio.samples.len() / audio.channels.max(1) as usize,
            rate_hz = audio.sample_rate,
            "synthesized"
        );
        Ok(audio)
    }
}

/// Decode a whole WAV stream to interleaved `f32`.
pub fn decode_wav(source: Box<dyn MediaSource>) -> anyhow::Result<Synthesized> {
    let mss = MediaSourceStream::new(source, Default::default());
    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();
    let channels = u16::try_from(channels).context("channel count")?;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!("skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    Ok(Synthesized {
        samples,
        sample_rate,
        channels,
    })
}
