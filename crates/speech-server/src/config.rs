//! Configuration loading and parsing.
//!
//! Defines the TOML schema and resolves it against CLI flags and built-in defaults
//! (CLI flag > TOML > default).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use speech_player::OutputConfig;

use crate::synth::PiperConfig;

pub const DEFAULT_BIND: &str = "0.0.0.0:8912";

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Output device and playback engine settings.
    pub output: Option<OutputSection>,
    /// Text-to-speech settings. `/text` is disabled without it.
    pub synth: Option<SynthSection>,
}

/// `[output]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    /// Device name substring; an empty string selects the default device.
    pub device: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub chunk_frames: Option<usize>,
    pub buffer_chunks: Option<usize>,
    pub idle_poll_ms: Option<u64>,
    pub shutdown_timeout_ms: Option<u64>,
    pub max_retained_items: Option<usize>,
}

/// `[synth]` table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynthSection {
    /// Piper executable (defaults to `piper` on `PATH`).
    pub program: Option<String>,
    /// Voice model (`.onnx`).
    pub model: String,
    /// Voice config (`.onnx.json`); piper looks next to the model when omitted.
    pub model_config: Option<String>,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<ServerConfig>(raw)?)
    }

    /// Load `path`, or `config.toml` next to the executable when present, or defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = path {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        let auto_path = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("config.toml")));
        match auto_path {
            Some(path) if path.exists() => Ok((Self::load(&path)?, Some(path))),
            _ => Ok((Self::default(), None)),
        }
    }
}

/// Resolve the HTTP bind address.
pub fn resolve_bind(cli: Option<SocketAddr>, cfg: &ServerConfig) -> Result<SocketAddr> {
    if let Some(addr) = cli {
        return Ok(addr);
    }
    let raw = cfg.bind.as_deref().unwrap_or(DEFAULT_BIND);
    raw.parse()
        .with_context(|| format!("parse bind address {raw}"))
}

/// Build the playback engine config.
pub fn resolve_output(cli_device: Option<String>, cfg: &ServerConfig) -> Result<OutputConfig> {
    let mut out = OutputConfig::default();
    if let Some(section) = cfg.output.as_ref() {
        if let Some(device) = section.device.clone() {
            out.device = Some(device);
        }
        if let Some(rate) = section.sample_rate {
            out.sample_rate = rate;
        }
        if let Some(channels) = section.channels {
            out.channels = channels;
        }
        if let Some(frames) = section.chunk_frames {
            out.chunk_frames = frames;
        }
        if let Some(chunks) = section.buffer_chunks {
            out.buffer_chunks = chunks;
        }
        if let Some(ms) = section.idle_poll_ms {
            out.idle_poll = Duration::from_millis(ms);
        }
        if let Some(ms) = section.shutdown_timeout_ms {
            out.shutdown_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = section.max_retained_items {
            out.max_retained_items = max;
        }
    }
    if let Some(device) = cli_device {
        out.device = Some(device);
    }
    if out.device.as_deref().is_some_and(|d| d.trim().is_empty()) {
        out.device = None;
    }

    if out.sample_rate == 0 {
        bail!("output.sample_rate must be positive");
    }
    if !matches!(out.channels, 1 | 2) {
        bail!("output.channels must be 1 or 2, got {}", out.channels);
    }
    if out.chunk_frames == 0 {
        bail!("output.chunk_frames must be positive");
    }
    Ok(out)
}

/// Build the synthesizer config, checking that the model files exist.
pub fn resolve_synth(cfg: &ServerConfig) -> Result<Option<PiperConfig>> {
    let Some(section) = cfg.synth.as_ref() else {
        return Ok(None);
    };
    let model = PathBuf::from(&section.model);
    if !model.is_file() {
        bail!("model not found at {:?}", model);
    }
    let model_config = section.model_config.as_ref().map(PathBuf::from);
    if let Some(path) = model_config.as_ref() {
        if !path.is_file() {
            bail!("model config not found at {:?}", path);
        }
    }
    Ok(Some(PiperConfig {
        program: PathBuf::from(section.program.as_deref().unwrap_or("piper")),
        model,
        model_config,
    }))
}
