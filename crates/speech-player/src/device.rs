//! Output device discovery, selection, and opening.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting a device by name substring, falling back to the host default
//! - opening a stopped [`CpalSink`] with the fixed service format

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};
use speech_queue_types::OutputDevice;

use crate::config::OutputConfig;
use crate::sink::{CpalSink, OpenSink, OutputSink};

/// Pick the output device for `needle`.
///
/// Chooses the first output device whose name contains `needle` (case-insensitive).
/// When nothing matches, or no preference is set, the host default output device is
/// used. Only a host with no default output device is an error.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<(cpal::Device, String)> {
    if let Some(needle) = needle {
        let devices: Vec<cpal::Device> = match host.output_devices() {
            Ok(devices) => devices.collect(),
            Err(e) => {
                tracing::warn!("output device enumeration failed: {e}");
                Vec::new()
            }
        };
        let names: Vec<String> = devices.iter().map(device_name).collect();
        if let Some(idx) = select_by_name(&names, needle) {
            tracing::info!(device = %names[idx], needle, "found preferred output device");
            let name = names[idx].clone();
            if let Some(device) = devices.into_iter().nth(idx) {
                return Ok((device, name));
            }
        }
        tracing::info!(needle, "no output device matched; using default output device");
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))?;
    let name = device_name(&device);
    Ok((device, name))
}

/// Index of the first name containing `needle` (case-insensitive).
pub fn select_by_name(names: &[String], needle: &str) -> Option<usize> {
    names.iter().position(|name| matches_device_name(name, needle))
}

/// Find a stream config with the exact rate and channel count from `cfg`.
///
/// Among matching ranges the native format is chosen by preference
/// (`f32` first). The buffer size is fixed to `chunk_frames` when the device
/// allows it.
pub fn pick_output_config(
    device: &cpal::Device,
    cfg: &OutputConfig,
) -> Result<(cpal::StreamConfig, cpal::SampleFormat)> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query supported output configs")?
        .collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    let best = ranges
        .into_iter()
        .filter(|r| {
            r.channels() == cfg.channels
                && r.min_sample_rate() <= cfg.sample_rate
                && r.max_sample_rate() >= cfg.sample_rate
        })
        .min_by_key(|r| sample_format_rank(r.sample_format()))
        .ok_or_else(|| {
            anyhow!(
                "device does not support {} Hz with {} channels",
                cfg.sample_rate,
                cfg.channels
            )
        })?;

    let supported = best.with_sample_rate(cfg.sample_rate);
    let mut stream_config: cpal::StreamConfig = supported.config();
    stream_config.buffer_size = fixed_buffer_size(supported.buffer_size(), cfg.chunk_frames);
    Ok((stream_config, supported.sample_format()))
}

/// Open the preferred device with the fixed service format.
///
/// The returned sink is stopped until its first `start`.
pub fn open_output(cfg: &OutputConfig) -> Result<CpalSink> {
    let host = cpal::default_host();
    let (device, name) = pick_device(&host, cfg.device.as_deref())?;
    let (stream_config, sample_format) = pick_output_config(&device, cfg)
        .with_context(|| format!("configure output device {name}"))?;
    tracing::info!(
        device = %name,
        rate_hz = stream_config.sample_rate,
        channels = stream_config.channels,
        sample_format = ?sample_format,
        buffer_size = ?stream_config.buffer_size,
        "device output config"
    );
    CpalSink::build(&device, name.clone(), &stream_config, sample_format, cfg)
        .with_context(|| format!("open output stream on {name}"))
}

/// [`OpenSink`] factory for the real audio device.
pub fn cpal_opener() -> OpenSink {
    Box::new(|cfg: &OutputConfig| -> Result<Box<dyn OutputSink>> {
        let sink = open_output(cfg)?;
        Ok(Box::new(sink))
    })
}

/// Print available output devices to stdout.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    for (i, d) in list_device_infos(host)?.iter().enumerate() {
        let marker = if d.is_default { " (default)" } else { "" };
        println!(
            "#{i}: {}{marker} [{}-{} Hz, up to {} ch]",
            d.name, d.min_rate, d.max_rate, d.max_channels
        );
    }
    Ok(())
}

/// Return output device metadata for listing endpoints.
pub fn list_device_infos(host: &cpal::Host) -> Result<Vec<OutputDevice>> {
    let default_name = host.default_output_device().map(|d| device_name(&d));
    let devices = host.output_devices().context("No output devices")?;
    let mut out = Vec::new();
    for d in devices {
        let name = device_name(&d);
        let mut min_rate = u32::MAX;
        let mut max_rate = 0u32;
        let mut max_channels = 0u16;
        if let Ok(ranges) = d.supported_output_configs() {
            for r in ranges {
                min_rate = min_rate.min(r.min_sample_rate());
                max_rate = max_rate.max(r.max_sample_rate());
                max_channels = max_channels.max(r.channels());
            }
        }
        if max_rate == 0 || min_rate > max_rate {
            tracing::debug!(device = %name, "skipping device without a usable sample rate range");
            continue;
        }
        out.push(OutputDevice {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            min_rate,
            max_rate,
            max_channels,
        });
    }
    Ok(out)
}

fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|d| d.name().to_string())
        .unwrap_or_else(|_| "unknown device".to_string())
}

fn fixed_buffer_size(supported: &cpal::SupportedBufferSize, frames: usize) -> cpal::BufferSize {
    let frames = u32::try_from(frames).unwrap_or(u32::MAX);
    match supported {
        cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => {
            cpal::BufferSize::Fixed(frames)
        }
        _ => cpal::BufferSize::Default,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
