//! Linear-interpolation sample-rate conversion.
//!
//! Whole-buffer conversion for interleaved `f32` audio. Input and output share the
//! same time span: the first and last source frames map onto the first and last
//! output frames, and every output frame sits on a uniform grid between them.

use std::borrow::Cow;

/// Number of output frames produced for `frames` input frames.
///
/// `round(frames * dst_rate / src_rate)`, never less than one for non-empty input.
pub fn output_frames(frames: usize, src_rate: u32, dst_rate: u32) -> usize {
    if frames == 0 || src_rate == 0 || dst_rate == 0 {
        return frames;
    }
    let exact = frames as f64 * dst_rate as f64 / src_rate as f64;
    (exact.round() as usize).max(1)
}

/// Resample interleaved `samples` from `src_rate` to `dst_rate`.
///
/// Returns the input borrowed when the rates match (or either rate is zero, which
/// callers reject earlier). Each channel is interpolated independently. Values are
/// not clipped.
pub fn resample(samples: &[f32], channels: usize, src_rate: u32, dst_rate: u32) -> Cow<'_, [f32]> {
    if src_rate == dst_rate || src_rate == 0 || dst_rate == 0 || samples.is_empty() {
        return Cow::Borrowed(samples);
    }
    let channels = channels.max(1);
    let frames_in = samples.len() / channels;
    if frames_in == 0 {
        return Cow::Borrowed(samples);
    }

    let frames_out = output_frames(frames_in, src_rate, dst_rate);
    let step = if frames_out > 1 {
        (frames_in - 1) as f64 / (frames_out - 1) as f64
    } else {
        0.0
    };
    let last = frames_in - 1;

    let mut out = Vec::with_capacity(frames_out * channels);
    for frame in 0..frames_out {
        let pos = frame as f64 * step;
        let i0 = (pos.floor() as usize).min(last);
        let i1 = (i0 + 1).min(last);
        let frac = (pos - i0 as f64) as f32;
        for ch in 0..channels {
            let a = samples[i0 * channels + ch];
            let b = samples[i1 * channels + ch];
            out.push(a + (b - a) * frac);
        }
    }

    Cow::Owned(out)
}
