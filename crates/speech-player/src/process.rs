//! Per-item signal preparation: channel mapping, headroom normalization, chunking.

use std::borrow::Cow;

/// Peak amplitude every item is scaled to before streaming.
pub const HEADROOM_PEAK: f32 = 0.9;

/// Map interleaved audio from `src_channels` to `dst_channels`.
///
/// Mapping rules:
/// - equal counts: pass-through (borrowed)
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
pub fn remix(samples: &[f32], src_channels: usize, dst_channels: usize) -> Cow<'_, [f32]> {
    match (src_channels, dst_channels) {
        (a, b) if a == b => Cow::Borrowed(samples),
        (1, 2) => {
            let mut out = Vec::with_capacity(samples.len() * 2);
            for &s in samples {
                out.push(s);
                out.push(s);
            }
            Cow::Owned(out)
        }
        (2, 1) => Cow::Owned(
            samples
                .chunks_exact(2)
                .map(|lr| 0.5 * (lr[0] + lr[1]))
                .collect(),
        ),
        (src, dst) => {
            // Best effort for layouts the queue never accepts: clamp to available channels.
            let src = src.max(1);
            let frames = samples.len() / src;
            let mut out = Vec::with_capacity(frames * dst);
            for frame in samples.chunks_exact(src) {
                for ch in 0..dst {
                    out.push(frame[ch.min(src - 1)]);
                }
            }
            Cow::Owned(out)
        }
    }
}

/// Largest absolute sample value.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Scale `samples` in place so the peak is exactly `target`.
///
/// Silence (peak of zero) is left untouched and `None` is returned; otherwise the
/// applied gain is returned.
pub fn normalize_peak(samples: &mut [f32], target: f32) -> Option<f32> {
    let peak = peak(samples);
    if peak <= 0.0 {
        return None;
    }
    let gain = target / peak;
    for s in samples.iter_mut() {
        *s = (*s * gain).clamp(-target, target);
    }
    Some(gain)
}

/// Split interleaved samples into device chunks of exactly `chunk_samples`.
///
/// The final partial chunk is zero-padded; full chunks are borrowed.
pub fn padded_chunks(samples: &[f32], chunk_samples: usize) -> impl Iterator<Item = Cow<'_, [f32]>> {
    let chunk_samples = chunk_samples.max(1);
    samples.chunks(chunk_samples).map(move |chunk| {
        if chunk.len() == chunk_samples {
            Cow::Borrowed(chunk)
        } else {
            let mut padded = Vec::with_capacity(chunk_samples);
            padded.extend_from_slice(chunk);
            padded.resize(chunk_samples, 0.0);
            Cow::Owned(padded)
        }
    })
}

/// Number of chunks [`padded_chunks`] yields.
pub fn chunk_count(samples: usize, chunk_samples: usize) -> usize {
    samples.div_ceil(chunk_samples.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn mono_to_stereo_duplicates() {
        let out = remix(&[0.1, -0.2], 1, 2);
        assert_eq!(&*out, &[0.1, 0.1, -0.2, -0.2]);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let out = remix(&[0.2, 0.4, -1.0, 1.0], 2, 1);
        assert_abs_diff_eq!(out[0], 0.3, epsilon = 1e-6);
        assert_abs_diff_eq!(out[1], 0.0);
    }

    #[test]
    fn matching_layout_borrows() {
        let input = [0.5, 0.5];
        assert!(matches!(remix(&input, 2, 2), Cow::Borrowed(_)));
    }

    #[test]
    fn peak_of_two_scales_by_045() {
        let mut buf = vec![2.0, -1.0, 0.5, -2.0];
        let gain = normalize_peak(&mut buf, HEADROOM_PEAK).unwrap();
        assert_abs_diff_eq!(gain, 0.45);
        assert_eq!(peak(&buf), 0.9);
        assert_abs_diff_eq!(buf[1], -0.45);
        assert_abs_diff_eq!(buf[2], 0.225);
    }

    #[test]
    fn quiet_input_is_raised_to_headroom() {
        let mut buf = vec![0.01, -0.02, 0.015];
        normalize_peak(&mut buf, HEADROOM_PEAK);
        assert!(peak(&buf) <= HEADROOM_PEAK);
        assert_abs_diff_eq!(peak(&buf), HEADROOM_PEAK, epsilon = 1e-6);
    }

    #[test]
    fn silence_passes_through() {
        let mut buf = vec![0.0; 64];
        assert!(normalize_peak(&mut buf, HEADROOM_PEAK).is_none());
        assert!(buf.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn normalized_peak_never_exceeds_headroom() {
        for scale in [0.001f32, 0.3, 0.9, 1.0, 1.7, 13.0] {
            let mut buf: Vec<f32> = (0..997).map(|i| ((i as f32) * 0.37).sin() * scale).collect();
            normalize_peak(&mut buf, HEADROOM_PEAK);
            assert!(peak(&buf) <= HEADROOM_PEAK);
        }
    }

    #[test]
    fn last_chunk_is_zero_padded() {
        let samples: Vec<f32> = (1..=10).map(|v| v as f32).collect();
        let chunks: Vec<_> = padded_chunks(&samples, 4).collect();
        assert_eq!(chunks.len(), chunk_count(samples.len(), 4));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 4));
        assert_eq!(&*chunks[2], &[9.0, 10.0, 0.0, 0.0]);
        assert!(matches!(chunks[0], Cow::Borrowed(_)));
    }

    #[test]
    fn exact_multiple_has_no_padding_chunk() {
        let samples = vec![0.5; 8];
        let chunks: Vec<_> = padded_chunks(&samples, 4).collect();
        assert_eq!(chunks.len(), 2);
    }
}
