//! Narration decoding: 16-bit PCM to float, Lanczos-3 rate conversion and
//! chunk stitching.

use std::f64::consts::PI;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::crossfade;
use crate::error::{RenderError, Result};

/// Native rate of the speech service's raw PCM.
pub const DEFAULT_NARRATION_RATE: u32 = 24_000;

/// Lanczos window radius.
const LOBES: i64 = 3;

/// Decode little-endian signed 16-bit mono PCM to `[-1, 1)` floats.
///
/// A trailing odd byte is a truncated sample and is dropped.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Lanczos-3 kernel: `sinc(x)·sinc(x/3)`.
#[inline]
pub fn lanczos3(x: f64) -> f64 {
    if x == 0.0 {
        return 1.0;
    }
    if x.abs() >= LOBES as f64 {
        return 0.0;
    }
    let px = PI * x;
    (px.sin() / px) * ((px / 3.0).sin() / (px / 3.0))
}

/// Fail unless both rates of a conversion are non-zero.
pub fn check_rates(source_rate: u32, target_rate: u32) -> Result<()> {
    if source_rate == 0 || target_rate == 0 {
        return Err(RenderError::SampleRate {
            source_rate,
            target_rate,
        });
    }
    Ok(())
}

/// Convert `samples` from `src_rate` to `dst_rate`.
///
/// Rates within 1 Hz of each other are treated as equal and the input is
/// returned untouched, as it is when either rate is zero; callers validate
/// rates with [`check_rates`].
pub fn resample(samples: Vec<f32>, src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate.abs_diff(dst_rate) <= 1 || samples.is_empty() || src_rate == 0 || dst_rate == 0 {
        return samples;
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio).ceil() as usize;
    let last = samples.len() as i64 - 1;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let base = pos.floor() as i64;
        let lo = (base - LOBES + 1).max(0);
        let hi = (base + LOBES).min(last);
        let mut acc = 0.0;
        for j in lo..=hi {
            acc += samples[j as usize] as f64 * lanczos3(pos - j as f64);
        }
        out.push(acc as f32);
    }
    out
}

/// Concatenate independently synthesized narration chunks, crossfading each
/// seam over `crossfade_frames` (capped at half the shorter neighbour).
pub fn stitch(chunks: &[Vec<f32>], crossfade_frames: usize) -> Vec<f32> {
    let total: usize = chunks.iter().map(Vec::len).sum();
    let mut out: Vec<f32> = Vec::with_capacity(total);

    for chunk in chunks.iter().filter(|c| !c.is_empty()) {
        let overlap = crossfade_frames.min(out.len() / 2).min(chunk.len() / 2);
        let seam = out.len() - overlap;
        crossfade::blend(&mut out[seam..], &chunk[..overlap]);
        out.extend_from_slice(&chunk[overlap..]);
    }
    out
}

/// Decoded narration at the render rate. Immutable once built.
#[derive(Debug, Clone)]
pub struct Narration {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Narration {
    /// Wrap already-decoded samples. Empty narration is a render failure.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if samples.is_empty() {
            return Err(RenderError::EmptyNarration);
        }
        check_rates(sample_rate, sample_rate)?;
        Ok(Narration {
            samples,
            sample_rate,
        })
    }

    /// Decode raw PCM at `source_rate` and convert it to `target_rate`.
    pub fn from_pcm16(bytes: &[u8], source_rate: u32, target_rate: u32) -> Result<Self> {
        check_rates(source_rate, target_rate)?;
        let raw = decode_pcm16(bytes);
        tracing::debug!(
            bytes = bytes.len(),
            samples = raw.len(),
            source_rate,
            target_rate,
            "decoded narration pcm"
        );
        Self::from_samples(resample(raw, source_rate, target_rate), target_rate)
    }

    /// Decode the speech service's base64 payload, then as [`from_pcm16`].
    ///
    /// [`from_pcm16`]: Narration::from_pcm16
    pub fn from_base64(text: &str, source_rate: u32, target_rate: u32) -> Result<Self> {
        let bytes = STANDARD.decode(text.trim())?;
        Self::from_pcm16(&bytes, source_rate, target_rate)
    }

    /// Decode several base64 chunks and stitch them into one narration.
    pub fn from_base64_chunks<S: AsRef<str>>(
        chunks: &[S],
        source_rate: u32,
        target_rate: u32,
        crossfade_seconds: f64,
    ) -> Result<Self> {
        check_rates(source_rate, target_rate)?;
        let mut decoded = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let bytes = STANDARD.decode(chunk.as_ref().trim())?;
            decoded.push(resample(decode_pcm16(&bytes), source_rate, target_rate));
        }
        let xfade = super::buffer::frames_for(crossfade_seconds, target_rate);
        Self::from_samples(stitch(&decoded, xfade), target_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_scales_and_truncates() {
        let bytes = [0x00, 0x80, 0xff, 0x7f, 0x00, 0x00, 0x42];
        let s = decode_pcm16(&bytes);
        assert_eq!(s.len(), 3, "odd trailing byte must be dropped");
        assert_eq!(s[0], -1.0);
        assert!((s[1] - 32767.0 / 32768.0).abs() < 1e-7);
        assert_eq!(s[2], 0.0);
    }

    #[test]
    fn decode_misaligned_slice() {
        let storage = [0u8, 0x00, 0x40, 0x00, 0xc0];
        let s = decode_pcm16(&storage[1..]);
        assert_eq!(s, vec![0.5, -0.5]);
    }

    #[test]
    fn kernel_shape() {
        assert_eq!(lanczos3(0.0), 1.0);
        assert_eq!(lanczos3(3.0), 0.0);
        assert_eq!(lanczos3(-4.2), 0.0);
        assert!(lanczos3(1.0).abs() < 1e-12, "zero crossings at integers");
        assert!(lanczos3(0.5) > 0.5);
    }

    #[test]
    fn resample_identity_within_one_hz() {
        let input: Vec<f32> = (0..100).map(|i| (i as f32 * 0.1).sin()).collect();
        let out = resample(input.clone(), 44_100, 44_101);
        assert_eq!(out, input);
    }

    #[test]
    fn resample_length() {
        let input = vec![0.25_f32; 24_000];
        let out = resample(input, 24_000, 44_100);
        assert_eq!(out.len(), 44_100);
        let out = resample(vec![0.0; 1001], 48_000, 44_100);
        assert_eq!(out.len(), (1001.0_f64 / (48_000.0 / 44_100.0)).ceil() as usize);
    }

    #[test]
    fn resample_preserves_low_frequency() {
        let src_rate = 24_000;
        let input: Vec<f32> = (0..src_rate)
            .map(|i| (2.0 * PI * 220.0 * i as f64 / src_rate as f64).sin() as f32)
            .collect();
        let out = resample(input, src_rate, 44_100);
        // compare away from edges against the ideal sine at the new rate
        let mut max_err = 0.0_f64;
        for i in 1000..40_000 {
            let ideal = (2.0 * PI * 220.0 * i as f64 / 44_100.0).sin();
            max_err = max_err.max((out[i] as f64 - ideal).abs());
        }
        assert!(max_err < 0.02, "resampled sine deviates by {max_err}");
    }

    #[test]
    fn zero_rate_passes_samples_through() {
        let out = resample(vec![0.1; 64], 0, 44_100);
        assert_eq!(out, vec![0.1; 64], "zero source rate must not allocate a conversion");
        assert_eq!(resample(vec![0.1; 64], 44_100, 0).len(), 64);
    }

    #[test]
    fn zero_rate_narration_is_rejected() {
        let pcm = [0x00, 0x40, 0x00, 0x40];
        assert!(matches!(
            Narration::from_pcm16(&pcm, 0, 44_100),
            Err(RenderError::SampleRate { source_rate: 0, .. })
        ));
        assert!(matches!(
            Narration::from_pcm16(&pcm, 24_000, 0),
            Err(RenderError::SampleRate { target_rate: 0, .. })
        ));
        assert!(matches!(
            Narration::from_base64_chunks(&["AEAAQA=="], 0, 8_000, 0.0),
            Err(RenderError::SampleRate { .. })
        ));
        assert!(Narration::from_samples(vec![0.5], 0).is_err(), "zero-rate samples");
    }

    #[test]
    fn empty_narration_is_fatal() {
        assert!(matches!(
            Narration::from_pcm16(&[], 24_000, 44_100),
            Err(RenderError::EmptyNarration)
        ));
        assert!(matches!(
            Narration::from_pcm16(&[0x01], 24_000, 44_100),
            Err(RenderError::EmptyNarration)
        ));
    }

    #[test]
    fn base64_payload() {
        // two samples: 0x4000 and 0xc000
        let n = Narration::from_base64("AEAAwA==", 44_100, 44_100).expect("valid payload");
        assert_eq!(n.samples(), &[0.5, -0.5]);
        assert!(matches!(
            Narration::from_base64("not base64!", 44_100, 44_100),
            Err(RenderError::Payload(_))
        ));
    }

    #[test]
    fn stitch_overlaps_seams() {
        let a = vec![1.0_f32; 100];
        let b = vec![0.0_f32; 100];
        let out = stitch(&[a, b], 10);
        assert_eq!(out.len(), 190);
        assert_eq!(out[89], 1.0);
        assert!(out[95] < 1.0 && out[95] > 0.0, "seam is blended");
        assert_eq!(out[150], 0.0);
    }

    #[test]
    fn chunked_payload_is_stitched() {
        // "AEAAQA==" is two samples of 0.5
        let n = Narration::from_base64_chunks(&["AEAAQA==", "AEAAQA=="], 8_000, 8_000, 0.0).expect("chunks");
        assert_eq!(n.samples(), &[0.5; 4]);
        assert!(matches!(
            Narration::from_base64_chunks(&["", ""], 8_000, 8_000, 0.01),
            Err(RenderError::EmptyNarration)
        ));
    }

    #[test]
    fn stitch_skips_empty_chunks() {
        let out = stitch(&[vec![], vec![0.5; 4], vec![]], 100);
        assert_eq!(out, vec![0.5; 4]);
    }
}
