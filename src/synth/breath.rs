//! Breathing guide: a soft tone that swells on the inhale and ebbs on the
//! exhale, on a 4-2-6 second cycle.

use std::f64::consts::PI;

use crate::dsp::buffer::{AudioBuffer, frames_for};

pub const INHALE: f64 = 4.0;
pub const HOLD: f64 = 2.0;
pub const EXHALE: f64 = 6.0;
pub const CYCLE: f64 = INHALE + HOLD + EXHALE;

const GLOBAL_FADE: f64 = 2.0;
const OUTPUT_GAIN: f64 = 0.025;

/// `(amplitude, frequency multiplier)` at `phase` seconds into the cycle.
pub fn breath_shape(phase: f64) -> (f64, f64) {
    if phase < INHALE {
        let p = phase / INHALE;
        (p * p, 1.0 + 0.08 * p)
    } else if phase < INHALE + HOLD {
        (1.0, 1.08)
    } else {
        let p = ((phase - INHALE - HOLD) / EXHALE).min(1.0);
        ((1.0 - p) * (1.0 - p), 1.08 - 0.08 * p)
    }
}

/// Generate the guide tone around `base_frequency` Hz, identical in both
/// channels. The phase is integrated so the pitch glide stays smooth.
pub fn breathing_guide(duration: f64, base_frequency: f64, sample_rate: u32) -> AudioBuffer {
    let sr = sample_rate as f64;
    let length = frames_for(duration, sample_rate);
    let mut phase = 0.0_f64;
    let mut data = Vec::with_capacity(length);

    for i in 0..length {
        let t = i as f64 / sr;
        let (envelope, freq_mod) = breath_shape(t % CYCLE);
        let tone = 0.6 * (2.0 * PI * phase).sin()
            + 0.15 * (4.0 * PI * phase).sin()
            + 0.025 * (6.0 * PI * phase).sin();
        let fade = (t / GLOBAL_FADE).min((duration - t) / GLOBAL_FADE).clamp(0.0, 1.0);
        data.push((tone * envelope * fade * OUTPUT_GAIN) as f32);

        phase = (phase + base_frequency * freq_mod / sr).fract();
    }

    let right = data.clone();
    AudioBuffer::from_stereo(data, right, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_at_landmarks() {
        assert_eq!(breath_shape(0.0), (0.0, 1.0));
        let (amp, f) = breath_shape(2.0);
        assert!((amp - 0.25).abs() < 1e-12 && (f - 1.04).abs() < 1e-12);
        assert_eq!(breath_shape(5.0), (1.0, 1.08));
        let (amp, f) = breath_shape(CYCLE - 1e-9);
        assert!(amp < 1e-6 && (f - 1.0).abs() < 1e-6);
    }

    #[test]
    fn guide_is_subliminal_and_fades() {
        let g = breathing_guide(24.0, 160.0, 8_000);
        assert_eq!(g.frames(), 192_000);
        assert!(g.peak() <= 0.025 * 0.775 + 1e-6, "peak {}", g.peak());
        assert_eq!(g.channel(0)[0], 0.0, "starts from silence");
        assert!(g.channel(0)[191_999].abs() < 1e-3, "ends near silence");
        assert_eq!(g.channel(0), g.channel(1));
    }

    #[test]
    fn hold_is_loudest() {
        let g = breathing_guide(12.0, 160.0, 8_000);
        let rms = |a: f64, b: f64| {
            let s = &g.channel(0)[(a * 8000.0) as usize..(b * 8000.0) as usize];
            (s.iter().map(|x| (*x as f64).powi(2)).sum::<f64>() / s.len() as f64).sqrt()
        };
        assert!(rms(4.0, 6.0) > rms(2.0, 3.0));
        assert!(rms(4.0, 6.0) > rms(8.0, 9.0));
    }
}
