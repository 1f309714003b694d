//! Synthetic room impulse response for the narration reverb.
//!
//! Three layers: a silent pre-delay, six discrete early reflections and a
//! damped noise tail under an exponential decay.

use std::f64::consts::PI;

use rand::Rng;

use super::noise::{OnePole, white};
use crate::dsp::buffer::{AudioBuffer, frames_for};

pub const PRE_DELAY: f64 = 0.020;
pub const LATE_START: f64 = 0.080;
/// Extra delay of every reflection on the right channel.
pub const STEREO_OFFSET: f64 = 0.003;

/// `(delay seconds, gain)` per early reflection.
pub const EARLY_REFLECTIONS: [(f64, f64); 6] = [
    (0.023, 0.72),
    (0.031, 0.58),
    (0.041, 0.45),
    (0.053, 0.38),
    (0.067, 0.28),
    (0.079, 0.20),
];

const REFLECTION_LENGTH: f64 = 0.002;
const TAIL_DAMPING: f64 = 0.7;
const TAIL_GAIN: f64 = 0.3;

/// Generate a stereo impulse response of `duration` seconds whose tail
/// decays as `exp(-t·decay)`.
pub fn reverb_ir<R: Rng + ?Sized>(
    duration: f64,
    decay: f64,
    sample_rate: u32,
    rng: &mut R,
) -> AudioBuffer {
    let sr = sample_rate as f64;
    let length = frames_for(duration, sample_rate);
    let late_start = (sr * LATE_START).ceil() as usize;
    let reflection_len = (sr * REFLECTION_LENGTH).ceil() as usize;

    let channels = (0..2)
        .map(|ch| {
            let mut data = vec![0.0_f32; length];
            let offset = if ch == 1 { STEREO_OFFSET } else { 0.0 };

            for &(delay, gain) in &EARLY_REFLECTIONS {
                let at = (sr * (delay + offset)).ceil() as usize;
                if at >= length {
                    continue;
                }
                let n = reflection_len.min(length - at);
                for i in 0..n {
                    let jitter = 0.9 + rng.r#gen::<f64>() * 0.2;
                    data[at + i] += (gain * (1.0 - i as f64 / n as f64) * jitter) as f32;
                }
            }

            let mut damp = OnePole::default();
            for (i, s) in data.iter_mut().enumerate().skip(late_start) {
                let t = (i - late_start) as f64 / sr;
                let tail = damp.process(white(rng), TAIL_DAMPING);
                let envelope = (-t * decay).exp();
                let modulation = 1.0 + 0.05 * (2.0 * PI * 0.5 * t).sin();
                *s += (tail * envelope * modulation * TAIL_GAIN) as f32;
            }
            data
        })
        .collect();

    AudioBuffer::from_channels(channels, sample_rate)
}
