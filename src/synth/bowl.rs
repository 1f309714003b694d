//! Singing bowl: inharmonic additive synthesis with a struck attack.

use std::f64::consts::PI;

use rand::Rng;

use super::noise::white;
use crate::dsp::buffer::{AudioBuffer, frames_for};

/// One inharmonic mode of the bowl.
#[derive(Debug, Clone, Copy)]
pub struct Partial {
    /// Frequency relative to the fundamental.
    pub ratio: f64,
    pub amp: f64,
    /// Exponential decay rate per second.
    pub decay: f64,
    /// Stereo position in `[-1, 1]`.
    pub pan: f64,
    /// Depth of the slow pitch wander.
    pub drift: f64,
}

pub const PARTIALS: [Partial; 7] = [
    Partial { ratio: 1.0, amp: 1.0, decay: 0.7, pan: 0.0, drift: 0.001 },
    Partial { ratio: 2.71, amp: 0.55, decay: 0.9, pan: 0.15, drift: 0.0015 },
    Partial { ratio: 4.95, amp: 0.3, decay: 1.1, pan: -0.1, drift: 0.002 },
    Partial { ratio: 7.77, amp: 0.18, decay: 1.5, pan: 0.2, drift: 0.0018 },
    Partial { ratio: 11.2, amp: 0.09, decay: 1.9, pan: -0.15, drift: 0.0025 },
    Partial { ratio: 15.1, amp: 0.05, decay: 2.3, pan: 0.25, drift: 0.003 },
    Partial { ratio: 19.8, amp: 0.025, decay: 2.8, pan: -0.2, drift: 0.004 },
];

const OUTPUT_GAIN: f64 = 0.15;
const SHIMMER_GAIN: f64 = 0.03;

/// Strike envelope: a 2 ms hard attack times an 18 ms soft spread from 0.7.
#[inline]
fn strike(t: f64) -> f64 {
    let hard = if t < 0.002 { t / 0.002 } else { 1.0 };
    let soft = if t < 0.02 { 0.7 + 0.3 * (t / 0.02) } else { 1.0 };
    hard * soft
}

/// A struck bowl at `fundamental` Hz. Each call draws fresh partial phases
/// and shimmer noise from `rng`.
pub fn singing_bowl<R: Rng + ?Sized>(
    duration: f64,
    fundamental: f64,
    sample_rate: u32,
    rng: &mut R,
) -> AudioBuffer {
    let sr = sample_rate as f64;
    let length = frames_for(duration, sample_rate);
    let phases: Vec<f64> = PARTIALS
        .iter()
        .map(|_| rng.r#gen::<f64>() * 2.0 * PI)
        .collect();

    let mut left = vec![0.0_f32; length];
    let mut right = vec![0.0_f32; length];

    for i in 0..length {
        let t = i as f64 / sr;
        let attack = strike(t);
        let (mut l, mut r) = (0.0, 0.0);

        for (h, (p, phase)) in PARTIALS.iter().zip(&phases).enumerate() {
            let hf = h as f64;
            let envelope = (-t * p.decay).exp();
            let wander = 1.0 + p.drift * (2.0 * PI * (0.3 + hf * 0.1) * t).sin();
            let vib_depth = if h < 3 { 0.003 } else { 0.001 };
            let vibrato = 1.0 + vib_depth * (2.0 * PI * (4.5 + hf * 0.3) * t).sin();
            let osc = (2.0 * PI * fundamental * p.ratio * wander * vibrato * t + phase).sin();
            let v = p.amp * envelope * attack * osc;
            l += v * (0.5 + p.pan * 0.5);
            r += v * (0.5 - p.pan * 0.5);
        }

        let shimmer_env = (-t * 5.0).exp();
        if shimmer_env > 0.01 {
            let shimmer = white(rng) * SHIMMER_GAIN * shimmer_env;
            l += shimmer;
            r += shimmer * 0.8;
        }

        left[i] = (l * OUTPUT_GAIN) as f32;
        right[i] = (r * OUTPUT_GAIN) as f32;
    }

    AudioBuffer::from_stereo(left, right, sample_rate)
}
