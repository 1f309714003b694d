//! Crystal chime marking a section boundary.

use std::f64::consts::PI;

use crate::dsp::buffer::{AudioBuffer, frames_for};

/// Base pitch of the first boundary chime; each later boundary rises 100 Hz.
pub const BASE_FREQUENCY: f64 = 1200.0;
pub const STEP_FREQUENCY: f64 = 100.0;

/// Pitch of the chime at internal boundary `index` (1-based).
pub fn boundary_frequency(index: usize) -> f64 {
    BASE_FREQUENCY + STEP_FREQUENCY * index as f64
}

/// A mono chime at `frequency` Hz: partials at 1×, 1.5× and 3× under a
/// 5 ms attack and `exp(-2.5t)` decay.
pub fn transition_chime(duration: f64, frequency: f64, sample_rate: u32) -> AudioBuffer {
    let sr = sample_rate as f64;
    let data = (0..frames_for(duration, sample_rate))
        .map(|i| {
            let t = i as f64 / sr;
            let envelope = (-t * 2.5).exp();
            let attack = if t < 0.005 { t / 0.005 } else { 1.0 };
            let w = 2.0 * PI * frequency * t;
            let tone = 0.6 * w.sin() + 0.3 * (1.5 * w).sin() + 0.1 * (3.0 * w).sin();
            (tone * envelope * attack * 0.08) as f32
        })
        .collect();
    AudioBuffer::from_mono(data, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chime_pitch_sequence() {
        assert_eq!(boundary_frequency(1), 1300.0);
        assert_eq!(boundary_frequency(3), 1500.0);
    }

    #[test]
    fn chime_shape() {
        let c = transition_chime(2.5, 1300.0, 44_100);
        assert_eq!(c.frames(), 110_250);
        assert_eq!(c.channel_count(), 1);
        assert_eq!(c.channel(0)[0], 0.0);
        assert!(c.peak() <= 0.08 + 1e-6);
        assert!(c.peak() > 0.03, "chime should be audible, peak {}", c.peak());
    }
}
