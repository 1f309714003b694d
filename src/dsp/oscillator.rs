//! Phase-accumulator oscillators for the entrainment layer: sine carriers
//! for the binaural pair and a PolyBLEP square that gates the isochronic
//! tone.

use std::f64::consts::TAU;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    /// Band-limited square; the rounded edges keep a gate built from it
    /// click free.
    Square,
}

/// An endless stream of samples in `[-1, 1]` (the square overshoots
/// slightly at its edges).
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    /// Cycles per sample.
    increment: f64,
    /// Position within the cycle, `[0, 1)`.
    phase: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            increment: frequency / sample_rate,
            phase: 0.0,
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        let (t, dt) = (self.phase, self.increment);
        let sample = match self.waveform {
            Waveform::Sine => (TAU * t).sin(),
            Waveform::Square => {
                let naive = if t < 0.5 { 1.0 } else { -1.0 };
                naive + poly_blep(t, dt) - poly_blep((t + 0.5).fract(), dt)
            }
        };
        self.phase = (t + dt).rem_euclid(1.0);
        sample
    }

    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        self.by_ref().take(frames).map(|s| s as f32).collect()
    }
}

impl Iterator for Oscillator {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        Some(self.next_sample())
    }
}

/// Polynomial correction for a unit step at phase 0, spread over one
/// sample either side.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        let x = t / dt;
        2.0 * x - x * x - 1.0
    } else if t > 1.0 - dt {
        let x = (t - 1.0) / dt;
        x * x + 2.0 * x + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_starts_at_zero_and_stays_bounded() {
        let mut osc = Oscillator::new(Waveform::Sine, 440.0, 44_100.0);
        assert!(osc.next_sample().abs() < 1e-12);
        assert!(osc.take(44_100).all(|s| (-1.0..=1.0).contains(&s)));
    }

    #[test]
    fn quarter_cycle_peaks() {
        let mut osc = Oscillator::new(Waveform::Sine, 1.0, 4.0);
        osc.next_sample();
        assert!((osc.next_sample() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn square_has_half_duty() {
        let samples = Oscillator::new(Waveform::Square, 10.0, 44_100.0).render(44_100);
        assert!(samples.iter().all(|s| s.abs() <= 1.5));
        let high = samples.iter().filter(|s| **s > 0.0).count();
        assert!((high as f64 / 44_100.0 - 0.5).abs() < 0.01, "high for {high} samples");
    }
}
