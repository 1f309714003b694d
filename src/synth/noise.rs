//! Noise sources and the one-pole smoother every texture is built from.

use rand::Rng;

use crate::dsp::buffer::{AudioBuffer, frames_for};

/// Uniform white noise in `[-1, 1)`.
#[inline]
pub fn white<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.r#gen::<f64>() * 2.0 - 1.0
}

/// `y = a·y + (1 − a)·x`. Higher `a` is darker.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnePole {
    state: f64,
}

impl OnePole {
    #[inline]
    pub fn process(&mut self, input: f64, coefficient: f64) -> f64 {
        self.state = self.state * coefficient + input * (1.0 - coefficient);
        self.state
    }
}

/// Paul Kellet's refined pink noise filter (seven poles).
#[derive(Debug, Clone, Copy, Default)]
pub struct KelletPink {
    b: [f64; 7],
}

impl KelletPink {
    #[inline]
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        let w = white(rng);
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + w * 0.0555179;
        b[1] = 0.99332 * b[1] + w * 0.0750759;
        b[2] = 0.96900 * b[2] + w * 0.1538520;
        b[3] = 0.86650 * b[3] + w * 0.3104856;
        b[4] = 0.55000 * b[4] + w * 0.5329522;
        b[5] = -0.7616 * b[5] - w * 0.0168980;
        let out = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + w * 0.5362;
        b[6] = w * 0.115926;
        out
    }
}

/// Cheap three-pole pink approximation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreePolePink {
    b: [f64; 3],
}

impl ThreePolePink {
    #[inline]
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        let w = white(rng);
        self.b[0] = 0.99 * self.b[0] + w * 0.01;
        self.b[1] = 0.96 * self.b[1] + w * 0.04;
        self.b[2] = 0.80 * self.b[2] + w * 0.20;
        self.b.iter().sum()
    }
}

/// Low-level mono pink-noise bed, substituted when no background clip can
/// be obtained.
pub fn fallback_bed<R: Rng + ?Sized>(duration: f64, sample_rate: u32, rng: &mut R) -> AudioBuffer {
    let frames = frames_for(duration, sample_rate);
    let mut pink = KelletPink::default();
    let data = (0..frames).map(|_| (pink.next(rng) * 0.003) as f32).collect();
    AudioBuffer::from_mono(data, sample_rate)
}
