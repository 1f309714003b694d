//! Biquad filter: WebAudio `BiquadFilterNode` coefficients (RBJ cookbook).

use std::f64::consts::{PI, SQRT_2};

/// Filter response shapes used by the mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    /// Constant 0 dB peak gain.
    Bandpass,
    Notch,
    /// Shelf slope 1; `gain_db` sets the boost or cut below `frequency`.
    Lowshelf,
}

/// Normalized transfer function coefficients (`a0 == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl FilterType {
    /// Coefficients for this shape. `frequency` is clamped below Nyquist and
    /// `q` kept positive.
    pub fn coefficients(self, sample_rate: f64, frequency: f64, q: f64, gain_db: f64) -> Coefficients {
        let frequency = frequency.clamp(1.0, sample_rate * 0.499);
        let w0 = 2.0 * PI * frequency / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q.max(1e-4));

        let [b0, b1, b2, a0, a1, a2] = match self {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos;
                [b1 / 2.0, b1, b1 / 2.0, 1.0 + alpha, -2.0 * cos, 1.0 - alpha]
            }
            FilterType::Highpass => {
                let b0 = (1.0 + cos) / 2.0;
                [b0, -(1.0 + cos), b0, 1.0 + alpha, -2.0 * cos, 1.0 - alpha]
            }
            FilterType::Bandpass => [alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos, 1.0 - alpha],
            FilterType::Notch => [1.0, -2.0 * cos, 1.0, 1.0 + alpha, -2.0 * cos, 1.0 - alpha],
            FilterType::Lowshelf => {
                let a = 10.0_f64.powf(gain_db.clamp(-40.0, 40.0) / 40.0);
                let k = a.sqrt() * sin * SQRT_2;
                [
                    a * ((a + 1.0) - (a - 1.0) * cos + k),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos),
                    a * ((a + 1.0) - (a - 1.0) * cos - k),
                    (a + 1.0) + (a - 1.0) * cos + k,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos),
                    (a + 1.0) + (a - 1.0) * cos - k,
                ]
            }
        };

        Coefficients {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Second-order IIR section, transposed direct form II.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    coefficients: Coefficients,
    z1: f64,
    z2: f64,
}

impl BiquadFilter {
    pub fn new(coefficients: Coefficients) -> Self {
        BiquadFilter {
            coefficients,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn with_params(filter_type: FilterType, sample_rate: f64, frequency: f64, q: f64, gain_db: f64) -> Self {
        Self::new(filter_type.coefficients(sample_rate, frequency, q, gain_db))
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let c = &self.coefficients;
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        output
    }

    /// Filter a block in place, carrying state across calls.
    pub fn process_block(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            *s = self.process(*s as f64) as f32;
        }
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}
