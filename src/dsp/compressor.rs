//! Feed-forward compressor with `DynamicsCompressorNode` parameters.
//!
//! The narration de-esser and the master limiter are both instances of it.
//! Detection is peak based and linked across channels.

use crate::config::CompressorConfig;

use super::buffer::AudioBuffer;

/// Linear amplitude to dBFS, floored at -120.
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 { -120.0 } else { 20.0 * linear.log10() }
}

#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Static curve: gain change in dB (zero or negative) for a detector level.
/// The soft knee is a quadratic joining both straight segments.
fn static_gain(level_db: f64, threshold: f64, ratio: f64, knee: f64) -> f64 {
    let slope = 1.0 - 1.0 / ratio;
    let knee_start = threshold - knee / 2.0;
    if knee <= 0.0 || level_db >= threshold + knee / 2.0 {
        (threshold - level_db).min(0.0) * slope
    } else if level_db <= knee_start {
        0.0
    } else {
        let x = level_db - knee_start;
        -slope * x * x / (2.0 * knee)
    }
}

#[derive(Debug, Clone)]
pub struct Compressor {
    threshold: f64,
    ratio: f64,
    knee: f64,
    makeup_gain: f64,
    attack_coef: f64,
    release_coef: f64,
    /// Smoothed detector level, linear.
    level: f64,
}

impl Compressor {
    /// Build from a config block, clamping out-of-range values.
    pub fn from_config(sample_rate: f64, cfg: &CompressorConfig) -> Self {
        let smoothing = |seconds: f64| (-1.0 / (seconds * sample_rate)).exp();
        Compressor {
            threshold: cfg.threshold.clamp(-100.0, 0.0),
            ratio: cfg.ratio.clamp(1.0, 20.0),
            knee: cfg.knee.clamp(0.0, 40.0),
            makeup_gain: cfg.makeup_gain,
            attack_coef: smoothing(cfg.attack.clamp(1e-4, 1.0)),
            release_coef: smoothing(cfg.release.clamp(1e-3, 5.0)),
            level: 0.0,
        }
    }

    fn curve(&self, level_db: f64) -> f64 {
        static_gain(level_db, self.threshold, self.ratio, self.knee)
    }

    /// Feed the detector and return the linear gain for this sample.
    #[inline]
    fn next_gain(&mut self, peak: f64) -> f32 {
        let coef = if peak > self.level { self.attack_coef } else { self.release_coef };
        self.level = coef * self.level + (1.0 - coef) * peak;
        db_to_linear(self.curve(linear_to_db(self.level)) + self.makeup_gain) as f32
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let gain = self.next_gain(left.abs().max(right.abs()) as f64);
        (left * gain, right * gain)
    }

    /// Compress a mono or stereo buffer in place.
    pub fn process_buffer(&mut self, buffer: &mut AudioBuffer) {
        match buffer.channels_mut() {
            [mono] => {
                for s in mono.iter_mut() {
                    *s *= self.next_gain(s.abs() as f64);
                }
            }
            [left, right] => {
                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    (*l, *r) = self.process(*l, *r);
                }
            }
            _ => {}
        }
    }

    /// Current gain reduction in dB, positive when compressing.
    pub fn gain_reduction(&self) -> f64 {
        -self.curve(linear_to_db(self.level))
    }
}
