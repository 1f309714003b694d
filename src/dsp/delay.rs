//! Fractional delay line: used for Haas widening of the narration.

/// A single-channel delay line with a fractional delay time.
///
/// The read position is interpolated linearly between the two neighbouring
/// samples, so sub-millisecond delays that fall between frames still shift
/// the signal accurately.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
    /// Delay in (fractional) samples.
    delay_samples: f64,
}

impl DelayLine {
    /// Create a delay line.
    ///
    /// # Arguments
    /// - `sample_rate`: Audio sample rate in Hz.
    /// - `delay_time`: Delay in seconds, clamped to be non-negative.
    pub fn new(sample_rate: f64, delay_time: f64) -> Self {
        let delay_samples = (delay_time.max(0.0) * sample_rate).max(0.0);
        let buffer_size = delay_samples.ceil() as usize + 2;
        Self {
            buffer: vec![0.0; buffer_size],
            write_pos: 0,
            delay_samples,
        }
    }

    /// Whole frames the output trails the input by, rounded up.
    pub fn latency_frames(&self) -> usize {
        self.delay_samples.ceil() as usize
    }

    /// Push one input sample and return the delayed output.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let len = self.buffer.len();
        self.buffer[self.write_pos] = input;

        let whole = self.delay_samples.floor() as usize;
        let frac = (self.delay_samples - whole as f64) as f32;
        let idx0 = (self.write_pos + len - whole) % len;
        let idx1 = (idx0 + len - 1) % len;
        let out = self.buffer[idx0] * (1.0 - frac) + self.buffer[idx1] * frac;

        self.write_pos = (self.write_pos + 1) % len;
        out
    }

    /// Delay a whole signal. The output is longer than the input by
    /// [`latency_frames`](Self::latency_frames) so the tail is kept.
    pub fn process_signal(&mut self, input: &[f32]) -> Vec<f32> {
        let extra = self.latency_frames();
        input
            .iter()
            .copied()
            .chain(std::iter::repeat(0.0).take(extra))
            .map(|s| self.process(s))
            .collect()
    }
}
