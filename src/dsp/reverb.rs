//! Convolution reverb: FFT overlap-add against a stereo impulse response.
//!
//! Normalization follows the WebAudio ConvolverNode: the response is scaled
//! by the inverse of its RMS power, then by a fixed -58 dB calibration, so
//! responses of different length and density land at a similar wet level.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use super::buffer::AudioBuffer;

const GAIN_CALIBRATION: f64 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f64 = 44100.0;
const MIN_POWER: f64 = 0.000125;

/// Scale factor WebAudio applies to a normalized impulse response.
pub fn normalization_scale(ir: &AudioBuffer) -> f64 {
    let count = (ir.frames() * ir.channel_count()).max(1);
    let power: f64 = ir
        .channels()
        .iter()
        .flat_map(|ch| ch.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum::<f64>()
        / count as f64;
    let power = power.sqrt().max(MIN_POWER);
    (1.0 / power) * GAIN_CALIBRATION * GAIN_CALIBRATION_SAMPLE_RATE / ir.sample_rate() as f64
}

/// A stereo convolution reverb with the impulse response pre-transformed.
pub struct ConvolutionReverb {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Input frames consumed per overlap-add block.
    block: usize,
    ir_len: usize,
    /// IR spectrum per output channel, with normalization folded in.
    spectra: Vec<Vec<Complex<f32>>>,
    sample_rate: u32,
}

impl std::fmt::Debug for ConvolutionReverb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvolutionReverb")
            .field("fft_size", &self.fft_size)
            .field("ir_len", &self.ir_len)
            .field("channels", &self.spectra.len())
            .finish()
    }
}

impl ConvolutionReverb {
    /// Prepare a reverb from `ir`. With `normalize` the WebAudio
    /// normalization scale is applied.
    pub fn new(ir: &AudioBuffer, normalize: bool) -> Self {
        let ir_len = ir.frames().max(1);
        let fft_size = (2 * ir_len).next_power_of_two();
        let block = fft_size - ir_len + 1;

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let ifft = planner.plan_fft_inverse(fft_size);

        // inverse FFT is unnormalized; fold 1/N into the response
        let scale = if normalize {
            normalization_scale(ir)
        } else {
            1.0
        } / fft_size as f64;

        let spectra = ir
            .channels()
            .iter()
            .map(|ch| {
                let mut spec: Vec<Complex<f32>> = ch
                    .iter()
                    .map(|&s| Complex::new((s as f64 * scale) as f32, 0.0))
                    .collect();
                spec.resize(fft_size, Complex::new(0.0, 0.0));
                fft.process(&mut spec);
                spec
            })
            .collect();

        ConvolutionReverb {
            fft,
            ifft,
            fft_size,
            block,
            ir_len,
            spectra,
            sample_rate: ir.sample_rate(),
        }
    }

    /// Convolve `input` with the response. The output has one channel per IR
    /// channel (a mono input feeds every IR channel) and keeps the full tail:
    /// `input.frames() + ir_len - 1` frames.
    pub fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        let in_len = input.frames();
        if in_len == 0 {
            return AudioBuffer::silent(self.spectra.len(), 0, self.sample_rate);
        }
        let out_len = in_len + self.ir_len - 1;
        let mut scratch = vec![Complex::new(0.0_f32, 0.0); self.fft_size];

        let channels = self
            .spectra
            .iter()
            .enumerate()
            .map(|(c, spectrum)| {
                let src = input.channel(c);
                let mut out = vec![0.0_f32; out_len];
                let mut start = 0;
                while start < in_len {
                    let end = (start + self.block).min(in_len);
                    for (i, slot) in scratch.iter_mut().enumerate() {
                        let s = if i < end - start { src[start + i] } else { 0.0 };
                        *slot = Complex::new(s, 0.0);
                    }
                    self.fft.process(&mut scratch);
                    for (x, h) in scratch.iter_mut().zip(spectrum) {
                        *x *= *h;
                    }
                    self.ifft.process(&mut scratch);

                    let span = (out_len - start).min(self.fft_size);
                    for (o, x) in out[start..start + span].iter_mut().zip(&scratch) {
                        *o += x.re;
                    }
                    start = end;
                }
                out
            })
            .collect();

        AudioBuffer::from_channels(channels, input.sample_rate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_convolution(x: &[f32], h: &[f32]) -> Vec<f32> {
        let mut y = vec![0.0; x.len() + h.len() - 1];
        for (i, &xi) in x.iter().enumerate() {
            for (j, &hj) in h.iter().enumerate() {
                y[i + j] += xi * hj;
            }
        }
        y
    }

    #[test]
    fn impulse_reproduces_response() {
        let ir = AudioBuffer::from_stereo(vec![0.5, 0.25, 0.0, -0.1], vec![0.0, 1.0, 0.0, 0.0], 100);
        let reverb = ConvolutionReverb::new(&ir, false);
        let out = reverb.process(&AudioBuffer::from_mono(vec![1.0], 100));
        assert_eq!(out.channel_count(), 2);
        assert_eq!(out.frames(), 4);
        for (got, want) in out.channel(0).iter().zip(ir.channel(0)) {
            assert!((got - want).abs() < 1e-5, "left: got {got}, want {want}");
        }
        assert!((out.channel(1)[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn matches_direct_convolution_across_blocks() {
        let h: Vec<f32> = (0..37).map(|i| ((i * 7 % 11) as f32 - 5.0) / 10.0).collect();
        let x: Vec<f32> = (0..500).map(|i| ((i * 13 % 17) as f32 - 8.0) / 8.0).collect();
        let ir = AudioBuffer::from_mono(h.clone(), 1000);
        let reverb = ConvolutionReverb::new(&ir, false);
        let out = reverb.process(&AudioBuffer::from_mono(x.clone(), 1000));
        let expected = direct_convolution(&x, &h);
        assert_eq!(out.frames(), expected.len());
        for (i, (got, want)) in out.channel(0).iter().zip(&expected).enumerate() {
            assert!((got - want).abs() < 1e-3, "sample {i}: got {got}, want {want}");
        }
    }

    #[test]
    fn normalization_matches_webaudio_scale() {
        let ir = AudioBuffer::from_stereo(vec![0.5; 100], vec![0.5; 100], 44100);
        let scale = normalization_scale(&ir);
        assert!((scale - 0.00125 / 0.5).abs() < 1e-9, "got {scale}");

        let silent = AudioBuffer::silent(2, 100, 22050);
        let scale = normalization_scale(&silent);
        assert!((scale - 0.00125 / MIN_POWER * 2.0).abs() < 1e-6, "got {scale}");
    }
}
