//! Brainwave entrainment layers: a binaural pair for headphone listeners and
//! an isochronic pulse that also works through speakers.

use crate::dsp::automation::GainAutomation;
use crate::dsp::buffer::{AudioBuffer, frames_for};
use crate::dsp::oscillator::{Oscillator, Waveform};

/// Left ear at `carrier` Hz, right ear at `carrier + beat` Hz, hard panned,
/// with linear fades of `fade` seconds at both ends.
pub fn binaural_pair(
    duration: f64,
    carrier: f64,
    beat: f64,
    gain: f64,
    fade: f64,
    sample_rate: u32,
) -> AudioBuffer {
    let frames = frames_for(duration, sample_rate);
    let sr = sample_rate as f64;
    let envelope = GainAutomation::trapezoid(gain, 0.0, fade, duration, fade);

    let mut left = Oscillator::new(Waveform::Sine, carrier, sr).render(frames);
    let mut right = Oscillator::new(Waveform::Sine, carrier + beat, sr).render(frames);
    envelope.apply(0, sample_rate, &mut left);
    envelope.apply(0, sample_rate, &mut right);

    AudioBuffer::from_stereo(left, right, sample_rate)
}

/// A `carrier` Hz sine gated on and off `pulse_rate` times per second,
/// identical in both channels.
pub fn isochronic_tone(
    duration: f64,
    carrier: f64,
    pulse_rate: f64,
    gain: f64,
    fade: f64,
    sample_rate: u32,
) -> AudioBuffer {
    let frames = frames_for(duration, sample_rate);
    let sr = sample_rate as f64;
    let mut tone = Oscillator::new(Waveform::Sine, carrier, sr);
    let mut gate = Oscillator::new(Waveform::Square, pulse_rate, sr);

    let mut data: Vec<f32> = (0..frames)
        .map(|_| {
            let open = (0.5 + 0.5 * gate.next_sample()).clamp(0.0, 1.0);
            (tone.next_sample() * open) as f32
        })
        .collect();
    GainAutomation::trapezoid(gain, 0.0, fade, duration, fade).apply(0, sample_rate, &mut data);

    let right = data.clone();
    AudioBuffer::from_stereo(data, right, sample_rate)
}
