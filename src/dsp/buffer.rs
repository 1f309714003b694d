//! Planar audio buffers.
//!
//! [`AudioBuffer`] is the unit every generator returns and every graph node
//! consumes: a fixed channel count (mono or stereo), a fixed sample rate and a
//! fixed number of frames.

/// Frames needed to hold `seconds` of audio at `sample_rate`.
///
/// Rounds up, so a generator asked for 0.1 s never comes back one frame
/// short. A tiny tolerance keeps exact products like `2.5 × 44100` from
/// rounding up on float noise.
pub fn frames_for(seconds: f64, sample_rate: u32) -> usize {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f64 - 1e-7).ceil().max(0.0) as usize
}

/// A fixed-length, fixed-channel audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// One sample vector per channel, all the same length.
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// A silent buffer.
    pub fn silent(channel_count: usize, frames: usize, sample_rate: u32) -> Self {
        let channel_count = channel_count.clamp(1, 2);
        AudioBuffer {
            channels: vec![vec![0.0; frames]; channel_count],
            sample_rate,
        }
    }

    pub fn from_mono(data: Vec<f32>, sample_rate: u32) -> Self {
        AudioBuffer {
            channels: vec![data],
            sample_rate,
        }
    }

    pub fn from_stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Self {
        let frames = left.len().min(right.len());
        let (mut left, mut right) = (left, right);
        left.truncate(frames);
        right.truncate(frames);
        AudioBuffer {
            channels: vec![left, right],
            sample_rate,
        }
    }

    /// Build from planar channels. Extra channels beyond two are dropped and
    /// ragged channels are truncated to the shortest.
    pub fn from_channels(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        channels.truncate(2);
        if channels.is_empty() {
            channels.push(Vec::new());
        }
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for ch in &mut channels {
            ch.truncate(frames);
        }
        AudioBuffer {
            channels,
            sample_rate,
        }
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn is_stereo(&self) -> bool {
        self.channels.len() == 2
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index.min(self.channels.len() - 1)]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        let last = self.channels.len() - 1;
        &mut self.channels[index.min(last)]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Largest absolute sample across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    /// Root-mean-square over every sample of every channel.
    pub fn rms(&self) -> f64 {
        let count: usize = self.channels.iter().map(Vec::len).sum();
        if count == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .channels
            .iter()
            .flat_map(|ch| ch.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        (sum / count as f64).sqrt()
    }

    /// Interleave the channels frame by frame.
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for i in 0..frames {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_round_up() {
        assert_eq!(frames_for(1.0, 44_100), 44_100);
        assert_eq!(frames_for(2.5, 44_100), 110_250);
        assert_eq!(frames_for(0.00001, 44_100), 1);
        assert_eq!(frames_for(0.0, 44_100), 0);
        assert_eq!(frames_for(f64::NAN, 44_100), 0);
    }

    #[test]
    fn ragged_channels_truncate() {
        let buf = AudioBuffer::from_channels(vec![vec![0.0; 5], vec![0.0; 3], vec![0.0; 9]], 10);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.frames(), 3);
    }

    #[test]
    fn rms_of_constant() {
        let buf = AudioBuffer::from_stereo(vec![0.5; 10], vec![-0.5; 10], 10);
        assert!((buf.rms() - 0.5).abs() < 1e-9);
        assert!((buf.peak() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn interleave_order() {
        let buf = AudioBuffer::from_stereo(vec![1.0, 2.0], vec![-1.0, -2.0], 10);
        assert_eq!(buf.interleaved(), vec![1.0, -1.0, 2.0, -2.0]);
    }
}
