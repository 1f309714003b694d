//! Mixer: sums positioned buffers into a window of the render timeline.

use super::buffer::AudioBuffer;

/// A summing mixer over the frame window `[start, start + len)`.
///
/// Sources may begin before or run past the window; only the overlapping
/// part is accumulated. Mono sources are spread to both channels of a
/// stereo mix.
#[derive(Debug, Clone)]
pub struct Mixer {
    start: usize,
    buffer: AudioBuffer,
}

impl Mixer {
    pub fn new(start: usize, frames: usize, channel_count: usize, sample_rate: u32) -> Self {
        Mixer {
            start,
            buffer: AudioBuffer::silent(channel_count, frames, sample_rate),
        }
    }

    /// Accumulate `source`, whose first frame sits at absolute frame `at`.
    pub fn add(&mut self, at: usize, source: &AudioBuffer) {
        self.add_scaled(at, source, 1.0);
    }

    /// Accumulate `source × gain`.
    pub fn add_scaled(&mut self, at: usize, source: &AudioBuffer, gain: f32) {
        let win_end = self.start + self.buffer.frames();
        let src_end = at + source.frames();
        let from = at.max(self.start);
        let to = src_end.min(win_end);
        if from >= to {
            return;
        }
        let src_off = from - at;
        let dst_off = from - self.start;
        let n = to - from;

        let channels = self.buffer.channel_count();
        for c in 0..channels {
            let src = &source.channel(c)[src_off..src_off + n];
            let dst = &mut self.buffer.channel_mut(c)[dst_off..dst_off + n];
            for (d, s) in dst.iter_mut().zip(src) {
                *d += *s * gain;
            }
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.buffer.frames()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The window start and the mixed buffer.
    pub fn into_parts(self) -> (usize, AudioBuffer) {
        (self.start, self.buffer)
    }
}
