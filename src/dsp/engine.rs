//! Audio Engine: renders a [`MixGraph`] offline.
//!
//! Nodes run once each, in arena order. A node's output is handed to its
//! consumers by clone, except the last consumer which takes it by move, so
//! a chain of single-consumer nodes never copies a buffer.

use std::f64::consts::FRAC_PI_2;

use crate::error::{RenderError, Result};
use crate::graph::{FilterSpec, MixGraph, Node, Signal};

use super::buffer::AudioBuffer;
use super::compressor::Compressor;
use super::delay::DelayLine;
use super::filter::BiquadFilter;
use super::mixer::Mixer;

/// Offline renderer for mix graphs.
#[derive(Debug, Clone, Copy)]
pub struct AudioEngine {
    pub sample_rate: u32,
}

impl AudioEngine {
    pub fn new(sample_rate: u32) -> Self {
        AudioEngine { sample_rate }
    }

    /// Run `graph` and return exactly `frames` stereo frames of its root,
    /// starting at frame 0.
    pub fn render(&self, graph: MixGraph, frames: usize) -> Result<AudioBuffer> {
        if frames == 0 {
            return Err(RenderError::InvalidDuration(0.0));
        }

        let mut remaining = graph.consumer_counts();
        let node_count = graph.len();
        let mut outputs: Vec<Option<Signal>> = Vec::with_capacity(node_count);

        for (index, slot) in graph.into_slots().into_iter().enumerate() {
            let mut inputs = Vec::with_capacity(slot.inputs.len());
            for id in &slot.inputs {
                let i = id.index();
                remaining[i] -= 1;
                let signal = if remaining[i] == 0 {
                    outputs[i].take()
                } else {
                    outputs[i].clone()
                };
                match signal {
                    Some(s) => inputs.push(s),
                    None => tracing::warn!(node = index, input = i, "input consumed twice"),
                }
            }
            let name = slot.node.name();
            let output = self.run(slot.node, inputs);
            tracing::trace!(node = index, name, start = output.start, frames = output.buffer.frames());
            outputs.push(Some(output));
        }

        let mut master = Mixer::new(0, frames, 2, self.sample_rate);
        if let Some(root) = outputs.last_mut().and_then(Option::take) {
            master.add(root.start, &root.buffer);
        }
        let (_, buffer) = master.into_parts();
        if buffer.frames() != frames {
            return Err(RenderError::BufferLength {
                expected: frames,
                found: buffer.frames(),
            });
        }
        tracing::debug!(nodes = node_count, frames, "rendered mix graph");
        Ok(buffer)
    }

    fn run(&self, node: Node, inputs: Vec<Signal>) -> Signal {
        let sr = self.sample_rate;
        if let Node::Source(signal) = node {
            return signal;
        }
        if let Node::Bus { channels } = node {
            return self.bus(inputs, channels);
        }

        // every remaining node has exactly one input
        let Some(mut signal) = inputs.into_iter().next() else {
            return Signal::new(0, AudioBuffer::silent(1, 0, sr));
        };
        match node {
            Node::Gain(curve) => {
                for ch in signal.buffer.channels_mut() {
                    curve.apply(signal.start, sr, ch);
                }
                signal
            }
            Node::Filter(spec) => {
                filter_buffer(&mut signal.buffer, &spec, sr);
                signal
            }
            Node::Compressor(config) => {
                Compressor::from_config(sr as f64, &config).process_buffer(&mut signal.buffer);
                signal
            }
            Node::Convolver(reverb) => Signal::new(signal.start, reverb.process(&signal.buffer)),
            Node::Pan(pan) => Signal::new(signal.start, pan_buffer(&signal.buffer, pan)),
            Node::Delay(seconds) => {
                let channels = signal
                    .buffer
                    .channels()
                    .iter()
                    .map(|c| DelayLine::new(sr as f64, seconds).process_signal(c))
                    .collect();
                Signal::new(signal.start, AudioBuffer::from_channels(channels, sr))
            }
            Node::Source(_) | Node::Bus { .. } => signal,
        }
    }

    fn bus(&self, inputs: Vec<Signal>, channels: usize) -> Signal {
        let start = inputs.iter().map(|s| s.start).min().unwrap_or(0);
        let end = inputs.iter().map(Signal::end).max().unwrap_or(start);
        let mut mixer = Mixer::new(start, end - start, channels, self.sample_rate);
        for input in &inputs {
            mixer.add(input.start, &input.buffer);
        }
        let (start, buffer) = mixer.into_parts();
        Signal::new(start, buffer)
    }
}

fn filter_buffer(buffer: &mut AudioBuffer, spec: &FilterSpec, sample_rate: u32) {
    for ch in buffer.channels_mut() {
        BiquadFilter::with_params(spec.filter_type, sample_rate as f64, spec.frequency, spec.q, spec.gain_db)
            .process_block(ch);
    }
}

/// Equal-power panning with Web Audio `StereoPannerNode` semantics.
pub fn pan_buffer(input: &AudioBuffer, pan: f64) -> AudioBuffer {
    let pan = pan.clamp(-1.0, 1.0);
    let frames = input.frames();
    let rate = input.sample_rate();

    if !input.is_stereo() {
        let x = (pan + 1.0) / 2.0;
        let (gl, gr) = ((x * FRAC_PI_2).cos() as f32, (x * FRAC_PI_2).sin() as f32);
        let mono = input.channel(0);
        let left = mono.iter().map(|s| s * gl).collect();
        let right = mono.iter().map(|s| s * gr).collect();
        return AudioBuffer::from_stereo(left, right, rate);
    }

    let (l, r) = (input.channel(0), input.channel(1));
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    if pan <= 0.0 {
        let x = pan + 1.0;
        let (gl, gr) = ((x * FRAC_PI_2).cos() as f32, (x * FRAC_PI_2).sin() as f32);
        for i in 0..frames {
            left.push(l[i] + r[i] * gl);
            right.push(r[i] * gr);
        }
    } else {
        let (gl, gr) = ((pan * FRAC_PI_2).cos() as f32, (pan * FRAC_PI_2).sin() as f32);
        for i in 0..frames {
            left.push(l[i] * gl);
            right.push(r[i] + l[i] * gr);
        }
    }
    AudioBuffer::from_stereo(left, right, rate)
}
