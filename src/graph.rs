//! Render graph: an arena of processing nodes.
//!
//! A node may only read from nodes created before it, so arena order is a
//! topological order and the engine can run the nodes front to back. The
//! last node created is the root.

use std::sync::Arc;

use crate::config::CompressorConfig;
use crate::dsp::automation::GainAutomation;
use crate::dsp::buffer::AudioBuffer;
use crate::dsp::filter::FilterType;
use crate::dsp::reverb::ConvolutionReverb;

/// Handle to a node in a [`MixGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A buffer positioned on the render timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Absolute frame of the buffer's first sample.
    pub start: usize,
    pub buffer: AudioBuffer,
}

impl Signal {
    pub fn new(start: usize, buffer: AudioBuffer) -> Self {
        Signal { start, buffer }
    }

    /// One past the absolute frame of the last sample.
    pub fn end(&self) -> usize {
        self.start + self.buffer.frames()
    }
}

/// Biquad parameters for a filter node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,
    pub gain_db: f64,
}

/// What a node does to its inputs.
#[derive(Debug)]
pub enum Node {
    /// A precomputed signal. No inputs.
    Source(Signal),
    /// Multiply by a gain curve on the absolute timeline.
    Gain(GainAutomation),
    Filter(FilterSpec),
    /// Stereo-linked feed-forward compressor.
    Compressor(CompressorConfig),
    /// Convolve with a prepared impulse response.
    Convolver(Arc<ConvolutionReverb>),
    /// Equal-power stereo panner in `[-1, 1]`.
    Pan(f64),
    /// Fractional delay in seconds.
    Delay(f64),
    /// Sum every input into one signal with `channels` channels.
    Bus { channels: usize },
}

impl Node {
    pub fn name(&self) -> &'static str {
        match self {
            Node::Source(_) => "source",
            Node::Gain(_) => "gain",
            Node::Filter(_) => "filter",
            Node::Compressor(_) => "compressor",
            Node::Convolver(_) => "convolver",
            Node::Pan(_) => "pan",
            Node::Delay(_) => "delay",
            Node::Bus { .. } => "bus",
        }
    }
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) node: Node,
    pub(crate) inputs: Vec<NodeId>,
}

/// Arena of nodes feeding a single root.
#[derive(Debug)]
pub struct MixGraph {
    slots: Vec<Slot>,
    sample_rate: u32,
}

impl MixGraph {
    pub fn new(sample_rate: u32) -> Self {
        MixGraph {
            slots: Vec::new(),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The node that produces the graph's output.
    pub fn root(&self) -> Option<NodeId> {
        self.slots.len().checked_sub(1).map(NodeId)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0).map(|s| &s.node)
    }

    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        self.slots.get(id.0).map_or(&[], |s| &s.inputs)
    }

    fn push(&mut self, node: Node, inputs: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.slots.len());
        debug_assert!(
            inputs.iter().all(|i| i.0 < id.0),
            "{} node reads from a later node",
            node.name()
        );
        self.slots.push(Slot { node, inputs });
        id
    }

    pub fn source(&mut self, signal: Signal) -> NodeId {
        self.push(Node::Source(signal), Vec::new())
    }

    pub fn gain(&mut self, input: NodeId, curve: GainAutomation) -> NodeId {
        self.push(Node::Gain(curve), vec![input])
    }

    pub fn filter(&mut self, input: NodeId, spec: FilterSpec) -> NodeId {
        self.push(Node::Filter(spec), vec![input])
    }

    pub fn compressor(&mut self, input: NodeId, config: CompressorConfig) -> NodeId {
        self.push(Node::Compressor(config), vec![input])
    }

    pub fn convolver(&mut self, input: NodeId, reverb: Arc<ConvolutionReverb>) -> NodeId {
        self.push(Node::Convolver(reverb), vec![input])
    }

    pub fn pan(&mut self, input: NodeId, pan: f64) -> NodeId {
        self.push(Node::Pan(pan.clamp(-1.0, 1.0)), vec![input])
    }

    pub fn delay(&mut self, input: NodeId, seconds: f64) -> NodeId {
        self.push(Node::Delay(seconds.max(0.0)), vec![input])
    }

    pub fn bus(&mut self, inputs: &[NodeId], channels: usize) -> NodeId {
        self.push(Node::Bus { channels: channels.clamp(1, 2) }, inputs.to_vec())
    }

    /// How many nodes read each node's output.
    pub fn consumer_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.slots.len()];
        for slot in &self.slots {
            for input in &slot.inputs {
                counts[input.0] += 1;
            }
        }
        counts
    }

    pub(crate) fn into_slots(self) -> Vec<Slot> {
        self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(start: usize) -> Signal {
        Signal::new(start, AudioBuffer::from_mono(vec![0.5; 8], 8_000))
    }

    #[test]
    fn arena_order_is_topological() {
        let mut g = MixGraph::new(8_000);
        let a = g.source(tone(0));
        let b = g.gain(a, GainAutomation::constant(0.5));
        let c = g.pan(b, -0.15);
        let d = g.delay(b, 0.0006);
        let bus = g.bus(&[c, d], 2);
        assert_eq!(g.root(), Some(bus));
        for i in 0..g.len() {
            let id = NodeId(i);
            assert!(g.inputs(id).iter().all(|input| *input < id));
        }
    }

    #[test]
    fn counts_consumers() {
        let mut g = MixGraph::new(8_000);
        let a = g.source(tone(0));
        let b = g.gain(a, GainAutomation::constant(1.0));
        let c = g.pan(b, 0.5);
        let d = g.pan(b, -0.5);
        g.bus(&[c, d, a], 2);
        assert_eq!(g.consumer_counts(), vec![2, 2, 1, 1, 0]);
    }

    #[test]
    fn parameters_are_clamped() {
        let mut g = MixGraph::new(8_000);
        let a = g.source(tone(4));
        let p = g.pan(a, 3.0);
        let d = g.delay(p, -1.0);
        assert!(matches!(g.node(p), Some(Node::Pan(v)) if *v == 1.0));
        assert!(matches!(g.node(d), Some(Node::Delay(v)) if *v == 0.0));
        assert_eq!(tone(4).end(), 12);
    }

    #[test]
    fn empty_graph_has_no_root() {
        let g = MixGraph::new(8_000);
        assert!(g.is_empty());
        assert_eq!(g.root(), None);
    }
}
