//! DSP primitives: buffers, filters, dynamics, delay, convolution and the
//! offline graph engine.
//!
//! Everything here is deterministic and allocation-light; the procedural
//! sources that feed it live in [`crate::synth`].

pub mod automation;
pub mod buffer;
pub mod compressor;
pub mod crossfade;
pub mod delay;
pub mod engine;
pub mod filter;
pub mod mixer;
pub mod oscillator;
pub mod pcm;
pub mod reverb;
