//! Procedural sound library. Every generator is a pure function of its
//! parameters and the caller's RNG.

pub mod ambience;
pub mod bowl;
pub mod breath;
pub mod chime;
pub mod entrainment;
pub mod impulse;
pub mod noise;

pub use ambience::ambience_bed;
pub use bowl::singing_bowl;
pub use breath::breathing_guide;
pub use chime::transition_chime;
pub use entrainment::{binaural_pair, isochronic_tone};
pub use impulse::reverb_ir;
pub use noise::fallback_bed;
