//! Render configuration.
//!
//! Every constant the engine uses lives here with its production default, so
//! a caller can override any subset from JSON without touching the rest.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dsp::pcm::DEFAULT_NARRATION_RATE;
use crate::error::{RenderError, Result};
use crate::script::SectionKind;

/// Top-level configuration for a single render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Nominal sample rate of raw narration PCM from the speech service.
    pub narration_rate: u32,
    /// Seed for all procedural generators. `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub timing: TimingConfig,
    pub bed: BedConfig,
    pub voice: VoiceConfig,
    pub entrainment: EntrainmentConfig,
    pub mastering: MasteringConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            narration_rate: DEFAULT_NARRATION_RATE,
            seed: None,
            timing: TimingConfig::default(),
            bed: BedConfig::default(),
            voice: VoiceConfig::default(),
            entrainment: EntrainmentConfig::default(),
            mastering: MasteringConfig::default(),
        }
    }
}

impl RenderConfig {
    /// Parse a (possibly partial) JSON override on top of the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Fixed landmarks of the render timeline, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Silence plus intro bowl before the narration starts.
    pub lead_in: f64,
    pub intro_bowl: f64,
    pub outro_bowl: f64,
    /// Final fade of every layer still sounding.
    pub fade_tail: f64,
    /// Overlap between consecutive ambience beds.
    pub ambience_crossfade: f64,
    /// Fade-in of the first ambience bed.
    pub ambience_first_fade_in: f64,
    pub chime_duration: f64,
    /// How far before a section boundary its chime starts.
    pub chime_lead: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            lead_in: 5.0,
            intro_bowl: 8.0,
            outro_bowl: 8.0,
            fade_tail: 5.0,
            ambience_crossfade: 2.0,
            ambience_first_fade_in: 3.0,
            chime_duration: 2.5,
            chime_lead: 0.5,
        }
    }
}

/// Background music bed and its ducking policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BedConfig {
    /// Un-ducked bed gain.
    pub base_gain: f64,
    pub duck: DuckDepths,
    /// Pause lift target as a fraction of `base_gain`.
    pub lift_ratio: f64,
    /// Pause lift never exceeds this multiple of the section's duck depth.
    pub lift_duck_multiple: f64,
    /// Pauses shorter than this get no lift.
    pub lift_min_pause: f64,
    /// Ramp time into and out of a pause lift.
    pub lift_ramp: f64,
    /// Ramp time between duck depths.
    pub duck_ramp: f64,
    /// Ramp back to base once the narration is over.
    pub recovery: f64,
    /// Crossfade at each loop seam when extending a short clip.
    pub loop_crossfade: f64,
    /// Upper bound on background acquisition.
    pub fetch_timeout_secs: f64,
}

impl Default for BedConfig {
    fn default() -> Self {
        Self {
            base_gain: 0.18,
            duck: DuckDepths::default(),
            lift_ratio: 0.6,
            lift_duck_multiple: 3.0,
            lift_min_pause: 2.0,
            lift_ramp: 1.0,
            duck_ramp: 0.8,
            recovery: 3.0,
            loop_crossfade: 2.0,
            fetch_timeout_secs: 15.0,
        }
    }
}

impl BedConfig {
    /// `fetch_timeout_secs` as a [`Duration`]; negative, NaN or overflowing
    /// values are a config error.
    pub fn fetch_timeout(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.fetch_timeout_secs)
            .map_err(|e| RenderError::Config(format!("fetch_timeout_secs {}: {e}", self.fetch_timeout_secs)))
    }
}

/// Ducked bed gain per section kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckDepths {
    /// Breathing sections leave room for the bed between cues.
    pub shallow: f64,
    /// Body scan and visualization want a near-silent bed.
    pub deep: f64,
    /// Intro and outro.
    pub medium: f64,
    pub default: f64,
}

impl Default for DuckDepths {
    fn default() -> Self {
        Self {
            shallow: 0.10,
            deep: 0.04,
            medium: 0.07,
            default: 0.05,
        }
    }
}

impl DuckDepths {
    pub fn for_kind(&self, kind: SectionKind) -> f64 {
        match kind {
            SectionKind::Breathing => self.shallow,
            SectionKind::BodyScan | SectionKind::Visualization => self.deep,
            SectionKind::Intro | SectionKind::Outro => self.medium,
            SectionKind::Silence => self.default,
        }
    }
}

/// Narration processing chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub gain: f64,
    /// Wet share of the reverb send.
    pub reverb_mix: f64,
    pub reverb_seconds: f64,
    pub reverb_decay: f64,
    pub warmth_frequency: f64,
    pub warmth_db: f64,
    pub de_ess_frequency: f64,
    pub de_ess_q: f64,
    /// Level of the compressed sibilance band when recombined.
    pub de_ess_band_gain: f64,
    pub de_ess: CompressorConfig,
    /// Right-channel delay for Haas widening.
    pub haas_delay: f64,
    /// Extra attenuation on the delayed side.
    pub haas_gain: f64,
    /// Pan offset of each dry side from center.
    pub pan_spread: f64,
    pub fade_in: f64,
    pub fade_out: f64,
    /// Ramp applied at every cut when narration is laid out per section.
    pub declick: f64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            gain: 0.85,
            reverb_mix: 0.15,
            reverb_seconds: 2.5,
            reverb_decay: 2.0,
            warmth_frequency: 300.0,
            warmth_db: 3.0,
            de_ess_frequency: 5800.0,
            de_ess_q: 1.5,
            de_ess_band_gain: 0.4,
            de_ess: CompressorConfig {
                threshold: -30.0,
                knee: 6.0,
                ratio: 8.0,
                attack: 0.003,
                release: 0.05,
                makeup_gain: 0.0,
            },
            haas_delay: 0.0006,
            haas_gain: 0.95,
            pan_spread: 0.15,
            fade_in: 0.8,
            fade_out: 1.5,
            declick: 0.01,
        }
    }
}

/// Binaural and isochronic layers, one entry per third of the render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntrainmentConfig {
    pub binaural_carrier: f64,
    /// Difference frequency per third (alpha, theta, deep theta).
    pub beat_rates: [f64; 3],
    pub binaural_gain: f64,
    pub binaural_fade: f64,
    pub isochronic_carriers: [f64; 3],
    pub isochronic_gain: f64,
    pub isochronic_fade: f64,
    pub breathing_frequency: f64,
    pub breathing_gain: f64,
    /// Breathing sections at most this long get no breathing guide.
    pub breathing_min_duration: f64,
}

impl Default for EntrainmentConfig {
    fn default() -> Self {
        Self {
            binaural_carrier: 180.0,
            beat_rates: [10.0, 6.0, 4.0],
            binaural_gain: 0.025,
            binaural_fade: 3.0,
            isochronic_carriers: [400.0, 380.0, 360.0],
            isochronic_gain: 0.015,
            isochronic_fade: 4.0,
            breathing_frequency: 160.0,
            breathing_gain: 0.6,
            breathing_min_duration: 2.0,
        }
    }
}

/// Master bus, loudness target and output encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteringConfig {
    pub limiter: CompressorConfig,
    pub target_lufs: f64,
    /// Maximum loudness correction in either direction.
    pub max_gain_db: f64,
    /// Bitrate requested from a compressed encoder.
    pub compressed_bitrate: u32,
}

impl Default for MasteringConfig {
    fn default() -> Self {
        Self {
            limiter: CompressorConfig {
                threshold: -3.0,
                knee: 6.0,
                ratio: 12.0,
                attack: 0.003,
                release: 0.25,
                makeup_gain: 0.0,
            },
            target_lufs: -16.0,
            max_gain_db: 12.0,
            compressed_bitrate: 128_000,
        }
    }
}

/// Configuration for a feed-forward compressor / limiter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    /// Threshold in dB.
    pub threshold: f64,
    /// Knee width in dB.
    pub knee: f64,
    /// Compression ratio.
    pub ratio: f64,
    /// Attack time in seconds.
    pub attack: f64,
    /// Release time in seconds.
    pub release: f64,
    /// Makeup gain in dB.
    pub makeup_gain: f64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            threshold: -24.0,
            knee: 6.0,
            ratio: 4.0,
            attack: 0.003,
            release: 0.25,
            makeup_gain: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = RenderConfig::from_json(r#"{ "sample_rate": 48000, "bed": { "base_gain": 0.2 } }"#)
            .expect("valid config");
        assert_eq!(cfg.sample_rate, 48_000);
        assert!((cfg.bed.base_gain - 0.2).abs() < 1e-12);
        assert!((cfg.bed.duck.deep - 0.04).abs() < 1e-12, "untouched fields keep defaults");
        assert_eq!(cfg.timing, TimingConfig::default());
    }

    #[test]
    fn duck_depth_policy() {
        let d = DuckDepths::default();
        assert!(d.for_kind(SectionKind::Breathing) > d.for_kind(SectionKind::Intro));
        assert!(d.for_kind(SectionKind::Intro) > d.for_kind(SectionKind::Silence));
        assert!(d.for_kind(SectionKind::Silence) > d.for_kind(SectionKind::BodyScan));
        assert_eq!(
            d.for_kind(SectionKind::Visualization),
            d.for_kind(SectionKind::BodyScan)
        );
    }

    #[test]
    fn narration_rate_defaults_to_speech_service_rate() {
        assert_eq!(RenderConfig::default().narration_rate, DEFAULT_NARRATION_RATE);
    }

    #[test]
    fn fetch_timeout_rejects_unrepresentable_values() {
        let mut bed = BedConfig::default();
        assert_eq!(bed.fetch_timeout().expect("default"), Duration::from_secs(15));
        for bad in [-1.0, f64::NAN, f64::INFINITY, 1e300] {
            bed.fetch_timeout_secs = bad;
            assert!(
                matches!(bed.fetch_timeout(), Err(RenderError::Config(_))),
                "{bad} should be a config error"
            );
        }
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(RenderConfig::from_json("{ not json").is_err());
    }
}
