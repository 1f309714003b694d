//! Mix graph builder: turns a planned [`Timeline`] into a [`MixGraph`]
//! rooted at the master limiter.
//!
//! Layers are added one family at a time so the caller can report progress
//! between them, then [`MixBuilder::finish`] sums them into the limiter.

use std::sync::Arc;

use rand::Rng;

use crate::bed;
use crate::config::RenderConfig;
use crate::dsp::automation::GainAutomation;
use crate::dsp::buffer::AudioBuffer;
use crate::dsp::filter::FilterType;
use crate::dsp::pcm::{Narration, resample};
use crate::dsp::reverb::ConvolutionReverb;
use crate::graph::{FilterSpec, MixGraph, NodeId, Signal};
use crate::script::{Ambience, SectionKind};
use crate::synth::{self, chime};
use crate::timeline::Timeline;

pub const INTRO_BOWL_FREQUENCY: f64 = 220.0;
pub const INTRO_BOWL_GAIN: f64 = 0.9;
pub const OUTRO_BOWL_FREQUENCY: f64 = 330.0;
pub const OUTRO_BOWL_GAIN: f64 = 0.7;
pub const CHIME_GAIN: f64 = 0.5;

/// Nearest frame to `seconds`, never negative.
pub fn frame_at(seconds: f64, sample_rate: u32) -> usize {
    (seconds.max(0.0) * sample_rate as f64).round() as usize
}

/// Place each section's share of the narration at its window start, leaving
/// the pauses silent. Every cut gets a short linear ramp.
pub fn layout_narration(narration: &Narration, timeline: &Timeline, declick: f64, sample_rate: u32) -> Signal {
    let samples = if narration.sample_rate() == sample_rate {
        narration.samples().to_vec()
    } else {
        resample(narration.samples().to_vec(), narration.sample_rate(), sample_rate)
    };

    let origin = frame_at(timeline.lead_in, sample_rate);
    let end = frame_at(timeline.speech_end(), sample_rate).max(origin);
    let mut out = vec![0.0_f32; end - origin];
    let ramp = frame_at(declick, sample_rate);
    let events = &timeline.events;

    for (i, event) in events.iter().enumerate() {
        let src_start = frame_at(event.narration_offset, sample_rate).min(samples.len());
        let src_end = frame_at(event.narration_offset + event.speech_duration(), sample_rate).min(samples.len());
        let dst = frame_at(event.start, sample_rate).saturating_sub(origin);
        if src_start >= src_end || dst >= out.len() {
            continue;
        }
        let len = (src_end - src_start).min(out.len() - dst);
        let segment = &mut out[dst..dst + len];
        segment.copy_from_slice(&samples[src_start..src_start + len]);

        let cut_before = i == 0 || events[i - 1].pause() > 0.0;
        let cut_after = i + 1 == events.len() || event.pause() > 0.0;
        let ramp = ramp.min(len / 2);
        if ramp == 0 {
            continue;
        }
        for k in 0..ramp {
            let g = k as f32 / ramp as f32;
            if cut_before {
                segment[k] *= g;
            }
            if cut_after {
                segment[len - 1 - k] *= g;
            }
        }
    }

    Signal::new(origin, AudioBuffer::from_mono(out, sample_rate))
}

/// Incrementally assembles the mix graph for one render.
pub struct MixBuilder<'a, R: Rng + ?Sized> {
    graph: MixGraph,
    layers: Vec<NodeId>,
    timeline: &'a Timeline,
    config: &'a RenderConfig,
    rng: &'a mut R,
}

impl<'a, R: Rng + ?Sized> MixBuilder<'a, R> {
    pub fn new(timeline: &'a Timeline, config: &'a RenderConfig, rng: &'a mut R) -> Self {
        MixBuilder {
            graph: MixGraph::new(config.sample_rate),
            layers: Vec::new(),
            timeline,
            config,
            rng,
        }
    }

    fn rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// A source scaled by a constant gain, registered as a layer.
    fn add_layer(&mut self, at: f64, buffer: AudioBuffer, gain: f64) -> NodeId {
        let src = self.graph.source(Signal::new(frame_at(at, self.rate()), buffer));
        let node = self.graph.gain(src, GainAutomation::constant(gain));
        self.layers.push(node);
        node
    }

    /// Narration chain: warmth shelf, split-band de-esser, envelope, then
    /// dry, Haas-delayed and reverberant sends.
    pub fn add_narration(&mut self, narration: &Narration) -> &mut Self {
        let rate = self.rate();
        let (config, timeline) = (self.config, self.timeline);
        let voice = &config.voice;
        let signal = layout_narration(narration, timeline, voice.declick, rate);
        tracing::debug!(start = signal.start, frames = signal.buffer.frames(), "laid out narration");

        let src = self.graph.source(signal);
        let warm = self.graph.filter(
            src,
            FilterSpec {
                filter_type: FilterType::Lowshelf,
                frequency: voice.warmth_frequency,
                q: 0.707,
                gain_db: voice.warmth_db,
            },
        );
        let sibilance = |filter_type| FilterSpec {
            filter_type,
            frequency: voice.de_ess_frequency,
            q: voice.de_ess_q,
            gain_db: 0.0,
        };
        let band = self.graph.filter(warm, sibilance(FilterType::Bandpass));
        let band = self.graph.compressor(band, voice.de_ess);
        let band = self.graph.gain(band, GainAutomation::constant(voice.de_ess_band_gain));
        let rest = self.graph.filter(warm, sibilance(FilterType::Notch));
        let de_essed = self.graph.bus(&[band, rest], 1);

        let envelope = GainAutomation::trapezoid(
            1.0,
            timeline.lead_in,
            voice.fade_in,
            timeline.speech_end(),
            voice.fade_out,
        );
        let shaped = self.graph.gain(de_essed, envelope);

        let dry_gain = voice.gain * (1.0 - voice.reverb_mix);
        let dry = self.graph.gain(shaped, GainAutomation::constant(dry_gain));
        let dry = self.graph.pan(dry, -voice.pan_spread);

        let haas = self.graph.delay(shaped, voice.haas_delay);
        let haas = self.graph.gain(haas, GainAutomation::constant(dry_gain * voice.haas_gain));
        let haas = self.graph.pan(haas, voice.pan_spread);

        let ir = synth::reverb_ir(voice.reverb_seconds, voice.reverb_decay, rate, &mut *self.rng);
        let reverb = Arc::new(ConvolutionReverb::new(&ir, true));
        let wet = self.graph.convolver(shaped, reverb);
        let wet = self.graph.gain(wet, GainAutomation::constant(voice.gain * voice.reverb_mix));

        self.layers.extend([dry, haas, wet]);
        self
    }

    /// Background bed looped to the render length under the ducking curve.
    pub fn add_background(&mut self, clip: AudioBuffer) -> &mut Self {
        let clip = match bed::conform(clip, self.rate()) {
            Ok(clip) => clip,
            Err(e) => {
                tracing::warn!(error = %e, "background clip skipped");
                return self;
            }
        };
        let looped = bed::extend(&clip, self.timeline.total, self.config.bed.loop_crossfade);
        let src = self.graph.source(Signal::new(0, looped));
        let node = self.graph.gain(src, self.timeline.bed_gain.clone());
        self.layers.push(node);
        self
    }

    /// Opening and closing singing bowls.
    pub fn add_bowls(&mut self) -> &mut Self {
        let rate = self.rate();
        let timing = &self.config.timing;
        let program_end = self.timeline.program_end;
        let intro = synth::singing_bowl(timing.intro_bowl, INTRO_BOWL_FREQUENCY, rate, &mut *self.rng);
        let outro = synth::singing_bowl(timing.outro_bowl, OUTRO_BOWL_FREQUENCY, rate, &mut *self.rng);
        self.add_layer(0.0, intro, INTRO_BOWL_GAIN);
        self.add_layer(program_end, outro, OUTRO_BOWL_GAIN);
        self
    }

    /// One ambience bed per section, crossfading into the next.
    pub fn add_ambience(&mut self) -> &mut Self {
        let rate = self.rate();
        let (config, timeline) = (self.config, self.timeline);
        let timing = &config.timing;
        let events = &timeline.events;
        let total = timeline.total;

        for (i, event) in events.iter().enumerate() {
            let last = i + 1 == events.len();
            let (end, fade_out) = if last {
                (total, timing.fade_tail)
            } else {
                (event.end + timing.ambience_crossfade, timing.ambience_crossfade)
            };
            let fade_in = if i == 0 {
                timing.ambience_first_fade_in
            } else {
                timing.ambience_crossfade
            };

            let buffer = synth::ambience_bed(event.ambience, end - event.start, rate, &mut *self.rng);
            let src = self.graph.source(Signal::new(frame_at(event.start, rate), buffer));
            let envelope = GainAutomation::trapezoid(1.0, event.start, fade_in, end, fade_out);
            let node = self.graph.gain(src, envelope);
            self.layers.push(node);
            tracing::debug!(section = i, ambience = ?event.ambience, start = event.start, end, "ambience bed");
        }
        self
    }

    /// A chime at every internal boundary, skipped when leaving silence.
    pub fn add_chimes(&mut self) -> &mut Self {
        let rate = self.rate();
        let config = self.config;
        let timing = &config.timing;
        let boundaries: Vec<(usize, f64)> = self
            .timeline
            .boundaries()
            .filter(|(_, prev, _)| prev.ambience != Ambience::Silence)
            .map(|(i, _, next)| (i, next.start))
            .collect();

        for (index, at) in boundaries {
            let buffer = synth::transition_chime(timing.chime_duration, chime::boundary_frequency(index), rate);
            self.add_layer((at - timing.chime_lead).max(0.0), buffer, CHIME_GAIN);
        }
        self
    }

    /// Binaural and isochronic layers over three equal thirds of the render.
    pub fn add_entrainment(&mut self) -> &mut Self {
        let rate = self.rate();
        let config = self.config;
        let e = &config.entrainment;
        let total = self.timeline.total;
        let third = total / 3.0;

        for k in 0..3 {
            let start = third * k as f64;
            let duration = if k == 2 { total - 2.0 * third } else { third };
            let beat = e.beat_rates[k];
            let pair = synth::binaural_pair(duration, e.binaural_carrier, beat, e.binaural_gain, e.binaural_fade, rate);
            let pulse = synth::isochronic_tone(
                duration,
                e.isochronic_carriers[k],
                beat,
                e.isochronic_gain,
                e.isochronic_fade,
                rate,
            );
            self.add_layer(start, pair, 1.0);
            self.add_layer(start, pulse, 1.0);
        }
        self
    }

    /// Breathing guide under every long enough breathing section.
    pub fn add_breathing_guides(&mut self) -> &mut Self {
        let rate = self.rate();
        let config = self.config;
        let e = &config.entrainment;
        let windows: Vec<(f64, f64)> = self
            .timeline
            .events
            .iter()
            .filter(|ev| ev.kind == SectionKind::Breathing && ev.duration() > e.breathing_min_duration)
            .map(|ev| (ev.start, ev.duration()))
            .collect();

        for (start, duration) in windows {
            let guide = synth::breathing_guide(duration, e.breathing_frequency, rate);
            self.add_layer(start, guide, e.breathing_gain);
        }
        self
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Sum every layer into the master limiter.
    pub fn finish(self) -> MixGraph {
        let MixBuilder {
            mut graph,
            layers,
            config,
            ..
        } = self;
        let master = graph.bus(&layers, 2);
        graph.compressor(master, config.mastering.limiter);
        tracing::debug!(layers = layers.len(), nodes = graph.len(), "built mix graph");
        graph
    }
}
