//! Timeline planning: where each section sits on the render timeline, how
//! deep the background ducks under it, and the resulting bed gain curve.

use serde::Serialize;

use crate::config::{BedConfig, RenderConfig, TimingConfig};
use crate::dsp::automation::GainAutomation;
use crate::error::{RenderError, Result};
use crate::script::{Ambience, ScriptSection, SectionKind, validate_sections};

/// Weight given to a section whose text length is unknown.
const DEFAULT_WEIGHT: usize = 100;

/// One section placed on the render timeline (seconds).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub start: f64,
    /// End of the section's speech; `[speech_end, end)` is its pause.
    pub speech_end: f64,
    pub end: f64,
    pub ambience: Ambience,
    pub kind: SectionKind,
    /// Background gain while this section's speech plays.
    pub duck_gain: f64,
    /// Where this section's speech begins inside the narration.
    pub narration_offset: f64,
}

impl TimelineEvent {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn speech_duration(&self) -> f64 {
        self.speech_end - self.start
    }

    pub fn pause(&self) -> f64 {
        self.end - self.speech_end
    }
}

/// The planned render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
    pub lead_in: f64,
    pub narration_duration: f64,
    /// End of the last section; the closing bowl strikes here.
    pub program_end: f64,
    /// Length of the whole render.
    pub total: f64,
    /// Background bed gain over the whole render.
    pub bed_gain: GainAutomation,
}

impl Timeline {
    /// Lay `sections` out around a narration of `narration_duration` seconds.
    pub fn plan(
        sections: &[ScriptSection],
        narration_duration: f64,
        config: &RenderConfig,
    ) -> Result<Timeline> {
        if !narration_duration.is_finite() || narration_duration <= 0.0 {
            return Err(RenderError::InvalidDuration(narration_duration));
        }
        validate_sections(sections)?;

        let timing = &config.timing;
        let implicit;
        let sections = if sections.is_empty() {
            implicit = [ScriptSection::new(SectionKind::Visualization, 0, 0.0, Ambience::Forest)];
            &implicit[..]
        } else {
            sections
        };

        let events = place_sections(sections, narration_duration, timing.lead_in, &config.bed);
        let program_end = events.last().map_or(timing.lead_in, |e| e.end);
        let total = program_end + timing.outro_bowl + timing.fade_tail;
        if !total.is_finite() || total <= 0.0 {
            return Err(RenderError::InvalidDuration(total));
        }

        let bed_gain = duck_schedule(&events, timing, &config.bed, program_end, total);
        tracing::debug!(
            sections = events.len(),
            narration_duration,
            program_end,
            total,
            automation_events = bed_gain.events().len(),
            "planned timeline"
        );

        Ok(Timeline {
            events,
            lead_in: timing.lead_in,
            narration_duration,
            program_end,
            total,
            bed_gain,
        })
    }

    /// Boundaries between consecutive sections, with the 1-based index of
    /// the section that starts there.
    pub fn boundaries(&self) -> impl Iterator<Item = (usize, &TimelineEvent, &TimelineEvent)> {
        self.events
            .windows(2)
            .enumerate()
            .map(|(i, pair)| (i + 1, &pair[0], &pair[1]))
    }

    /// Time the last section's speech ends.
    pub fn speech_end(&self) -> f64 {
        self.events.last().map_or(self.lead_in, |e| e.speech_end)
    }
}

fn place_sections(
    sections: &[ScriptSection],
    narration_duration: f64,
    lead_in: f64,
    bed: &BedConfig,
) -> Vec<TimelineEvent> {
    let weight = |s: &ScriptSection| {
        if s.text_length == 0 { DEFAULT_WEIGHT } else { s.text_length }
    };
    let total_weight: usize = sections.iter().map(weight).sum();

    let mut cursor = lead_in;
    let mut offset = 0.0;
    sections
        .iter()
        .map(|section| {
            let share = narration_duration * weight(section) as f64 / total_weight as f64;
            let event = TimelineEvent {
                start: cursor,
                speech_end: cursor + share,
                end: cursor + share + section.pause_seconds,
                ambience: section.ambience,
                kind: section.kind,
                duck_gain: bed.duck.for_kind(section.kind),
                narration_offset: offset,
            };
            cursor = event.end;
            offset += share;
            event
        })
        .collect()
}

/// Bed level during a long pause after `current`, before `next`.
pub fn pause_lift(current: f64, next: f64, bed: &BedConfig) -> f64 {
    let lift = (bed.base_gain * bed.lift_ratio).min(current * bed.lift_duck_multiple);
    let floor = current.max(next);
    lift.max(floor).min(bed.base_gain)
}

fn duck_schedule(
    events: &[TimelineEvent],
    timing: &TimingConfig,
    bed: &BedConfig,
    program_end: f64,
    total: f64,
) -> GainAutomation {
    let base = bed.base_gain;
    let mut curve = GainAutomation::new(0.0);
    curve.set_value_at(0.0, 0.0);

    let first = events.first().map_or(base, |e| e.duck_gain);
    curve
        .linear_ramp_to(base, (timing.lead_in - bed.duck_ramp).max(0.0))
        .exponential_ramp_to(first, timing.lead_in);

    for pair in events.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        if current.pause() > bed.lift_min_pause {
            let lift = pause_lift(current.duck_gain, next.duck_gain, bed);
            curve
                .set_value_at(current.duck_gain, current.speech_end)
                .exponential_ramp_to(lift, current.speech_end + bed.lift_ramp)
                .set_value_at(lift, current.end - bed.lift_ramp)
                .exponential_ramp_to(next.duck_gain, current.end);
        } else {
            let ramp_start = (current.end - bed.duck_ramp).max(current.start);
            curve
                .set_value_at(current.duck_gain, ramp_start)
                .exponential_ramp_to(next.duck_gain, current.end);
        }
    }

    let last = events.last().map_or(base, |e| e.duck_gain);
    let fade_start = (total - timing.fade_tail).max(program_end);
    curve
        .set_value_at(last, program_end)
        .exponential_ramp_to(base, (program_end + bed.recovery).min(fade_start))
        .set_value_at(base, fade_start)
        .linear_ramp_to(0.0, total);
    curve
}
