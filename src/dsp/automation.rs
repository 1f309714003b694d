//! Gain automation curves with Web Audio `AudioParam` semantics.
//!
//! A curve is a time-sorted list of events. A ramp event describes the
//! segment that *ends* at its time, starting from the previous event's time
//! and value. Before the first event the curve holds its initial value, after
//! the last event it holds the last value.

use serde::Serialize;

/// One scheduled change of the parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AutomationEvent {
    /// Jump to `value` at `time`.
    SetValue { time: f64, value: f64 },
    /// Linear ramp from the previous event, reaching `value` at `time`.
    LinearRamp { time: f64, value: f64 },
    /// Exponential ramp from the previous event, reaching `value` at `time`.
    /// If either endpoint is not strictly positive the previous value holds
    /// until `time` instead.
    ExponentialRamp { time: f64, value: f64 },
}

impl AutomationEvent {
    pub fn time(&self) -> f64 {
        match *self {
            AutomationEvent::SetValue { time, .. }
            | AutomationEvent::LinearRamp { time, .. }
            | AutomationEvent::ExponentialRamp { time, .. } => time,
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            AutomationEvent::SetValue { value, .. }
            | AutomationEvent::LinearRamp { value, .. }
            | AutomationEvent::ExponentialRamp { value, .. } => value,
        }
    }
}

/// A gain curve evaluated on the absolute render timeline (seconds).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GainAutomation {
    initial: f64,
    events: Vec<AutomationEvent>,
}

impl GainAutomation {
    pub fn new(initial: f64) -> Self {
        GainAutomation {
            initial,
            events: Vec::new(),
        }
    }

    /// A flat curve.
    pub fn constant(value: f64) -> Self {
        Self::new(value)
    }

    /// Linear fade in from 0 to `level` over `[start, start + fade_in]`,
    /// hold, then linear fade out to 0 over `[end - fade_out, end]`.
    ///
    /// Fades longer than half the span are shortened to fit.
    pub fn trapezoid(level: f64, start: f64, fade_in: f64, end: f64, fade_out: f64) -> Self {
        let span = (end - start).max(0.0);
        let fade_in = fade_in.clamp(0.0, span / 2.0);
        let fade_out = fade_out.clamp(0.0, span / 2.0);
        let mut curve = Self::new(0.0);
        curve
            .set_value_at(0.0, start)
            .linear_ramp_to(level, start + fade_in)
            .set_value_at(level, end - fade_out)
            .linear_ramp_to(0.0, end);
        curve
    }

    fn insert(&mut self, event: AutomationEvent) -> &mut Self {
        let t = event.time();
        if !t.is_finite() || !event.value().is_finite() {
            tracing::debug!(?event, "ignoring non-finite automation event");
            return self;
        }
        // events at equal times keep insertion order
        let at = self.events.partition_point(|e| e.time() <= t);
        self.events.insert(at, event);
        self
    }

    pub fn set_value_at(&mut self, value: f64, time: f64) -> &mut Self {
        self.insert(AutomationEvent::SetValue { time, value })
    }

    pub fn linear_ramp_to(&mut self, value: f64, time: f64) -> &mut Self {
        self.insert(AutomationEvent::LinearRamp { time, value })
    }

    pub fn exponential_ramp_to(&mut self, value: f64, time: f64) -> &mut Self {
        self.insert(AutomationEvent::ExponentialRamp { time, value })
    }

    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    /// Value of the curve at time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        let idx = self.events.partition_point(|e| e.time() <= t);
        if idx == self.events.len() {
            return self.events.last().map_or(self.initial, AutomationEvent::value);
        }

        let (t0, v0) = match idx {
            0 => (0.0_f64.min(t), self.initial),
            _ => {
                let prev = &self.events[idx - 1];
                (prev.time(), prev.value())
            }
        };
        let next = self.events[idx];
        let t1 = next.time();
        if t1 <= t0 {
            return v0;
        }
        let p = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);

        match next {
            AutomationEvent::SetValue { .. } => v0,
            AutomationEvent::LinearRamp { value, .. } => v0 + (value - v0) * p,
            AutomationEvent::ExponentialRamp { value, .. } => {
                if v0 <= 0.0 || value <= 0.0 {
                    v0
                } else {
                    v0 * (value / v0).powf(p)
                }
            }
        }
    }

    /// Multiply `samples` (positioned at `start_frame`) by the curve.
    pub fn apply(&self, start_frame: usize, sample_rate: u32, samples: &mut [f32]) {
        let sr = sample_rate as f64;
        if self.events.is_empty() {
            let g = self.initial as f32;
            samples.iter_mut().for_each(|s| *s *= g);
            return;
        }
        for (i, s) in samples.iter_mut().enumerate() {
            *s *= self.value_at((start_frame + i) as f64 / sr) as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_initial_before_events() {
        let mut g = GainAutomation::new(0.3);
        g.set_value_at(1.0, 2.0);
        assert_eq!(g.value_at(0.0), 0.3);
        assert_eq!(g.value_at(1.99), 0.3);
        assert_eq!(g.value_at(2.0), 1.0);
        assert_eq!(g.value_at(100.0), 1.0);
    }

    #[test]
    fn linear_ramp_midpoint() {
        let mut g = GainAutomation::new(0.0);
        g.set_value_at(0.0, 1.0).linear_ramp_to(1.0, 3.0);
        assert!((g.value_at(2.0) - 0.5).abs() < 1e-12);
        assert_eq!(g.value_at(3.0), 1.0);
    }

    #[test]
    fn exponential_ramp_geometric_midpoint() {
        let mut g = GainAutomation::new(0.0);
        g.set_value_at(0.18, 0.0).exponential_ramp_to(0.02, 2.0);
        let mid = g.value_at(1.0);
        assert!((mid - (0.18_f64 * 0.02).sqrt()).abs() < 1e-9, "got {mid}");
    }

    #[test]
    fn exponential_from_zero_holds() {
        let mut g = GainAutomation::new(0.0);
        g.exponential_ramp_to(1.0, 2.0);
        assert_eq!(g.value_at(1.0), 0.0);
        assert_eq!(g.value_at(2.0), 1.0);
    }

    #[test]
    fn out_of_order_inserts_sort() {
        let mut g = GainAutomation::new(0.0);
        g.linear_ramp_to(1.0, 4.0).set_value_at(0.0, 2.0);
        let times: Vec<f64> = g.events().iter().map(|e| e.time()).collect();
        assert_eq!(times, vec![2.0, 4.0]);
        assert!((g.value_at(3.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn trapezoid_shape() {
        let g = GainAutomation::trapezoid(0.5, 1.0, 1.0, 10.0, 2.0);
        assert_eq!(g.value_at(0.5), 0.0);
        assert!((g.value_at(1.5) - 0.25).abs() < 1e-12);
        assert_eq!(g.value_at(5.0), 0.5);
        assert!((g.value_at(9.0) - 0.25).abs() < 1e-12);
        assert_eq!(g.value_at(10.0), 0.0);
    }

    #[test]
    fn trapezoid_short_span_shrinks_fades() {
        let g = GainAutomation::trapezoid(1.0, 0.0, 3.0, 2.0, 3.0);
        assert!((g.value_at(1.0) - 1.0).abs() < 1e-12, "peak reached at the center");
    }

    #[test]
    fn apply_scales_by_curve() {
        let mut g = GainAutomation::new(0.0);
        g.set_value_at(0.0, 0.0).linear_ramp_to(1.0, 1.0);
        let mut samples = vec![1.0_f32; 11];
        g.apply(0, 10, &mut samples);
        assert_eq!(samples[0], 0.0);
        assert!((samples[5] - 0.5).abs() < 1e-6);
        assert_eq!(samples[10], 1.0);
    }
}
