//! Procedural ambience beds, one texture per biome.

use std::f64::consts::PI;

use rand::Rng;

use super::noise::{OnePole, ThreePolePink, white};
use crate::dsp::buffer::{AudioBuffer, frames_for};
use crate::script::Ambience;

/// Render `duration` seconds of stereo ambience for `ambience`.
pub fn ambience_bed<R: Rng + ?Sized>(
    ambience: Ambience,
    duration: f64,
    sample_rate: u32,
    rng: &mut R,
) -> AudioBuffer {
    let frames = frames_for(duration, sample_rate);
    let sr = sample_rate as f64;
    let channels: Vec<Vec<f32>> = match ambience {
        Ambience::Rain => (0..2).map(|ch| rain(ch, frames, sr, rng)).collect(),
        Ambience::Ocean => (0..2).map(|ch| ocean(ch, frames, sr, rng)).collect(),
        Ambience::Forest => forest(frames, duration, sr, rng),
        Ambience::Fire => (0..2).map(|_| fire(frames, sr, rng)).collect(),
        Ambience::Space => (0..2).map(|ch| space(ch, frames, sr)).collect(),
        Ambience::Silence => (0..2).map(|_| floor(frames, rng)).collect(),
    };
    AudioBuffer::from_channels(channels, sample_rate)
}

fn rain<R: Rng + ?Sized>(ch: usize, frames: usize, sr: f64, rng: &mut R) -> Vec<f32> {
    let period = 40.0 + 7.0 * ch as f64;
    let side = if ch == 0 { 0.1 } else { -0.1 };
    let mut lp = OnePole::default();

    (0..frames)
        .map(|i| {
            let t = i as f64 / sr;
            let intensity = 0.5 + 0.5 * (2.0 * PI * t / period).sin();
            let drop_probability = 0.001 + 0.004 * intensity;
            let drop = if rng.r#gen::<f64>() < drop_probability {
                rng.r#gen::<f64>() * 0.4 * intensity
            } else {
                0.0
            };
            let y = lp.process(white(rng) + drop, 0.96 + 0.02 * intensity);
            let jitter = 1.0 + side * (t * 0.3).sin();
            (y * 0.04 * jitter) as f32
        })
        .collect()
}

const SWELL_PERIODS: [f64; 3] = [7.3, 11.7, 19.1];

/// Summed swell envelope in `[0, 1]` for one channel at time `t`.
fn swell(t: f64, ch: usize) -> f64 {
    let sum: f64 = SWELL_PERIODS
        .iter()
        .enumerate()
        .map(|(w, period)| {
            let x = ((t + ch as f64 * 0.4 + w as f64 * 2.3) / period).fract();
            let shape = if x < 0.3 {
                (x / 0.3).powf(0.7)
            } else {
                (1.0 - (x - 0.3) / 0.7).powf(1.5)
            };
            shape / (w + 1) as f64
        })
        .sum();
    (sum / 1.5).min(1.0)
}

fn ocean<R: Rng + ?Sized>(ch: usize, frames: usize, sr: f64, rng: &mut R) -> Vec<f32> {
    let mut lp = OnePole::default();
    (0..frames)
        .map(|i| {
            let envelope = swell(i as f64 / sr, ch);
            let brightness = 0.7 + 0.3 * envelope;
            // high water opens the filter
            let y = lp.process(white(rng), 1.0 - brightness);
            (y * envelope * brightness * 0.035) as f32
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Motif {
    Chirp,
    Call,
    Trill,
}

#[derive(Debug, Clone, Copy)]
struct Bird {
    time: f64,
    frequency: f64,
    pan: f64,
    motif: Motif,
}

const BIRD_LENGTH: f64 = 1.5;
const BIRD_GAIN: f64 = 0.012;

fn bird_schedule<R: Rng + ?Sized>(duration: f64, rng: &mut R) -> Vec<Bird> {
    let mut birds = Vec::new();
    let mut time = 2.0 + rng.r#gen::<f64>() * 5.0;
    while time < duration - 2.0 {
        let motif = match rng.gen_range(0..3) {
            0 => Motif::Chirp,
            1 => Motif::Call,
            _ => Motif::Trill,
        };
        birds.push(Bird {
            time,
            frequency: 1800.0 + rng.r#gen::<f64>() * 1200.0,
            pan: (rng.r#gen::<f64>() - 0.5) * 1.2,
            motif,
        });
        time += 3.0 - (1.0 - rng.r#gen::<f64>()).ln() * 8.0;
    }
    birds
}

fn bird_sample(bird: &Bird, dt: f64) -> f64 {
    let envelope = (-dt * 4.0).exp() * (1.0 - (-dt * 30.0).exp());
    let f = bird.frequency;
    let voice = match bird.motif {
        Motif::Chirp => (2.0 * PI * f * (1.0 + 0.3 * (-dt * 8.0).exp()) * dt).sin(),
        Motif::Call => {
            let first = if dt < 0.3 { (2.0 * PI * f * dt).sin() } else { 0.0 };
            let second = if dt > 0.5 && dt < 0.8 {
                (2.0 * PI * f * 1.2 * (dt - 0.5)).sin()
            } else {
                0.0
            };
            first + second
        }
        Motif::Trill => (2.0 * PI * f * dt).sin() * (2.0 * PI * 25.0 * dt).sin(),
    };
    voice * envelope
}

fn forest<R: Rng + ?Sized>(frames: usize, duration: f64, sr: f64, rng: &mut R) -> Vec<Vec<f32>> {
    let birds = bird_schedule(duration, rng);
    let mut channels = Vec::with_capacity(2);

    for ch in 0..2 {
        let mut wind = OnePole::default();
        let mut data: Vec<f32> = (0..frames)
            .map(|i| {
                let t = i as f64 / sr;
                let gust = 0.7 + 0.3 * (2.0 * PI * t / 23.0).sin() * (2.0 * PI * t / 37.0).sin();
                (wind.process(white(rng), 0.995) * 0.03 * gust) as f32
            })
            .collect();

        for bird in &birds {
            let gain = if ch == 0 { (1.0 - bird.pan).max(0.0) } else { (1.0 + bird.pan).max(0.0) };
            let start = (bird.time * sr).ceil() as usize;
            let end = (((bird.time + BIRD_LENGTH) * sr).floor() as usize + 1).min(frames);
            for (i, s) in data.iter_mut().enumerate().take(end).skip(start) {
                let dt = i as f64 / sr - bird.time;
                *s += (bird_sample(bird, dt) * gain * BIRD_GAIN) as f32;
            }
        }
        channels.push(data);
    }
    channels
}

const CRACKLES_PER_SECOND: f64 = 30.0;
const THUDS_PER_SECOND: f64 = 0.02;
const THUD_LENGTH: usize = 1000;

fn fire<R: Rng + ?Sized>(frames: usize, sr: f64, rng: &mut R) -> Vec<f32> {
    let mut warm = OnePole::default();
    let mut thuds = vec![0.0_f64; frames];
    let mut data = Vec::with_capacity(frames);

    for i in 0..frames {
        let t = i as f64 / sr;
        let breathe = 0.7 + 0.3 * (2.0 * PI * t / 8.0).sin() * (2.0 * PI * t / 13.0).sin();
        let mut sample = warm.process(white(rng), 0.98) * 0.025 * breathe;

        if rng.r#gen::<f64>() < CRACKLES_PER_SECOND / sr {
            let strength = 0.5 + 0.5 * rng.r#gen::<f64>();
            let spread = 0.7 + 0.3 * rng.r#gen::<f64>();
            sample += white(rng) * 0.08 * strength * spread;
        }

        if rng.r#gen::<f64>() < THUDS_PER_SECOND / sr {
            for (j, thud) in thuds[i..].iter_mut().take(THUD_LENGTH).enumerate() {
                let tj = j as f64 / sr;
                *thud += (2.0 * PI * 80.0 * tj).sin() * (-tj * 10.0).exp() * 0.02;
            }
        }

        data.push((sample + thuds[i]) as f32);
    }
    data
}

fn space(ch: usize, frames: usize, sr: f64) -> Vec<f32> {
    let sparkle_cycle = 17.0 + 7.0 * ch as f64;
    (0..frames)
        .map(|i| {
            let t = i as f64 / sr;
            let drift = (2.0 * PI * 0.02 * t).sin() * 5.0;
            let low = (2.0 * PI * (60.0 + drift) * t).sin() * 0.008;
            let mid = (2.0 * PI * (90.0 + drift * 0.7 + ch as f64 * 2.0) * t).sin() * 0.006;
            let pulse = (1.0 + (2.0 * PI * 0.03 * t).sin()) * 0.5;
            let high = (2.0 * PI * (120.0 + drift * 0.5) * t).sin() * 0.004 * pulse;

            let phase = (t % sparkle_cycle) / sparkle_cycle;
            let sparkle = if phase > 0.96 && phase < 0.99 {
                let sp = (phase - 0.96) / 0.03;
                (2.0 * PI * 3000.0 * t).sin() * (-sp * 15.0).exp() * 0.003
            } else {
                0.0
            };
            (low + mid + high + sparkle) as f32
        })
        .collect()
}

fn floor<R: Rng + ?Sized>(frames: usize, rng: &mut R) -> Vec<f32> {
    let mut pink = ThreePolePink::default();
    (0..frames).map(|_| (pink.next(rng) * 0.002) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const ALL: [Ambience; 6] = [
        Ambience::Forest,
        Ambience::Rain,
        Ambience::Ocean,
        Ambience::Fire,
        Ambience::Space,
        Ambience::Silence,
    ];

    #[test]
    fn every_biome_is_stereo_exact_and_quiet() {
        let mut rng = StdRng::seed_from_u64(21);
        for ambience in ALL {
            let bed = ambience_bed(ambience, 12.0, 8_000, &mut rng);
            assert_eq!(bed.frames(), 96_000, "{ambience:?} length");
            assert_eq!(bed.channel_count(), 2, "{ambience:?} channels");
            assert!(bed.peak() > 0.0, "{ambience:?} should not be silent");
            assert!(bed.peak() < 0.5, "{ambience:?} peak {}", bed.peak());
        }
    }

    #[test]
    fn seeded_beds_repeat() {
        let a = ambience_bed(Ambience::Forest, 10.0, 8_000, &mut StdRng::seed_from_u64(4));
        let b = ambience_bed(Ambience::Forest, 10.0, 8_000, &mut StdRng::seed_from_u64(4));
        assert_eq!(a, b);
    }

    #[test]
    fn swell_stays_normalized() {
        for i in 0..2000 {
            let t = i as f64 * 0.05;
            for ch in 0..2 {
                let s = swell(t, ch);
                assert!((0.0..=1.0).contains(&s), "swell {s} at {t}");
            }
        }
    }

    #[test]
    fn birds_arrive_in_window() {
        let mut rng = StdRng::seed_from_u64(8);
        let birds = bird_schedule(120.0, &mut rng);
        assert!(!birds.is_empty());
        assert!(birds[0].time >= 2.0 && birds[0].time < 7.0);
        for pair in birds.windows(2) {
            assert!(pair[1].time - pair[0].time >= 3.0, "birds at least 3 s apart");
        }
        for bird in &birds {
            assert!(bird.time < 118.0);
            assert!((1800.0..3000.0).contains(&bird.frequency));
            assert!(bird.pan.abs() <= 0.6);
        }
    }

    #[test]
    fn short_forest_has_no_birds() {
        let mut rng = StdRng::seed_from_u64(8);
        assert!(bird_schedule(3.0, &mut rng).is_empty());
    }

    #[test]
    fn space_is_deterministic_without_rng() {
        let a = ambience_bed(Ambience::Space, 1.0, 8_000, &mut StdRng::seed_from_u64(1));
        let b = ambience_bed(Ambience::Space, 1.0, 8_000, &mut StdRng::seed_from_u64(2));
        assert_eq!(a, b);
        assert_ne!(a.channel(0), a.channel(1), "right drone is detuned");
    }
}
