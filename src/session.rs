//! Render session: one disposable value per render.
//!
//! The session owns the random generator and the progress callback, drives
//! the stages in order and is consumed by [`RenderSession::render`], so no
//! state can leak from one render into the next.

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::instrument;

use crate::config::RenderConfig;
use crate::dsp::buffer::{AudioBuffer, frames_for};
use crate::dsp::engine::AudioEngine;
use crate::bed;
use crate::dsp::pcm::Narration;
use crate::error::Result;
use crate::master::{self, AudioEncoder, LoudnessReport};
use crate::mix::MixBuilder;
use crate::script::{MeditationScript, ScriptSection, validate_sections};
use crate::synth;
use crate::timeline::Timeline;

/// Pipeline stage reported to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    VoiceProcessing,
    Entrainment,
    Ambience,
    Rendering,
    Mastering,
    Encoding,
    Complete,
}

impl Stage {
    pub fn percent(self) -> u8 {
        match self {
            Stage::VoiceProcessing => 30,
            Stage::Entrainment => 45,
            Stage::Ambience => 55,
            Stage::Rendering => 65,
            Stage::Mastering => 85,
            Stage::Encoding => 92,
            Stage::Complete => 100,
        }
    }
}

/// Everything one render consumes.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub narration: Narration,
    pub sections: Vec<ScriptSection>,
    pub title: String,
    /// Background clip at any rate; `None` uses the synthesized fallback.
    pub background: Option<AudioBuffer>,
}

impl RenderRequest {
    pub fn new(narration: Narration, sections: Vec<ScriptSection>) -> Self {
        RenderRequest {
            narration,
            sections,
            title: String::new(),
            background: None,
        }
    }

    /// Decode raw 16-bit narration at `source_rate` for a render at
    /// `config.sample_rate`.
    pub fn from_pcm16(
        pcm: &[u8],
        source_rate: u32,
        sections: Vec<ScriptSection>,
        config: &RenderConfig,
    ) -> Result<Self> {
        let narration = Narration::from_pcm16(pcm, source_rate, config.sample_rate)?;
        validate_sections(&sections)?;
        Ok(Self::new(narration, sections))
    }

    /// As [`from_pcm16`](Self::from_pcm16), taking sections and title from a
    /// script document.
    pub fn from_script(
        pcm: &[u8],
        source_rate: u32,
        script: &MeditationScript,
        config: &RenderConfig,
    ) -> Result<Self> {
        let request = Self::from_pcm16(pcm, source_rate, script.sections()?, config)?;
        Ok(request.with_title(script.title.clone()))
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_background(mut self, clip: AudioBuffer) -> Self {
        self.background = Some(clip);
        self
    }
}

/// Where the background bed of a render came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BedSource {
    /// The caller's clip, looped to length.
    Clip,
    /// The synthesized noise bed, used when no usable clip was supplied.
    Fallback,
}

/// The limited stereo mix before loudness normalization.
#[derive(Debug, Clone)]
pub struct Mixdown {
    pub buffer: AudioBuffer,
    pub bed: BedSource,
}

/// The finished, encoded meditation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedAsset {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub extension: String,
    pub file_name: String,
    /// Seconds.
    pub duration: f64,
    pub loudness: LoudnessReport,
    pub bed: BedSource,
}

type ProgressFn = Box<dyn FnMut(Stage, u8) + Send>;

pub struct RenderSession {
    config: RenderConfig,
    rng: StdRng,
    progress: Option<ProgressFn>,
    encoder: Option<Box<dyn AudioEncoder + Send>>,
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .field("encoder", &self.encoder.as_ref().map(|e| e.mime_type().to_string()))
            .finish()
    }
}

impl RenderSession {
    /// A fresh session. The generator is seeded from `config.seed`, or from
    /// the OS when unset. Off wasm the asset is MP3 through ffmpeg when it
    /// is installed, WAV otherwise.
    pub fn new(config: RenderConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        RenderSession {
            config,
            rng,
            progress: None,
            encoder: default_encoder(),
        }
    }

    pub fn with_progress(mut self, callback: impl FnMut(Stage, u8) + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Prefer `encoder` for the final asset; WAV remains the fallback.
    pub fn with_encoder(mut self, encoder: impl AudioEncoder + Send + 'static) -> Self {
        self.encoder = Some(Box::new(encoder));
        self
    }

    /// Always write WAV.
    pub fn without_encoder(mut self) -> Self {
        self.encoder = None;
        self
    }

    /// MIME type of the encoder tried before the WAV fallback, if any.
    pub fn preferred_mime_type(&self) -> Option<&str> {
        self.encoder.as_ref().map(|e| e.mime_type())
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    fn report(&mut self, stage: Stage) {
        tracing::debug!(?stage, percent = stage.percent(), "render progress");
        if let Some(cb) = self.progress.as_mut() {
            cb(stage, stage.percent());
        }
    }

    /// Render, master and encode.
    #[instrument(skip_all, fields(sections = request.sections.len(), title = %request.title))]
    pub fn render(mut self, request: RenderRequest) -> Result<RenderedAsset> {
        let title = request.title.clone();
        let Mixdown {
            buffer: mut mastered,
            bed,
        } = self.render_buffer(request)?;

        let loudness = master::normalize_loudness(
            &mut mastered,
            self.config.mastering.target_lufs,
            self.config.mastering.max_gain_db,
        );
        self.report(Stage::Mastering);

        let encoded = master::encode_with_fallback(
            &mastered,
            self.encoder.as_deref().map(|e| e as &dyn AudioEncoder),
            self.config.mastering.compressed_bitrate,
        );
        self.report(Stage::Encoding);

        let asset = RenderedAsset {
            file_name: master::file_name(&title, &encoded.extension),
            bytes: encoded.bytes,
            mime_type: encoded.mime_type,
            extension: encoded.extension,
            duration: mastered.duration(),
            loudness,
            bed,
        };
        tracing::info!(
            file = %asset.file_name,
            bytes = asset.bytes.len(),
            duration = asset.duration,
            bed = ?asset.bed,
            "render complete"
        );
        self.report(Stage::Complete);
        Ok(asset)
    }

    /// Plan, build and run the mix graph, returning the limited stereo mix
    /// before loudness normalization.
    #[instrument(skip_all)]
    pub fn render_buffer(&mut self, request: RenderRequest) -> Result<Mixdown> {
        let rate = self.config.sample_rate;
        let RenderRequest {
            narration,
            sections,
            background,
            ..
        } = request;

        let timeline = Timeline::plan(&sections, narration.duration(), &self.config)?;
        let frames = frames_for(timeline.total, rate);
        tracing::info!(
            narration_seconds = narration.duration(),
            total_seconds = timeline.total,
            frames,
            "planned render"
        );

        // drawn whichever bed is used, so the other layers see the same stream
        let bed_seed: u64 = self.rng.r#gen();
        let fallback = || synth::fallback_bed(timeline.total, rate, &mut StdRng::seed_from_u64(bed_seed));
        let (background, bed) = match background.map(|clip| bed::conform(clip, rate)) {
            Some(Ok(clip)) => (clip, BedSource::Clip),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "background clip unusable, using synthesized fallback bed");
                (fallback(), BedSource::Fallback)
            }
            None => {
                tracing::warn!("no background clip, using synthesized fallback bed");
                (fallback(), BedSource::Fallback)
            }
        };

        let mut reports = Vec::with_capacity(3);
        let graph = {
            let mut builder = MixBuilder::new(&timeline, &self.config, &mut self.rng);
            builder.add_narration(&narration);
            reports.push(Stage::VoiceProcessing);
            builder.add_entrainment().add_breathing_guides();
            reports.push(Stage::Entrainment);
            builder
                .add_background(background)
                .add_bowls()
                .add_ambience()
                .add_chimes();
            reports.push(Stage::Ambience);
            builder.finish()
        };
        for stage in reports {
            self.report(stage);
        }

        let mix = AudioEngine::new(rate).render(graph, frames)?;
        tracing::info!(frames = mix.frames(), peak = mix.peak(), "rendered mix");
        self.report(Stage::Rendering);
        Ok(Mixdown { buffer: mix, bed })
    }

    /// Fetch the background from `url` (falling back to the synthesized bed
    /// on any failure), then [`render`](Self::render).
    #[cfg(feature = "fetch")]
    #[instrument(skip_all, fields(url = %url))]
    pub async fn render_with_background_url(self, mut request: RenderRequest, url: &str) -> Result<RenderedAsset> {
        let timeout = self.config.bed.fetch_timeout()?;
        let cache = bed::ClipCache::platform();
        match bed::acquire(url, timeout, cache.as_ref()).await {
            Ok(clip) => request.background = Some(clip),
            Err(e) => tracing::warn!(url, error = %e, "background unavailable, using fallback bed"),
        }
        self.render(request)
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn default_encoder() -> Option<Box<dyn AudioEncoder + Send>> {
    Some(Box::new(master::FfmpegEncoder::default()))
}

#[cfg(target_arch = "wasm32")]
fn default_encoder() -> Option<Box<dyn AudioEncoder + Send>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::script::{Ambience, SectionKind};
    use std::sync::{Arc, Mutex};

    const SR: u32 = 8_000;

    fn config() -> RenderConfig {
        RenderConfig {
            sample_rate: SR,
            seed: Some(42),
            ..RenderConfig::default()
        }
    }

    fn narration(seconds: f64) -> Narration {
        let frames = (seconds * SR as f64) as usize;
        let samples = (0..frames)
            .map(|i| {
                let t = i as f32 / SR as f32;
                0.3 * (2.0 * std::f32::consts::PI * 180.0 * t).sin() * (1.0 + (t * 3.0).sin()) * 0.5
            })
            .collect();
        Narration::from_samples(samples, SR).expect("narration")
    }

    fn scenario_a_sections() -> Vec<ScriptSection> {
        vec![
            ScriptSection::new(SectionKind::Intro, 50, 8.0, Ambience::Forest),
            ScriptSection::new(SectionKind::Visualization, 400, 5.0, Ambience::Ocean),
            ScriptSection::new(SectionKind::Outro, 50, 0.0, Ambience::Space),
        ]
    }

    #[test]
    fn stage_percents_increase() {
        let stages = [
            Stage::VoiceProcessing,
            Stage::Entrainment,
            Stage::Ambience,
            Stage::Rendering,
            Stage::Mastering,
            Stage::Encoding,
            Stage::Complete,
        ];
        let percents: Vec<u8> = stages.iter().map(|s| s.percent()).collect();
        assert_eq!(percents, vec![30, 45, 55, 65, 85, 92, 100]);
    }

    #[test]
    fn scenario_a_total_duration() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let request = RenderRequest::new(narration(60.0), scenario_a_sections()).with_title("Deep Rest");
        let asset = RenderSession::new(config())
            .without_encoder()
            .with_progress(move |stage, pct| {
                if let Ok(mut v) = sink.lock() {
                    v.push((stage, pct));
                }
            })
            .render(request)
            .expect("render");

        // 5 s lead-in + 60 s narration + 13 s of pauses + 8 s bowl + 5 s fade
        assert!((asset.duration - 91.0).abs() < 0.05, "duration {}", asset.duration);
        assert_eq!(asset.mime_type, "audio/wav");
        assert_eq!(asset.file_name, "ZenAI_Deep_Rest.wav");
        let frames = (asset.bytes.len() - 44) / 4;
        assert!(frames.abs_diff(91 * SR as usize) <= 1, "frames {frames}");

        let seen = seen.lock().map(|v| v.clone()).unwrap_or_default();
        let percents: Vec<u8> = seen.iter().map(|(_, p)| *p).collect();
        assert_eq!(percents, vec![30, 45, 55, 65, 85, 92, 100]);
    }

    #[test]
    fn scenario_b_fallback_bed_is_audible() {
        let sections = vec![ScriptSection::new(SectionKind::Silence, 10, 0.0, Ambience::Silence)];
        let mut session = RenderSession::new(config());
        let request = RenderRequest::new(narration(4.0), sections);
        let mix = session.render_buffer(request).expect("render");
        assert_eq!(mix.bed, BedSource::Fallback);
        // the fallback floor alone sits near 1e-3 rms; the full mix is above it
        assert!(mix.buffer.rms() > 1e-3, "mix rms {}", mix.buffer.rms());
        assert!(mix.buffer.channel(0).iter().all(|s| s.is_finite()));
    }

    /// Mix of silent narration over a 10 s silence section, with `background`
    /// as the bed.
    fn bed_only_mix(background: Option<AudioBuffer>) -> Mixdown {
        let sections = vec![ScriptSection::new(SectionKind::Silence, 10, 0.0, Ambience::Silence)];
        let silent = Narration::from_samples(vec![0.0; 2 * SR as usize], SR).expect("narration");
        let mut request = RenderRequest::new(silent, sections);
        request.background = background;
        RenderSession::new(config()).render_buffer(request).expect("render")
    }

    #[test]
    fn fallback_bed_contributes_to_the_mix() {
        let fallback = bed_only_mix(None);
        let silent_clip = bed_only_mix(Some(AudioBuffer::from_mono(vec![0.0; SR as usize], SR)));
        assert_eq!(fallback.bed, BedSource::Fallback);
        assert_eq!(silent_clip.bed, BedSource::Clip);
        assert_eq!(fallback.buffer.frames(), silent_clip.buffer.frames());

        let diff: f64 = fallback
            .buffer
            .channel(0)
            .iter()
            .zip(silent_clip.buffer.channel(0))
            .map(|(a, b)| ((a - b) as f64).powi(2))
            .sum::<f64>()
            / fallback.buffer.frames() as f64;
        assert!(diff.sqrt() > 1e-5, "fallback bed adds {} rms", diff.sqrt());
    }

    #[test]
    fn zero_rate_background_uses_fallback_bed() {
        let mix = bed_only_mix(Some(AudioBuffer::from_mono(vec![0.2; 64], 0)));
        assert_eq!(mix.bed, BedSource::Fallback, "an unconvertible clip is replaced");
        assert_eq!(mix.buffer.sample_rate(), SR);
    }

    #[test]
    fn scenario_c_empty_narration_is_fatal() {
        let result = RenderRequest::from_pcm16(&[], 24_000, scenario_a_sections(), &config());
        assert!(matches!(result, Err(RenderError::EmptyNarration)));
        let odd = RenderRequest::from_pcm16(&[0x12], 24_000, Vec::new(), &config());
        assert!(matches!(odd, Err(RenderError::EmptyNarration)));
    }

    #[test]
    fn seeded_renders_are_identical() {
        let render = || {
            let sections = vec![ScriptSection::new(SectionKind::Breathing, 10, 1.0, Ambience::Rain)];
            RenderSession::new(config())
                .without_encoder()
                .render(RenderRequest::new(narration(3.0), sections))
                .expect("render")
        };
        assert_eq!(render().bytes, render().bytes);
    }

    #[test]
    fn loudness_lands_near_target() {
        let config = config();
        let limit = config.mastering.max_gain_db;
        let asset = RenderSession::new(config)
            .without_encoder()
            .render(RenderRequest::new(narration(6.0), Vec::new()))
            .expect("render");
        let l = asset.loudness;
        assert!(
            (l.measured_lufs + l.applied_gain_db - l.target_lufs).abs() < 1e-9 || l.applied_gain_db.abs() == limit,
            "{l:?}"
        );
    }

    struct Unavailable;

    impl AudioEncoder for Unavailable {
        fn mime_type(&self) -> &str {
            "audio/webm"
        }
        fn extension(&self) -> &str {
            "webm"
        }
        fn encode(&self, _: &AudioBuffer, _: u32) -> std::result::Result<Vec<u8>, crate::error::EncodeError> {
            Err(crate::error::EncodeError::Unavailable("no codec".into()))
        }
    }

    #[test]
    fn failed_encoder_falls_back_to_wav() {
        let asset = RenderSession::new(config())
            .with_encoder(Unavailable)
            .render(RenderRequest::new(narration(2.0), Vec::new()).with_title("Short"))
            .expect("render");
        assert_eq!(asset.extension, "wav");
        assert_eq!(asset.file_name, "ZenAI_Short.wav");
        assert_eq!(&asset.bytes[0..4], b"RIFF");
    }

    #[test]
    fn mp3_is_preferred_off_wasm() {
        let session = RenderSession::new(config());
        #[cfg(not(target_arch = "wasm32"))]
        assert_eq!(session.preferred_mime_type(), Some("audio/mpeg"));
        assert_eq!(session.without_encoder().preferred_mime_type(), None);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn missing_ffmpeg_renders_wav() {
        let asset = RenderSession::new(config())
            .with_encoder(master::FfmpegEncoder::with_binary("soundbath-missing-ffmpeg"))
            .render(RenderRequest::new(narration(2.0), Vec::new()))
            .expect("render");
        assert_eq!(asset.mime_type, "audio/wav", "unspawnable encoder falls back");
        assert_eq!(asset.bed, BedSource::Fallback);
    }

    #[cfg(feature = "fetch")]
    #[tokio::test]
    async fn unreachable_background_url_renders_with_fallback_bed() {
        let mut config = config();
        config.bed.fetch_timeout_secs = 2.0;
        let asset = RenderSession::new(config)
            .without_encoder()
            .render_with_background_url(RenderRequest::new(narration(2.0), Vec::new()), "http://127.0.0.1:9/bed.wav")
            .await
            .expect("fetch failure is not fatal");
        assert_eq!(asset.bed, BedSource::Fallback);
        assert_eq!(&asset.bytes[0..4], b"RIFF");
    }

    #[cfg(feature = "fetch")]
    #[tokio::test]
    async fn invalid_fetch_timeout_is_a_config_error() {
        let mut config = config();
        config.bed.fetch_timeout_secs = -1.0;
        let result = RenderSession::new(config)
            .render_with_background_url(RenderRequest::new(narration(2.0), Vec::new()), "http://127.0.0.1:9/bed.wav")
            .await;
        assert!(matches!(result, Err(RenderError::Config(_))));
    }

    #[test]
    fn script_document_drives_request() {
        let script = MeditationScript::from_json(
            r#"{ "title": "Quiet Lake", "sections": [ { "type": "intro", "content": "Hello", "pauseSeconds": 1 } ] }"#,
        )
        .expect("script");
        let pcm: Vec<u8> = (0..24_000u32).flat_map(|i| ((i % 200) as i16 * 50).to_le_bytes()).collect();
        let request = RenderRequest::from_script(&pcm, 24_000, &script, &config()).expect("request");
        assert_eq!(request.title, "Quiet Lake");
        assert_eq!(request.narration.sample_rate(), SR);
        assert!((request.narration.duration() - 1.0).abs() < 1e-3);
    }
}
