pub mod bed;
pub mod config;
pub mod dsp;
pub mod error;
pub mod graph;
pub mod master;
pub mod mix;
pub mod script;
pub mod session;
pub mod synth;
pub mod timeline;

use crate::config::RenderConfig;
use crate::dsp::buffer::AudioBuffer;
use crate::error::{RenderError, Result};
use crate::script::MeditationScript;
use crate::session::{RenderRequest, RenderSession, RenderedAsset};
use crate::timeline::Timeline;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the soundbath-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Render a meditation from raw 16-bit narration and a script document to
/// a WAV asset.
///
/// `background` is used as the bed when present; otherwise the synthesized
/// fallback is mixed in its place.
pub fn render_meditation(
    pcm: &[u8],
    narration_rate: u32,
    script_json: &str,
    background: Option<AudioBuffer>,
    config: RenderConfig,
) -> Result<RenderedAsset> {
    let script = MeditationScript::from_json(script_json)?;
    let mut request = RenderRequest::from_script(pcm, narration_rate, &script, &config)?;
    if let Some(clip) = background {
        request = request.with_background(clip);
    }
    RenderSession::new(config).without_encoder().render(request)
}

/// Plan the timeline for a script against a narration of known length.
pub fn plan(script_json: &str, narration_seconds: f64, config: &RenderConfig) -> Result<Timeline> {
    let script = MeditationScript::from_json(script_json)?;
    Timeline::plan(&script.sections()?, narration_seconds, config)
}

fn config_or_default(config_json: Option<String>) -> Result<RenderConfig> {
    match config_json {
        Some(json) if !json.trim().is_empty() => RenderConfig::from_json(&json),
        _ => Ok(RenderConfig::default()),
    }
}

fn js_error(e: RenderError) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// WASM-exposed: render narration PCM and a script JSON to WAV bytes.
/// An empty `background` selects the synthesized fallback bed; a missing
/// `narration_rate` uses the configured one.
#[wasm_bindgen]
pub fn render_meditation_wav(
    pcm: &[u8],
    narration_rate: Option<u32>,
    script_json: &str,
    background: Vec<f32>,
    background_rate: u32,
    config_json: Option<String>,
) -> std::result::Result<Vec<u8>, JsValue> {
    let config = config_or_default(config_json).map_err(js_error)?;
    let narration_rate = narration_rate.unwrap_or(config.narration_rate);
    let background = (!background.is_empty()).then(|| AudioBuffer::from_mono(background, background_rate));
    let asset = render_meditation(pcm, narration_rate, script_json, background, config).map_err(js_error)?;
    Ok(asset.bytes)
}

/// WASM-exposed: plan the section timeline and bed automation as JSON.
#[wasm_bindgen]
pub fn plan_timeline(
    script_json: &str,
    narration_seconds: f64,
    config_json: Option<String>,
) -> std::result::Result<JsValue, JsValue> {
    let config = config_or_default(config_json).map_err(js_error)?;
    let timeline = plan(script_json, narration_seconds, &config).map_err(js_error)?;
    serde_wasm_bindgen::to_value(&timeline).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: the default render configuration as JSON.
#[wasm_bindgen]
pub fn default_config() -> std::result::Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&RenderConfig::default()).map_err(|e| JsValue::from_str(&format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"{
        "title": "Morning Light",
        "sections": [
            { "type": "intro", "content": "Welcome.", "pauseSeconds": 2, "ambientHint": "rain" },
            { "type": "closing", "content": "Return slowly.", "pauseSeconds": 0 }
        ]
    }"#;

    fn small_config() -> RenderConfig {
        RenderConfig {
            sample_rate: 8_000,
            seed: Some(7),
            ..RenderConfig::default()
        }
    }

    fn pcm(seconds: f64, rate: u32) -> Vec<u8> {
        let frames = (seconds * rate as f64) as usize;
        (0..frames)
            .flat_map(|i| {
                let t = i as f64 / rate as f64;
                (((2.0 * std::f64::consts::PI * 200.0 * t).sin() * 8_000.0) as i16).to_le_bytes()
            })
            .collect()
    }

    #[test]
    fn version_matches_manifest() {
        assert_eq!(core_version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn renders_script_end_to_end() {
        let asset = render_meditation(&pcm(2.0, 8_000), 8_000, SCRIPT, None, small_config()).expect("render");
        assert_eq!(&asset.bytes[0..4], b"RIFF");
        assert_eq!(asset.file_name, "ZenAI_Morning_Light.wav");
        // 5 lead-in + 2 speech + 2 pause + 8 bowl + 5 fade
        assert!((asset.duration - 22.0).abs() < 0.05, "duration {}", asset.duration);
    }

    #[test]
    fn plans_without_audio() {
        let timeline = plan(SCRIPT, 30.0, &RenderConfig::default()).expect("plan");
        assert_eq!(timeline.events.len(), 2);
        assert!((timeline.total - (5.0 + 30.0 + 2.0 + 8.0 + 5.0)).abs() < 1e-9);
    }

    #[test]
    fn empty_narration_is_rejected() {
        let result = render_meditation(&[], 24_000, SCRIPT, None, small_config());
        assert!(matches!(result, Err(RenderError::EmptyNarration)));
    }

    #[test]
    fn wav_export_returns_riff_bytes() {
        let config = r#"{ "sample_rate": 8000, "seed": 7 }"#;
        let bytes = render_meditation_wav(&pcm(1.0, 8_000), Some(8_000), SCRIPT, Vec::new(), 0, Some(config.into()))
            .unwrap_or_else(|_| panic!("export failed"));
        assert_eq!(&bytes[0..4], b"RIFF", "export yields a WAV file");
    }

    #[test]
    fn wav_export_defaults_narration_rate_from_config() {
        // 24 kHz is the configured narration rate, so 24_000 frames last one second
        let config = r#"{ "sample_rate": 8000, "seed": 7 }"#;
        let bytes = render_meditation_wav(&pcm(1.0, 24_000), None, SCRIPT, Vec::new(), 0, Some(config.into()))
            .unwrap_or_else(|_| panic!("export failed"));
        let explicit = render_meditation(&pcm(1.0, 24_000), 24_000, SCRIPT, None, small_config()).expect("render");
        assert_eq!(bytes.len(), explicit.bytes.len(), "same length as an explicit 24 kHz render");
    }

    #[test]
    fn blank_config_uses_defaults() {
        let config = config_or_default(Some("  ".into())).expect("config");
        assert_eq!(config, RenderConfig::default());
        assert!(config_or_default(Some("{ nope".into())).is_err());
    }
}
