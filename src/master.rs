//! Mastering and encoding: loudness normalization, the encoder seam and the
//! always-available WAV writer.

#[cfg(not(target_arch = "wasm32"))]
use std::io::Write;
#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};
#[cfg(not(target_arch = "wasm32"))]
use std::process::{Command, Stdio};

use serde::Serialize;

use crate::dsp::buffer::AudioBuffer;
use crate::error::EncodeError;

/// Loudness reported for silence.
pub const SILENCE_LUFS: f64 = -100.0;
/// Offset from plain RMS dBFS to the loudness estimate.
const LOUDNESS_OFFSET: f64 = 0.691;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoudnessReport {
    /// Estimated loudness before normalization.
    pub measured_lufs: f64,
    pub target_lufs: f64,
    /// Gain applied, in dB, after clamping.
    pub applied_gain_db: f64,
}

/// RMS-based loudness estimate over every sample of every channel.
pub fn measure_loudness(buffer: &AudioBuffer) -> f64 {
    let rms = buffer.rms();
    if rms <= 0.0 || !rms.is_finite() {
        return SILENCE_LUFS;
    }
    20.0 * rms.log10() - LOUDNESS_OFFSET
}

/// Move `buffer` toward `target_lufs` with at most `max_gain_db` of boost or
/// cut, then hard clip to [-1, 1].
pub fn normalize_loudness(buffer: &mut AudioBuffer, target_lufs: f64, max_gain_db: f64) -> LoudnessReport {
    let measured = measure_loudness(buffer);
    let limit = max_gain_db.abs();
    let gain_db = (target_lufs - measured).clamp(-limit, limit);
    let gain = 10.0_f64.powf(gain_db / 20.0) as f32;

    for ch in buffer.channels_mut() {
        for s in ch.iter_mut() {
            *s = (*s * gain).clamp(-1.0, 1.0);
        }
    }

    tracing::info!(measured_lufs = measured, target_lufs, gain_db, "normalized loudness");
    LoudnessReport {
        measured_lufs: measured,
        target_lufs,
        applied_gain_db: gain_db,
    }
}

/// Encoded bytes with their container description.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub extension: String,
}

/// A container/codec the final asset can be written in.
pub trait AudioEncoder {
    fn mime_type(&self) -> &str;
    fn extension(&self) -> &str;
    /// Encode `buffer`; `bitrate` is a hint for lossy codecs.
    fn encode(&self, buffer: &AudioBuffer, bitrate: u32) -> Result<Vec<u8>, EncodeError>;
}

/// 16-bit PCM RIFF/WAVE. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavEncoder;

impl AudioEncoder for WavEncoder {
    fn mime_type(&self) -> &str {
        "audio/wav"
    }

    fn extension(&self) -> &str {
        "wav"
    }

    fn encode(&self, buffer: &AudioBuffer, _bitrate: u32) -> Result<Vec<u8>, EncodeError> {
        Ok(encode_wav(buffer))
    }
}

/// MP3 through an `ffmpeg` subprocess with libmp3lame. The mastered mix is
/// piped in as WAV and the encoded stream read back from stdout.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::with_binary("ffmpeg")
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl FfmpegEncoder {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        FfmpegEncoder { binary: binary.into() }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl AudioEncoder for FfmpegEncoder {
    fn mime_type(&self) -> &str {
        "audio/mpeg"
    }

    fn extension(&self) -> &str {
        "mp3"
    }

    fn encode(&self, buffer: &AudioBuffer, bitrate: u32) -> Result<Vec<u8>, EncodeError> {
        let kbps = format!("{}k", (bitrate / 1000).max(8));
        let mut child = Command::new(&self.binary)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "wav",
                "-i",
                "pipe:0",
                "-codec:a",
                "libmp3lame",
                "-b:a",
                &kbps,
                "-f",
                "mp3",
                "pipe:1",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncodeError::Unavailable(format!("{}: {e}", self.binary.display())))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncodeError::Failed("ffmpeg stdin not captured".to_string()))?;
        let wav = encode_wav(buffer);
        let writer = std::thread::spawn(move || stdin.write_all(&wav));
        let output = child
            .wait_with_output()
            .map_err(|e| EncodeError::Failed(format!("waiting for ffmpeg: {e}")))?;
        let written = writer
            .join()
            .map_err(|_| EncodeError::Failed("ffmpeg stdin writer panicked".to_string()))?;

        // a failed exit takes precedence over a broken pipe
        if !output.status.success() {
            return Err(EncodeError::Failed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        written.map_err(|e| EncodeError::Failed(format!("piping wav to ffmpeg: {e}")))?;
        if output.stdout.is_empty() {
            return Err(EncodeError::Failed("ffmpeg produced no output".to_string()));
        }
        tracing::debug!(bytes = output.stdout.len(), bitrate, "encoded mp3");
        Ok(output.stdout)
    }
}

/// Float sample to 16-bit, scaling negatives by 32768 and positives by 32767.
#[inline]
pub fn to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode a buffer as an interleaved 16-bit WAV byte buffer.
pub fn encode_wav(buffer: &AudioBuffer) -> Vec<u8> {
    let channels = buffer.channel_count() as u16;
    let sample_rate = buffer.sample_rate();
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (buffer.frames() * channels as usize * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for sample in buffer.interleaved() {
        buf.extend_from_slice(&to_pcm16(sample).to_le_bytes());
    }

    buf
}

/// Encode with `preferred` when given, falling back to WAV on any failure.
pub fn encode_with_fallback(
    buffer: &AudioBuffer,
    preferred: Option<&dyn AudioEncoder>,
    bitrate: u32,
) -> EncodedAudio {
    if let Some(encoder) = preferred {
        match encoder.encode(buffer, bitrate) {
            Ok(bytes) => {
                return EncodedAudio {
                    bytes,
                    mime_type: encoder.mime_type().to_string(),
                    extension: encoder.extension().to_string(),
                };
            }
            Err(e) => {
                tracing::warn!(mime = encoder.mime_type(), error = %e, "encoder failed, writing wav instead");
            }
        }
    }
    let wav = WavEncoder;
    EncodedAudio {
        bytes: encode_wav(buffer),
        mime_type: wav.mime_type().to_string(),
        extension: wav.extension().to_string(),
    }
}

/// Download name for a rendered meditation.
pub fn file_name(title: &str, extension: &str) -> String {
    let words: Vec<&str> = title.split_whitespace().collect();
    let stem = if words.is_empty() {
        "meditation".to_string()
    } else {
        words.join("_")
    };
    format!("ZenAI_{stem}.{extension}")
}
