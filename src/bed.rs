//! Background bed: decoding, conforming and seamlessly looping a clip to the
//! render length, plus (feature `fetch`) network acquisition with an on-disk
//! cache.

use std::io::Cursor;

use crate::dsp::buffer::{AudioBuffer, frames_for};
use crate::dsp::crossfade;
use crate::dsp::pcm::{check_rates, resample};
use crate::error::{AcquireError, Result as RenderResult};

/// Loop or truncate `clip` to exactly `ceil(seconds × rate)` frames.
///
/// Each repetition after the first starts `len − F` frames after the
/// previous one and crossfades its head over the previous tail, with `F`
/// capped at half the clip so repetitions never overlap each other. Clips
/// no longer than the crossfade window are tiled instead.
pub fn extend(clip: &AudioBuffer, seconds: f64, crossfade_seconds: f64) -> AudioBuffer {
    let rate = clip.sample_rate();
    let target = frames_for(seconds, rate);
    let len = clip.frames();

    if len == 0 {
        return AudioBuffer::silent(clip.channel_count(), target, rate);
    }
    if len >= target {
        let channels = clip.channels().iter().map(|c| c[..target].to_vec()).collect();
        return AudioBuffer::from_channels(channels, rate);
    }

    let window = frames_for(crossfade_seconds, rate);
    let channels = clip
        .channels()
        .iter()
        .map(|source| {
            if len <= window {
                return source.iter().copied().cycle().take(target).collect();
            }
            let fade = window.min(len / 2);
            let stride = len - fade;
            let mut out = vec![0.0_f32; target];
            out[..len].copy_from_slice(source);

            let mut start = stride;
            while start < target {
                let overlap = fade.min(target - start);
                for i in 0..overlap {
                    let (tail, head) = crossfade::gains(i, fade);
                    out[start + i] = out[start + i] * tail + source[i] * head;
                }
                if start + fade < target {
                    let rest_end = (start + len).min(target);
                    out[start + fade..rest_end].copy_from_slice(&source[fade..rest_end - start]);
                }
                start += stride;
            }
            out
        })
        .collect();

    tracing::debug!(clip_frames = len, target, "extended background clip");
    AudioBuffer::from_channels(channels, rate)
}

/// Resample every channel of `clip` to `sample_rate`. A clip or target
/// rate of zero is an error.
pub fn conform(clip: AudioBuffer, sample_rate: u32) -> RenderResult<AudioBuffer> {
    let source_rate = clip.sample_rate();
    check_rates(source_rate, sample_rate)?;
    if source_rate == sample_rate {
        return Ok(clip);
    }
    let channels = clip
        .into_channels()
        .into_iter()
        .map(|c| resample(c, source_rate, sample_rate))
        .collect();
    Ok(AudioBuffer::from_channels(channels, sample_rate))
}

/// Split interleaved samples into at most two planar channels.
fn deinterleave(samples: &[f32], channels: usize, sample_rate: u32) -> AudioBuffer {
    let channels = channels.max(1);
    let kept = channels.min(2);
    let mut planar = vec![Vec::with_capacity(samples.len() / channels); kept];
    for frame in samples.chunks_exact(channels) {
        for (ch, out) in planar.iter_mut().enumerate() {
            out.push(frame[ch]);
        }
    }
    AudioBuffer::from_channels(planar, sample_rate)
}

/// Decode a RIFF/WAVE clip or, with feature `fetch`, an MP3 clip.
pub fn decode_clip(bytes: &[u8]) -> Result<AudioBuffer, AcquireError> {
    let clip = if bytes.starts_with(b"RIFF") {
        decode_wav(bytes)?
    } else {
        decode_compressed(bytes)?
    };
    if clip.is_empty() {
        return Err(AcquireError::Decode("clip contains no audio".to_string()));
    }
    Ok(clip)
}

fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer, AcquireError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let full_scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
    };
    Ok(deinterleave(&samples, spec.channels as usize, spec.sample_rate))
}

#[cfg(feature = "fetch")]
fn decode_compressed(bytes: &[u8]) -> Result<AudioBuffer, AcquireError> {
    let mut decoder = minimp3::Decoder::new(bytes);
    let mut samples = Vec::new();
    let mut format = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                format.get_or_insert((frame.channels, frame.sample_rate as u32));
                samples.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(AcquireError::Decode(format!("mp3: {e:?}"))),
        }
    }

    let (channels, sample_rate) = format.ok_or(AcquireError::Unsupported)?;
    Ok(deinterleave(&samples, channels, sample_rate))
}

#[cfg(not(feature = "fetch"))]
fn decode_compressed(_bytes: &[u8]) -> Result<AudioBuffer, AcquireError> {
    Err(AcquireError::Unsupported)
}

#[cfg(feature = "fetch")]
pub use remote::{ClipCache, acquire};

#[cfg(feature = "fetch")]
mod remote {
    use std::path::PathBuf;
    use std::time::Duration;

    use sha2::{Digest, Sha256};

    use super::decode_clip;
    use crate::dsp::buffer::AudioBuffer;
    use crate::error::AcquireError;

    /// Downloaded clips keyed by the SHA-256 of their URL.
    #[derive(Debug, Clone)]
    pub struct ClipCache {
        dir: PathBuf,
    }

    impl ClipCache {
        pub fn new(dir: impl Into<PathBuf>) -> Self {
            ClipCache { dir: dir.into() }
        }

        /// The platform cache directory, if the platform has one.
        pub fn platform() -> Option<Self> {
            directories::ProjectDirs::from("", "", "soundbath")
                .map(|dirs| Self::new(dirs.cache_dir().join("beds")))
        }

        pub fn path_for(&self, url: &str) -> PathBuf {
            let digest = Sha256::digest(url.as_bytes());
            let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
            self.dir.join(name)
        }

        pub async fn load(&self, url: &str) -> Option<Vec<u8>> {
            tokio::fs::read(self.path_for(url)).await.ok()
        }

        pub async fn store(&self, url: &str, bytes: &[u8]) -> Result<(), AcquireError> {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(self.path_for(url), bytes).await?;
            Ok(())
        }
    }

    async fn download(url: &str) -> Result<Vec<u8>, AcquireError> {
        let response = reqwest::get(url).await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetch and decode the clip at `url`, bounded by `timeout`.
    pub async fn acquire(
        url: &str,
        timeout: Duration,
        cache: Option<&ClipCache>,
    ) -> Result<AudioBuffer, AcquireError> {
        if let Some(cache) = cache {
            if let Some(bytes) = cache.load(url).await {
                tracing::debug!(url, bytes = bytes.len(), "background clip cache hit");
                return decode_clip(&bytes);
            }
        }

        let bytes = tokio::time::timeout(timeout, download(url))
            .await
            .map_err(|_| AcquireError::Timeout(timeout))??;
        let clip = decode_clip(&bytes)?;

        if let Some(cache) = cache {
            if let Err(e) = cache.store(url, &bytes).await {
                tracing::warn!(url, error = %e, "could not cache background clip");
            }
        }
        tracing::info!(url, frames = clip.frames(), rate = clip.sample_rate(), "acquired background clip");
        Ok(clip)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn cache_paths_are_stable_hashes() {
            let cache = ClipCache::new("/tmp/beds");
            let a = cache.path_for("https://cdn.example/forest.mp3");
            let b = cache.path_for("https://cdn.example/forest.mp3");
            let c = cache.path_for("https://cdn.example/rain.mp3");
            assert_eq!(a, b);
            assert_ne!(a, c);
            let name = a.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            assert_eq!(name.len(), 64);
        }

        #[tokio::test]
        async fn unreachable_url_is_an_error() {
            let result = acquire("http://127.0.0.1:9/missing.wav", Duration::from_secs(2), None).await;
            assert!(result.is_err());
        }

        #[tokio::test]
        async fn cached_clip_skips_network() {
            let dir = std::env::temp_dir().join(format!("soundbath-cache-{}", std::process::id()));
            let cache = ClipCache::new(&dir);
            let url = "http://127.0.0.1:9/cached.wav";
            let wav = super::super::tests::wav_bytes(&[0.25, -0.25, 0.5], 1, 8_000);
            cache.store(url, &wav).await.expect("store");
            let clip = acquire(url, Duration::from_millis(10), Some(&cache)).await.expect("cache hit");
            assert_eq!(clip.frames(), 3);
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
