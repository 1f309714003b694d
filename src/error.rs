use thiserror::Error;

/// Result alias carrying the fatal [`RenderError`].
pub type Result<T> = std::result::Result<T, RenderError>;

/// Fatal errors surfaced to the caller of a render.
///
/// Everything the engine can recover from locally (an unreachable background
/// track, an unavailable compressed encoder) is reported through
/// [`AcquireError`] / [`EncodeError`] internally and never reaches this type.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The narration decoded to zero samples.
    #[error("narration buffer is empty")]
    EmptyNarration,
    /// A computed render length was zero, negative, or not finite.
    #[error("invalid render duration: {0}s")]
    InvalidDuration(f64),
    /// A node produced a buffer whose shape does not match what the graph expects.
    #[error("buffer length mismatch: expected {expected} frames, found {found}")]
    BufferLength { expected: usize, found: usize },
    /// A rate conversion with a zero source or target rate.
    #[error("invalid sample rate conversion: {source_rate} Hz to {target_rate} Hz")]
    SampleRate { source_rate: u32, target_rate: u32 },
    /// The script violates an invariant (negative pause, non-finite value).
    #[error("invalid script: {0}")]
    Script(String),
    /// A configured value outside what the engine can honor.
    #[error("invalid config: {0}")]
    Config(String),
    #[error("script json: {0}")]
    Json(#[from] serde_json::Error),
    /// The narration payload from the speech service was not valid base64.
    #[error("narration payload: {0}")]
    Payload(#[from] base64::DecodeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn script<T: Into<String>>(msg: T) -> Self {
        Self::Script(msg.into())
    }
}

/// Why a background clip could not be obtained. Never fatal: the bed path
/// substitutes a synthesized noise bed.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[cfg(feature = "fetch")]
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("decode: {0}")]
    Decode(String),
    #[error("unsupported clip format")]
    Unsupported,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for AcquireError {
    fn from(e: hound::Error) -> Self {
        AcquireError::Decode(e.to_string())
    }
}

/// Why an encoder could not produce output. Triggers the WAV fallback.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encoder unavailable: {0}")]
    Unavailable(String),
    #[error("encoding failed: {0}")]
    Failed(String),
}
