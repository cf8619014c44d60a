/// Result alias that carries the custom [`BeatSyncError`] type.
pub type Result<T> = std::result::Result<T, BeatSyncError>;

/// Common error type for the core crate.
///
/// Everything except [`BeatSyncError::Message`] is a configuration error:
/// it is raised while a component is being built so that nothing enters its
/// active state with values the timing math cannot handle.
#[derive(Debug, thiserror::Error)]
pub enum BeatSyncError {
    /// Free-form error, mostly produced by beat callbacks.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Session files that fail to parse.
    #[error("invalid session json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("tempo must be a positive, finite bpm (got {0})")]
    InvalidTempo(f64),
    #[error("first beat offset must be finite and >= 0 (got {0})")]
    InvalidOffset(f64),
    /// The audio provider could not report a clip duration.
    #[error("audio provider has no clip, beats per loop cannot be derived")]
    MissingClip,
    #[error("clip of {duration}s leaves no beats after the {offset}s first beat offset")]
    ClipTooShort { duration: f64, offset: f64 },
    #[error("quantization grid must be at least one beat")]
    InvalidGrid,
    #[error("curve needs at least one keyframe")]
    EmptyCurve,
    #[error("keyframe {index} must be finite and later than the keyframe before it")]
    InvalidKeyframe { index: usize },
    #[error("track index {index} out of range for {len} tracks")]
    UnknownTrack { index: usize, len: usize },
}

impl BeatSyncError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for BeatSyncError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BeatSyncError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
