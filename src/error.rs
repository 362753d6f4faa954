//! Error types for the iris session controller.

/// Top-level error type for the voice session system.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech recognition error for a single segment. Transient: the
    /// pipeline degrades the affected cycle to an empty transcript.
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Reasoning engine boundary is unreachable or returned garbage.
    #[error("engine error: {0}")]
    Engine(String),

    /// Speech synthesis error.
    #[error("speech output error: {0}")]
    Speech(String),

    /// Dictation log storage error.
    #[error("dictation error: {0}")]
    Dictation(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SessionError>;
