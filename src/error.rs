//! Error types for the voice subsystem.

/// Top-level error type for the kiosk voice stack.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone capture or calibration error.
    #[error("capture error: {0}")]
    Capture(String),

    /// Speech-to-text transcription error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Chat backend error.
    #[error("chat error: {0}")]
    Chat(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Speak pipeline coordination error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;
