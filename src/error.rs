//! Error types for the Bloom assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration is absent or invalid (fatal before the loop starts)
    #[error("configuration error: {0}")]
    ConfigMissing(String),

    /// No usable audio input device (fatal before the loop starts)
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Audio stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// No speech started before the capture timeout
    #[error("no speech detected within {0:?}")]
    AsrTimeout(std::time::Duration),

    /// Speech was captured but produced no text
    #[error("speech could not be understood")]
    AsrUnintelligible,

    /// Speech-to-text backend error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// No media player could be started for a file
    #[error("playback unavailable: {0}")]
    PlaybackUnavailable(String),

    /// Wake word detector error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Language model backend could not be reached
    #[error("language model unreachable: {0}")]
    LlmUnreachable(String),

    /// Language model request timed out
    #[error("language model request timed out")]
    LlmTimeout,

    /// Language model answered with a non-success status
    #[error("language model returned status {0}")]
    LlmBadStatus(u16),

    /// Song catalog could not be written
    #[error("catalog error: {0}")]
    CatalogIo(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this is a normal "nothing usable was said" capture outcome
    ///
    /// Callers treat these as a retry signal rather than a failure.
    #[must_use]
    pub const fn is_no_speech(&self) -> bool {
        matches!(self, Self::AsrTimeout(_) | Self::AsrUnintelligible)
    }

    /// Whether the error must abort startup
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigMissing(_) | Self::DeviceUnavailable(_))
    }
}
