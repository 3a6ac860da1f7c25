//! TOML configuration file loading
//!
//! Supports `~/.config/bloom/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BloomConfigFile {
    /// Wake word detector settings
    #[serde(default)]
    pub wake_word: WakeWordFileConfig,

    /// Song catalog location
    pub catalog: Option<String>,

    /// Language model backend
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech recognition and synthesis
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Music playback
    #[serde(default)]
    pub music: MusicFileConfig,

    /// Fixed announcements
    #[serde(default)]
    pub phrases: PhrasesFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeWordFileConfig {
    /// Picovoice access key
    pub access_key: Option<String>,

    /// Path to the `.ppn` keyword model
    pub keyword_path: Option<String>,

    /// Detection sensitivity in [0, 1]
    pub sensitivity: Option<f32>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Generate endpoint URL
    pub endpoint: Option<String>,

    /// Model name (e.g. "llama3")
    pub model: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Reply length limit
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT backend ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Override for the Whisper-compatible endpoint
    pub stt_url: Option<String>,

    /// Recognition language (e.g. "en")
    pub language: Option<String>,

    /// TTS backend ("google" or "openai")
    pub tts_provider: Option<String>,

    /// TTS model for `OpenAI` (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// Command line used to play speech clips
    pub speech_player: Option<String>,

    /// RMS level that counts as speech
    pub energy_threshold: Option<f32>,
}

/// Music configuration
#[derive(Debug, Default, Deserialize)]
pub struct MusicFileConfig {
    /// Enable music commands
    pub enabled: Option<bool>,

    /// Player command lines tried in order
    pub players: Option<Vec<String>>,
}

/// Announcement text
#[derive(Debug, Default, Deserialize)]
pub struct PhrasesFileConfig {
    /// Spoken once at startup; empty disables
    pub greeting: Option<String>,

    /// Spoken when the wake word is heard
    pub acknowledgment: Option<String>,

    /// Spoken before exiting
    pub farewell: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    /// `OpenAI` key for Whisper and `OpenAI` TTS
    pub openai: Option<String>,

    /// Deepgram key
    pub deepgram: Option<String>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `BloomConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file(path: Option<&Path>) -> BloomConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return BloomConfigFile::default();
    };

    if !path.exists() {
        return BloomConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                BloomConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            BloomConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed
pub fn parse_config(content: &str) -> crate::Result<BloomConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/bloom/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("bloom").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file() {
        let fc = parse_config(
            r#"
            catalog = "/srv/music/songs.json"

            [wake_word]
            keyword_path = "/opt/bloom/hi-bloom.ppn"

            [music]
            players = ["mpv --no-video"]
            "#,
        )
        .unwrap();

        assert_eq!(fc.catalog.as_deref(), Some("/srv/music/songs.json"));
        assert_eq!(fc.wake_word.keyword_path.as_deref(), Some("/opt/bloom/hi-bloom.ppn"));
        assert!(fc.wake_word.access_key.is_none());
        assert_eq!(fc.music.players.unwrap(), vec!["mpv --no-video"]);
        assert!(fc.llm.model.is_none());
    }

    #[test]
    fn test_malformed_file() {
        assert!(parse_config("[llm\nmodel = 1").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let fc = load_config_file(Some(Path::new("/definitely/not/here.toml")));
        assert!(fc.catalog.is_none());
    }
}
