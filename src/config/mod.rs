//! Configuration management for the Bloom assistant

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{DEFAULT_ACKNOWLEDGMENT, DEFAULT_FAREWELL, DEFAULT_GREETING, EngineOptions};
use crate::llm::{DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TIMEOUT, LlmSettings};
use crate::playback::{
    PlaybackController, PlayerCommand, default_speech_player, default_track_players,
};
use crate::voice::{DEFAULT_ENERGY_THRESHOLD, SpeechToText, TextToSpeech};
use crate::{Error, Result};

use self::file::BloomConfigFile;

/// Bloom assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake word detector settings
    pub wake_word: WakeWordConfig,

    /// Path to the song catalog JSON file
    pub catalog_path: PathBuf,

    /// Language model backend
    pub llm: LlmSettings,

    /// Speech recognition and synthesis
    pub voice: VoiceConfig,

    /// Music playback
    pub music: MusicConfig,

    /// Fixed announcements
    pub phrases: PhraseConfig,
}

/// Wake word configuration
#[derive(Debug, Clone)]
pub struct WakeWordConfig {
    /// Picovoice access key (from `BLOOM_ACCESS_KEY`)
    pub access_key: Option<String>,

    /// Path to the keyword model (from `BLOOM_KEYWORD_PATH`)
    pub keyword_path: Option<PathBuf>,

    /// Detection sensitivity in [0, 1]
    pub sensitivity: f32,
}

/// Speech-to-text backend choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttBackend {
    /// OpenAI-compatible Whisper endpoint
    Whisper,
    /// Deepgram listen API
    Deepgram,
}

/// Text-to-speech backend choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsBackend {
    /// Keyless Google Translate voice
    Google,
    /// `OpenAI` speech API
    OpenAi,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT backend
    pub stt: SttBackend,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// Override for the Whisper-compatible endpoint
    pub stt_url: Option<String>,

    /// Recognition and synthesis language
    pub language: String,

    /// TTS backend
    pub tts: TtsBackend,

    /// TTS model for `OpenAI`
    pub tts_model: String,

    /// TTS voice for `OpenAI`
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// Program used for speech clips
    pub speech_player: PlayerCommand,

    /// RMS level that counts as speech
    pub energy_threshold: f32,

    /// `OpenAI` API key (from `OPENAI_API_KEY`)
    pub openai_api_key: Option<String>,

    /// Deepgram API key (from `DEEPGRAM_API_KEY`)
    pub deepgram_api_key: Option<String>,
}

/// Music configuration
#[derive(Debug, Clone)]
pub struct MusicConfig {
    /// Route music commands before the language model
    pub enabled: bool,

    /// Track players in fallback order
    pub players: Vec<PlayerCommand>,
}

/// Announcement text
#[derive(Debug, Clone)]
pub struct PhraseConfig {
    /// Spoken once at startup; empty disables it
    pub greeting: String,

    /// Spoken when the wake word is heard
    pub acknowledgment: String,

    /// Spoken before exiting
    pub farewell: String,
}

/// Default catalog location: `~/.local/share/bloom/music_database.json`
fn default_catalog_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("music_database.json"),
        |d| d.data_dir().join("bloom").join("music_database.json"),
    )
}

impl Config {
    /// Load configuration from the standard file and the environment
    ///
    /// Environment variables take precedence over the file.
    #[must_use]
    pub fn load(config_file: Option<&Path>) -> Self {
        let fc = file::load_config_file(config_file);
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    #[must_use]
    pub fn from_sources(fc: BloomConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let wake_word = WakeWordConfig {
            access_key: var("BLOOM_ACCESS_KEY").or(fc.wake_word.access_key),
            keyword_path: var("BLOOM_KEYWORD_PATH")
                .or(fc.wake_word.keyword_path)
                .map(PathBuf::from),
            sensitivity: var("BLOOM_SENSITIVITY")
                .and_then(|v| v.parse().ok())
                .or(fc.wake_word.sensitivity)
                .unwrap_or(0.5),
        };

        let catalog_path = var("BLOOM_CATALOG")
            .or(fc.catalog)
            .map_or_else(default_catalog_path, PathBuf::from);

        let llm = LlmSettings {
            endpoint: var("BLOOM_LLM_URL")
                .or(fc.llm.endpoint)
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: var("BLOOM_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: fc.llm.temperature.unwrap_or(0.7),
            max_tokens: fc.llm.max_tokens.unwrap_or(150),
            timeout: var("BLOOM_LLM_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .or(fc.llm.timeout_secs)
                .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
        };

        let stt = match var("BLOOM_STT_PROVIDER")
            .or(fc.voice.stt_provider)
            .as_deref()
        {
            Some("deepgram") => SttBackend::Deepgram,
            _ => SttBackend::Whisper,
        };
        let default_stt_model = match stt {
            SttBackend::Whisper => "whisper-1",
            SttBackend::Deepgram => "nova-2",
        };

        let tts = match var("BLOOM_TTS_PROVIDER")
            .or(fc.voice.tts_provider)
            .as_deref()
        {
            Some("openai") => TtsBackend::OpenAi,
            _ => TtsBackend::Google,
        };

        let voice = VoiceConfig {
            stt,
            stt_model: var("BLOOM_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| default_stt_model.to_string()),
            stt_url: var("BLOOM_STT_URL").or(fc.voice.stt_url),
            language: var("BLOOM_LANGUAGE")
                .or(fc.voice.language)
                .unwrap_or_else(|| "en".to_string()),
            tts,
            tts_model: fc.voice.tts_model.unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: fc.voice.tts_voice.unwrap_or_else(|| "alloy".to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0),
            speech_player: var("BLOOM_SPEECH_PLAYER")
                .or(fc.voice.speech_player)
                .as_deref()
                .and_then(PlayerCommand::parse)
                .unwrap_or_else(default_speech_player),
            energy_threshold: fc
                .voice
                .energy_threshold
                .unwrap_or(DEFAULT_ENERGY_THRESHOLD),
            openai_api_key: var("OPENAI_API_KEY").or(fc.api_keys.openai),
            deepgram_api_key: var("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
        };

        let music = MusicConfig {
            enabled: var("BLOOM_MUSIC")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .or(fc.music.enabled)
                .unwrap_or(true),
            players: fc
                .music
                .players
                .map(|lines| {
                    lines
                        .iter()
                        .filter_map(|line| PlayerCommand::parse(line))
                        .collect::<Vec<_>>()
                })
                .filter(|players| !players.is_empty())
                .unwrap_or_else(default_track_players),
        };

        let phrases = PhraseConfig {
            greeting: fc
                .phrases
                .greeting
                .unwrap_or_else(|| DEFAULT_GREETING.to_string()),
            acknowledgment: fc
                .phrases
                .acknowledgment
                .unwrap_or_else(|| DEFAULT_ACKNOWLEDGMENT.to_string()),
            farewell: fc
                .phrases
                .farewell
                .unwrap_or_else(|| DEFAULT_FAREWELL.to_string()),
        };

        Self {
            wake_word,
            catalog_path,
            llm,
            voice,
            music,
            phrases,
        }
    }

    /// Check that everything the wake word loop needs is present
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` if the access key or keyword model is absent
    pub fn validate(&self) -> Result<()> {
        if self.wake_word.access_key.is_none() {
            return Err(Error::ConfigMissing(
                "wake word access key not set (BLOOM_ACCESS_KEY)".to_string(),
            ));
        }

        let Some(path) = &self.wake_word.keyword_path else {
            return Err(Error::ConfigMissing(
                "wake word model path not set (BLOOM_KEYWORD_PATH)".to_string(),
            ));
        };

        if !path.is_file() {
            return Err(Error::ConfigMissing(format!(
                "wake word model not found: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Build the configured speech-to-text client
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` if the backend's API key is absent
    pub fn speech_to_text(&self) -> Result<SpeechToText> {
        let voice = &self.voice;
        match voice.stt {
            SttBackend::Whisper => SpeechToText::new_whisper(
                voice.openai_api_key.clone().unwrap_or_default(),
                voice.stt_model.clone(),
                voice.language.clone(),
                voice.stt_url.clone(),
            ),
            SttBackend::Deepgram => SpeechToText::new_deepgram(
                voice.deepgram_api_key.clone().unwrap_or_default(),
                voice.stt_model.clone(),
                voice.language.clone(),
            ),
        }
    }

    /// Build the configured text-to-speech client
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` if the `OpenAI` backend is chosen without a key
    pub fn text_to_speech(&self) -> Result<TextToSpeech> {
        let voice = &self.voice;
        match voice.tts {
            TtsBackend::Google => Ok(TextToSpeech::new_google(voice.language.clone())),
            TtsBackend::OpenAi => TextToSpeech::new_openai(
                voice.openai_api_key.clone().unwrap_or_default(),
                voice.tts_model.clone(),
                voice.tts_voice.clone(),
                voice.tts_speed,
            ),
        }
    }

    /// Build the media player controller
    #[must_use]
    pub fn playback_controller(&self) -> PlaybackController {
        PlaybackController::new(self.music.players.clone(), self.voice.speech_player.clone())
    }

    /// Engine tunables derived from the configured phrases
    #[must_use]
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            greeting: self.phrases.greeting.clone(),
            acknowledgment: self.phrases.acknowledgment.clone(),
            farewell: self.phrases.farewell.clone(),
            ..EngineOptions::default()
        }
    }
}
