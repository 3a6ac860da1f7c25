//! Bloom - wake word voice assistant
//!
//! Listens for "Hi Bloom", captures a spoken command and either plays music
//! from a local catalog or asks a language model, speaking the result back.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   WakeWordEngine                      │
//! │   FrameSource → WakeWordDetector → command cycle      │
//! └──────────────┬───────────────────────┬───────────────┘
//!                │                       │
//! ┌──────────────▼─────────────┐ ┌───────▼───────────────┐
//! │      CommandDispatcher     │ │       LlmClient        │
//! │  MusicCatalog  │  Player   │ │  Ollama-style HTTP     │
//! └──────────────┬─────────────┘ └───────┬───────────────┘
//!                │                       │
//! ┌──────────────▼───────────────────────▼───────────────┐
//! │                    SpeechSession                      │
//! │   Synthesizer → Player, raced against an interrupt    │
//! │   listener on the shared Microphone                   │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod llm;
pub mod playback;
pub mod voice;

pub use catalog::{MusicCatalog, SongRecord};
pub use config::Config;
pub use dispatch::{CommandDispatcher, DispatchResult};
pub use engine::{CycleOutcome, EngineOptions, StopReason, WakeWordEngine};
pub use error::{Error, Result};
pub use llm::{LanguageModel, LlmClient, LlmSettings};
pub use playback::{PlaybackController, PlaybackHandle, Player};
