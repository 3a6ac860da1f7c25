//! Voice processing module
//!
//! Handles microphone capture, wake word detection, speech recognition and
//! spoken output.

mod capture;
mod recognizer;
mod session;
mod stt;
mod tts;
mod wake_word;

pub use capture::{AudioCapture, Microphone, MicrophoneLease, SAMPLE_RATE, samples_to_wav, to_pcm16};
pub use recognizer::{
    AMBIENT_CALIBRATION, DEFAULT_ENERGY_THRESHOLD, ListenWindow, MicRecognizer, SegmentState, SpeechRecognizer,
    SpeechSegmenter, calibrated_threshold, contains_any, normalize_transcript,
};
pub use session::{INTERRUPT_PHRASES, INTERRUPT_WINDOW, InterruptSignal, SpeechSession};
pub use stt::{DEFAULT_WHISPER_URL, SpeechToText};
pub use tts::{Synthesizer, TextToSpeech};
#[cfg(feature = "porcupine")]
pub use wake_word::PorcupineDetector;
pub use wake_word::{FrameSource, MicrophoneFrames, WakeWordDetector};
