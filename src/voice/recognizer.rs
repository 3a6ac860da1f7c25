//! Utterance capture and recognition
//!
//! A capture waits for speech to start, records until the speaker pauses or
//! the phrase limit is reached, then sends the segment to the STT backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::capture::{Microphone, SAMPLE_RATE, samples_to_wav};
use super::stt::SpeechToText;
use crate::{Error, Result};

/// Default RMS energy threshold to consider speech
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to keep (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence that ends an utterance (in samples)
const PAUSE_SAMPLES: usize = 12800; // 0.8 seconds

/// How often the capture loop drains the microphone
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Background sampling before a calibrated capture
pub const AMBIENT_CALIBRATION: Duration = Duration::from_millis(500);

/// Speech must be this much louder than the measured background
const AMBIENT_RATIO: f32 = 1.5;

/// Time limits for one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenWindow {
    /// How long to wait for speech to begin
    pub timeout: Duration,

    /// Longest phrase recorded once speech has begun
    pub phrase_limit: Duration,

    /// Background sampling before listening; zero keeps the configured threshold
    pub calibration: Duration,
}

impl ListenWindow {
    /// Window with equal start timeout and phrase limit
    #[must_use]
    pub const fn seconds(secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(secs),
            phrase_limit: Duration::from_secs(secs),
            calibration: Duration::ZERO,
        }
    }

    /// Measure background noise for `duration` before each capture
    #[must_use]
    pub const fn with_calibration(mut self, duration: Duration) -> Self {
        self.calibration = duration;
        self
    }
}

/// Captures one utterance and returns its lower-cased text
///
/// `AsrTimeout` and `AsrUnintelligible` are ordinary outcomes meaning nothing
/// usable was said.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Listen once within `window`
    async fn listen(&self, window: ListenWindow) -> Result<String>;
}

/// Progress of a speech segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Waiting for speech
    Idle,
    /// Speech started, accumulating
    Speaking,
    /// Speaker paused after enough speech
    Complete,
}

/// Energy-based speech segmentation
pub struct SpeechSegmenter {
    threshold: f32,
    state: SegmentState,
    speech: Vec<f32>,
    silence: usize,
}

impl SpeechSegmenter {
    /// Create a segmenter with the given RMS threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self {
            threshold,
            state: SegmentState::Idle,
            speech: Vec::new(),
            silence: 0,
        }
    }

    /// Feed samples and return the updated state
    pub fn process(&mut self, samples: &[f32]) -> SegmentState {
        if samples.is_empty() {
            return self.state;
        }

        let is_speech = calculate_energy(samples) > self.threshold;

        match self.state {
            SegmentState::Idle => {
                if is_speech {
                    self.state = SegmentState::Speaking;
                    self.speech.extend_from_slice(samples);
                    self.silence = 0;
                    tracing::trace!("speech started");
                }
            }
            SegmentState::Speaking => {
                self.speech.extend_from_slice(samples);

                if is_speech {
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                if self.silence > PAUSE_SAMPLES {
                    if self.speech.len() > MIN_SPEECH_SAMPLES + self.silence {
                        self.state = SegmentState::Complete;
                    } else {
                        // A click or cough, not an utterance
                        self.reset();
                    }
                }
            }
            SegmentState::Complete => {}
        }

        self.state
    }

    /// Take the recorded speech
    pub fn take_speech(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.speech)
    }

    /// Reset to idle
    pub fn reset(&mut self) {
        self.state = SegmentState::Idle;
        self.speech.clear();
        self.silence = 0;
    }
}

/// Recognizer that records from the shared microphone and transcribes over HTTP
pub struct MicRecognizer {
    microphone: Microphone,
    stt: SpeechToText,
    energy_threshold: f32,
}

impl MicRecognizer {
    /// Create a recognizer
    #[must_use]
    pub const fn new(microphone: Microphone, stt: SpeechToText, energy_threshold: f32) -> Self {
        Self {
            microphone,
            stt,
            energy_threshold,
        }
    }

    /// Record one utterance while holding the microphone
    async fn record(&self, window: ListenWindow) -> Result<Vec<f32>> {
        let lease = self.microphone.acquire().await;
        // Anything buffered predates this capture, including our own speech
        lease.clear();

        let threshold = if window.calibration.is_zero() {
            self.energy_threshold
        } else {
            let mut ambient = Vec::new();
            let calibrating = Instant::now();
            while calibrating.elapsed() < window.calibration {
                tokio::time::sleep(POLL_INTERVAL).await;
                ambient.extend(lease.take());
            }
            let threshold = calibrated_threshold(self.energy_threshold, &ambient);
            tracing::trace!(threshold, samples = ambient.len(), "ambient calibration");
            threshold
        };

        let mut segmenter = SpeechSegmenter::new(threshold);
        let started = Instant::now();
        let mut speech_started: Option<Instant> = None;

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            let state = segmenter.process(&lease.take());
            match state {
                SegmentState::Idle => {
                    speech_started = None;
                    if started.elapsed() >= window.timeout {
                        return Err(Error::AsrTimeout(window.timeout));
                    }
                }
                SegmentState::Speaking => {
                    let since = *speech_started.get_or_insert_with(Instant::now);
                    if since.elapsed() >= window.phrase_limit {
                        tracing::trace!("phrase limit reached");
                        return Ok(segmenter.take_speech());
                    }
                }
                SegmentState::Complete => return Ok(segmenter.take_speech()),
            }
        }
    }
}

#[async_trait]
impl SpeechRecognizer for MicRecognizer {
    async fn listen(&self, window: ListenWindow) -> Result<String> {
        // The lease is released before the network round-trip
        let speech = self.record(window).await?;

        let wav = samples_to_wav(&speech, SAMPLE_RATE)?;
        let text = normalize_transcript(&self.stt.transcribe(&wav).await?);

        if text.is_empty() {
            return Err(Error::AsrUnintelligible);
        }

        tracing::debug!(heard = %text, "recognized");
        Ok(text)
    }
}

/// Punctuation the STT backends attach to words
const SENTENCE_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':', '"'];

/// Lower-case a transcript and strip sentence punctuation around words
#[must_use]
pub fn normalize_transcript(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.trim_matches(SENTENCE_PUNCTUATION))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Check whether `text` contains any of `phrases`
#[must_use]
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| text.contains(phrase))
}

/// Raise `configured` above the background level measured in `ambient`
#[must_use]
pub fn calibrated_threshold(configured: f32, ambient: &[f32]) -> f32 {
    configured.max(calculate_energy(ambient) * AMBIENT_RATIO)
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn tone(duration_secs: f32) -> Vec<f32> {
        let n = (SAMPLE_RATE as f32 * duration_secs) as usize;
        (0..n)
            .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn silence(duration_secs: f32) -> Vec<f32> {
        vec![0.0; (SAMPLE_RATE as f32 * duration_secs) as usize]
    }

    #[test]
    fn test_energy_calculation() {
        assert!(calculate_energy(&[0.0; 100]) < 0.001);
        assert!(calculate_energy(&[0.5; 100]) > 0.4);
    }

    #[test]
    fn test_silence_stays_idle() {
        let mut seg = SpeechSegmenter::new(DEFAULT_ENERGY_THRESHOLD);
        assert_eq!(seg.process(&silence(1.0)), SegmentState::Idle);
    }

    #[test]
    fn test_speech_then_pause_completes() {
        let mut seg = SpeechSegmenter::new(DEFAULT_ENERGY_THRESHOLD);
        assert_eq!(seg.process(&tone(0.5)), SegmentState::Speaking);
        assert_eq!(seg.process(&silence(0.5)), SegmentState::Speaking);
        assert_eq!(seg.process(&silence(0.5)), SegmentState::Complete);

        let speech = seg.take_speech();
        assert_eq!(speech.len(), tone(0.5).len() + silence(1.0).len());
    }

    #[test]
    fn test_short_blip_resets() {
        let mut seg = SpeechSegmenter::new(DEFAULT_ENERGY_THRESHOLD);
        seg.process(&tone(0.05));
        assert_eq!(seg.process(&silence(1.0)), SegmentState::Idle);
        assert!(seg.take_speech().is_empty());
    }

    #[test]
    fn test_normalize_transcript() {
        assert_eq!(normalize_transcript("  Play Bohemian Rhapsody. "), "play bohemian rhapsody");
        assert_eq!(normalize_transcript("Stop!"), "stop");
        assert_eq!(normalize_transcript("..."), "");
        assert_eq!(
            normalize_transcript("add song a|Title|Artist|/music/a.mp3"),
            "add song a|title|artist|/music/a.mp3"
        );
    }

    #[test]
    fn test_contains_any() {
        assert!(contains_any("please stop now", &["stop", "exit"]));
        assert!(!contains_any("keep going", &["stop", "exit"]));
    }

    #[test]
    fn test_listen_window() {
        let window = ListenWindow::seconds(3);
        assert_eq!(window.timeout, Duration::from_secs(3));
        assert_eq!(window.phrase_limit, Duration::from_secs(3));
        assert!(window.calibration.is_zero());
        assert_eq!(
            window.with_calibration(AMBIENT_CALIBRATION).calibration,
            AMBIENT_CALIBRATION
        );
    }

    #[tokio::test]
    async fn test_capture_times_out_without_speech() {
        let mic = Microphone::new();
        let stt = SpeechToText::new_whisper("test-key".into(), "whisper-1".into(), "en".into(), None)
            .unwrap();
        let recognizer = MicRecognizer::new(mic.clone(), stt, DEFAULT_ENERGY_THRESHOLD);

        let window = ListenWindow {
            timeout: Duration::from_millis(120),
            phrase_limit: Duration::from_secs(1),
            calibration: Duration::ZERO,
        };
        let err = recognizer.listen(window).await.unwrap_err();
        assert!(matches!(err, Error::AsrTimeout(_)));
        assert!(!mic.is_busy());
    }

    #[test]
    fn test_calibrated_threshold() {
        assert!((calibrated_threshold(0.03, &[]) - 0.03).abs() < f32::EPSILON);
        assert!((calibrated_threshold(0.03, &[0.01; 800]) - 0.03).abs() < f32::EPSILON);
        assert!((calibrated_threshold(0.03, &[0.2; 800]) - 0.3).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_steady_background_noise_is_not_speech() {
        let mic = Microphone::new();
        let stt = SpeechToText::new_whisper("test-key".into(), "whisper-1".into(), "en".into(), None)
            .unwrap();
        let recognizer = MicRecognizer::new(mic.clone(), stt, DEFAULT_ENERGY_THRESHOLD);

        // A hum well above the configured threshold, delivered in real time
        let feeder = mic.clone();
        let hum = tokio::spawn(async move {
            let chunk: Vec<f32> = (0..320).map(|i| if i % 2 == 0 { 0.1 } else { -0.1 }).collect();
            loop {
                feeder.push(&chunk);
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let window = ListenWindow {
            timeout: Duration::from_millis(300),
            phrase_limit: Duration::from_secs(2),
            calibration: Duration::from_millis(200),
        };
        let err = recognizer.listen(window).await.unwrap_err();
        hum.abort();

        assert!(matches!(err, Error::AsrTimeout(_)));
    }
}
