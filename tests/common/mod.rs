//! Shared test utilities
//!
//! In-memory stand-ins for the microphone, speech backends, media players and
//! language model so the interaction logic can run without hardware.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use bloom_assistant::voice::{
    FrameSource, ListenWindow, SpeechRecognizer, SpeechSession, Synthesizer, WakeWordDetector,
};
use bloom_assistant::{Error, LanguageModel, PlaybackHandle, Player, Result};

/// One scripted recognizer outcome
#[derive(Debug, Clone)]
pub enum Heard {
    Text(&'static str),
    Timeout,
    Unintelligible,
    Failure,
}

/// Recognizer that replays a script, then times out forever
pub struct ScriptedRecognizer {
    script: Mutex<VecDeque<Heard>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedRecognizer {
    pub fn new(script: impl IntoIterator<Item = Heard>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(20),
        })
    }

    /// A recognizer that never hears anything
    pub fn silent() -> Arc<Self> {
        Self::new([])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn listen(&self, window: ListenWindow) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Heard::Text(text)) => Ok(text.to_string()),
            Some(Heard::Unintelligible) => Err(Error::AsrUnintelligible),
            Some(Heard::Failure) => Err(Error::Stt("backend down".to_string())),
            Some(Heard::Timeout) | None => Err(Error::AsrTimeout(window.timeout)),
        }
    }
}

/// Synthesizer that records what it was asked to say
#[derive(Default)]
pub struct RecordingSynthesizer {
    spoken: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingSynthesizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if self.fail {
            return Err(Error::Tts("synthesis offline".to_string()));
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(b"ID3 fake audio".to_vec())
    }
}

/// Playback that runs for a fixed time unless stopped
pub struct FakeHandle {
    deadline: Instant,
    stopped: bool,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl PlaybackHandle for FakeHandle {
    fn is_running(&mut self) -> bool {
        !self.stopped && Instant::now() < self.deadline
    }

    async fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stopped = true;
    }

    async fn wait(&mut self) {
        if !self.stopped {
            tokio::time::sleep_until(self.deadline).await;
        }
    }
}

/// Player that pretends to play files and counts stop requests
pub struct FakePlayer {
    track_length: Duration,
    speech_length: Duration,
    track_fails: bool,
    tracks: Mutex<Vec<PathBuf>>,
    speech_clips: Mutex<Vec<PathBuf>>,
    track_stops: Arc<AtomicUsize>,
    speech_stops: Arc<AtomicUsize>,
}

impl FakePlayer {
    pub fn new(track_length: Duration, speech_length: Duration) -> Arc<Self> {
        Arc::new(Self::build(track_length, speech_length, false))
    }

    /// A player whose every track launch fails
    pub fn broken() -> Arc<Self> {
        Arc::new(Self::build(
            Duration::from_secs(1),
            Duration::from_millis(30),
            true,
        ))
    }

    fn build(track_length: Duration, speech_length: Duration, track_fails: bool) -> Self {
        Self {
            track_length,
            speech_length,
            track_fails,
            tracks: Mutex::new(Vec::new()),
            speech_clips: Mutex::new(Vec::new()),
            track_stops: Arc::new(AtomicUsize::new(0)),
            speech_stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn tracks(&self) -> Vec<PathBuf> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn speech_clips(&self) -> usize {
        self.speech_clips.lock().unwrap().len()
    }

    /// Paths of every speech clip handed to the player
    pub fn speech_clip_paths(&self) -> Vec<PathBuf> {
        self.speech_clips.lock().unwrap().clone()
    }

    pub fn track_stops(&self) -> usize {
        self.track_stops.load(Ordering::SeqCst)
    }

    pub fn speech_stops(&self) -> usize {
        self.speech_stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Player for FakePlayer {
    async fn play_track(&self, path: &Path) -> Result<Box<dyn PlaybackHandle>> {
        if self.track_fails {
            return Err(Error::PlaybackUnavailable("no player".to_string()));
        }
        self.tracks.lock().unwrap().push(path.to_path_buf());
        Ok(Box::new(FakeHandle {
            deadline: Instant::now() + self.track_length,
            stopped: false,
            stops: Arc::clone(&self.track_stops),
        }))
    }

    async fn play_speech(&self, path: &Path) -> Result<Box<dyn PlaybackHandle>> {
        assert!(path.exists(), "speech clip must exist while playing");
        self.speech_clips.lock().unwrap().push(path.to_path_buf());
        Ok(Box::new(FakeHandle {
            deadline: Instant::now() + self.speech_length,
            stopped: false,
            stops: Arc::clone(&self.speech_stops),
        }))
    }
}

/// Language model with a canned reply
pub struct FakeLlm {
    reply: std::result::Result<String, fn() -> Error>,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: fn() -> Error) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for FakeLlm {
    async fn ask(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(error) => Err(error()),
        }
    }
}

/// Frame length used by the scripted detector
pub const FRAME_LENGTH: usize = 512;

/// A frame the scripted detector reports as the wake word
pub fn wake_frame() -> Vec<i16> {
    let mut frame = vec![0; FRAME_LENGTH];
    frame[0] = 1;
    frame
}

/// A frame with nothing in it
pub fn quiet_frame() -> Vec<i16> {
    vec![0; FRAME_LENGTH]
}

/// Stands in for a failed audio read
pub fn dropped_frame() -> Vec<i16> {
    Vec::new()
}

/// A frame the scripted detector fails to process
pub fn garbled_frame() -> Vec<i16> {
    let mut frame = vec![0; FRAME_LENGTH];
    frame[0] = 2;
    frame
}

/// Frame source that replays frames, then yields silence
///
/// An empty frame in the script is reported as a read error.
pub struct ScriptedFrames {
    frames: VecDeque<Vec<i16>>,
    discards: Arc<AtomicUsize>,
}

impl ScriptedFrames {
    pub fn new(frames: impl IntoIterator<Item = Vec<i16>>) -> (Self, Arc<AtomicUsize>) {
        let discards = Arc::new(AtomicUsize::new(0));
        let source = Self {
            frames: frames.into_iter().collect(),
            discards: Arc::clone(&discards),
        };
        (source, discards)
    }
}

#[async_trait]
impl FrameSource for ScriptedFrames {
    async fn next_frame(&mut self, len: usize) -> Result<Vec<i16>> {
        assert_eq!(len, FRAME_LENGTH);
        if let Some(frame) = self.frames.pop_front() {
            if frame.is_empty() {
                return Err(Error::Audio("input overflow".to_string()));
            }
            return Ok(frame);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(quiet_frame())
    }

    fn discard(&mut self) {
        self.discards.fetch_add(1, Ordering::SeqCst);
    }
}

/// Detector that fires on frames whose first sample is 1 and fails on 2
pub struct ScriptedDetector;

impl WakeWordDetector for ScriptedDetector {
    fn frame_length(&self) -> usize {
        FRAME_LENGTH
    }

    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
        match frame.first() {
            Some(1) => Ok(Some(0)),
            Some(2) => Err(Error::WakeWord("invalid frame".to_string())),
            _ => Ok(None),
        }
    }
}

/// Speech session wired to fakes
pub fn speech_session(
    synthesizer: &Arc<RecordingSynthesizer>,
    player: &Arc<FakePlayer>,
    listener: &Arc<ScriptedRecognizer>,
) -> Arc<SpeechSession> {
    Arc::new(
        SpeechSession::new(
            Arc::clone(synthesizer) as Arc<dyn Synthesizer>,
            Arc::clone(player) as Arc<dyn Player>,
            Arc::clone(listener) as Arc<dyn SpeechRecognizer>,
        )
        .with_interrupt_window(ListenWindow::seconds(1)),
    )
}
