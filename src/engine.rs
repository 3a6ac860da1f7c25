//! Wake word engine
//!
//! The top-level loop. It polls audio frames until the wake word is detected,
//! then runs one command cycle: acknowledge, capture a command, and route it to
//! the music subsystem or the language model.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::dispatch::{CommandDispatcher, DispatchResult};
use crate::llm::{self, LanguageModel};
use crate::voice::{
    AMBIENT_CALIBRATION, FrameSource, ListenWindow, SpeechRecognizer, SpeechSession, WakeWordDetector, contains_any,
};

/// Spoken once at startup
pub const DEFAULT_GREETING: &str = "Hello, I am your voice assistant. Say Hi Bloom to activate me.";

/// Spoken when the wake word is heard
pub const DEFAULT_ACKNOWLEDGMENT: &str = "Hi Bloom detected! What can I help you with?";

/// Spoken before the engine exits
pub const DEFAULT_FAREWELL: &str = "Goodbye!";

/// Words that end the session
pub const GOODBYE_PHRASES: &[&str] = &["stop", "exit", "quit"];

/// Tunables for the engine loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Startup announcement; empty disables it
    pub greeting: String,

    /// Announcement after the wake word
    pub acknowledgment: String,

    /// Announcement before exiting
    pub farewell: String,

    /// Pause between the acknowledgment and command capture
    pub settle: Duration,

    /// Capture window for each command attempt
    pub command_window: ListenWindow,

    /// Command capture attempts before giving up
    pub attempts: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            acknowledgment: DEFAULT_ACKNOWLEDGMENT.to_string(),
            farewell: DEFAULT_FAREWELL.to_string(),
            settle: Duration::from_secs(1),
            command_window: ListenWindow::seconds(8).with_calibration(AMBIENT_CALIBRATION),
            attempts: 3,
        }
    }
}

/// What the engine does after a command cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Go back to polling for the wake word
    Continue,
    /// The user said goodbye
    Exit,
}

/// Why [`WakeWordEngine::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user said goodbye
    Goodbye,
    /// The shutdown token was cancelled
    Shutdown,
}

/// Drives wake word detection and command cycles
pub struct WakeWordEngine<F, D> {
    frames: F,
    detector: D,
    speech: Arc<SpeechSession>,
    recognizer: Arc<dyn SpeechRecognizer>,
    llm: Arc<dyn LanguageModel>,
    dispatcher: Option<CommandDispatcher>,
    options: EngineOptions,
}

impl<F, D> WakeWordEngine<F, D>
where
    F: FrameSource,
    D: WakeWordDetector,
{
    /// Create an engine with music commands disabled
    #[must_use]
    pub fn new(
        frames: F,
        detector: D,
        speech: Arc<SpeechSession>,
        recognizer: Arc<dyn SpeechRecognizer>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            frames,
            detector,
            speech,
            recognizer,
            llm,
            dispatcher: None,
            options: EngineOptions::default(),
        }
    }

    /// Enable music commands
    #[must_use]
    pub fn with_music(mut self, dispatcher: CommandDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Replace the loop tunables
    #[must_use]
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether music commands are routed before the language model
    #[must_use]
    pub const fn music_enabled(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Run until the user says goodbye or `shutdown` is cancelled
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self, shutdown: CancellationToken) -> StopReason {
        if !self.options.greeting.is_empty() {
            tokio::select! {
                () = shutdown.cancelled() => return StopReason::Shutdown,
                () = self.speech.announce(&self.options.greeting) => {}
            }
            self.frames.discard();
        }

        let frame_length = self.detector.frame_length();
        tracing::info!(frame_length, music = self.music_enabled(), "listening for wake word");

        loop {
            let frame = tokio::select! {
                () = shutdown.cancelled() => return StopReason::Shutdown,
                frame = self.frames.next_frame(frame_length) => frame,
            };

            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "audio read error");
                    continue;
                }
            };

            match self.detector.process(&frame) {
                Ok(Some(keyword)) => {
                    tracing::info!(keyword, "wake word detected");

                    let outcome = tokio::select! {
                        () = shutdown.cancelled() => return StopReason::Shutdown,
                        outcome = self.wake_cycle() => outcome,
                    };

                    if outcome == CycleOutcome::Exit {
                        return StopReason::Goodbye;
                    }

                    self.frames.discard();
                    tracing::info!("listening for wake word");
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "wake word processing error"),
            }
        }
    }

    /// One full interaction after the wake word
    async fn wake_cycle(&self) -> CycleOutcome {
        self.speech.announce(&self.options.acknowledgment).await;
        tokio::time::sleep(self.options.settle).await;

        let command = self.listen_with_retry().await;
        self.handle_command(&command).await
    }

    /// Capture a command, retrying on silence or recognition failures
    ///
    /// Returns an empty string once every attempt has failed.
    pub async fn listen_with_retry(&self) -> String {
        for attempt in 1..=self.options.attempts {
            match self.recognizer.listen(self.options.command_window).await {
                Ok(text) if !text.is_empty() => {
                    tracing::info!(command = %text, "command heard");
                    return text;
                }
                Ok(_) => tracing::debug!(attempt, "empty command"),
                Err(e) if e.is_no_speech() => tracing::debug!(attempt, reason = %e, "no command"),
                Err(e) => tracing::warn!(attempt, error = %e, "command capture failed"),
            }
        }

        tracing::info!(attempts = self.options.attempts, "no command captured");
        String::new()
    }

    /// Act on a captured command
    pub async fn handle_command(&self, command: &str) -> CycleOutcome {
        if command.is_empty() {
            return CycleOutcome::Continue;
        }

        if contains_any(command, GOODBYE_PHRASES) {
            self.speech.announce(&self.options.farewell).await;
            return CycleOutcome::Exit;
        }

        let handled = match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch(command).await == DispatchResult::Handled,
            None => false,
        };
        if handled {
            return CycleOutcome::Continue;
        }

        let reply = llm::answer(self.llm.as_ref(), command).await;
        let interrupted = self.speech.speak(&reply).await;
        tracing::debug!(interrupted, "reply finished");

        CycleOutcome::Continue
    }
}
