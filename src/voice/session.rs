//! Spoken output
//!
//! [`SpeechSession::speak`] plays a synthesized clip while a background task
//! listens for "stop". Whichever happens first, the clip ending or the user
//! interrupting, decides the outcome. The player process, the clip file and the
//! listener are all gone by the time `speak` returns.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use super::recognizer::{ListenWindow, SpeechRecognizer, contains_any};
use super::tts::Synthesizer;
use crate::Result;
use crate::playback::Player;

/// Words that cut a spoken reply short
pub const INTERRUPT_PHRASES: &[&str] = &["stop", "exit", "quit"];

/// Capture length used while listening for an interruption
pub const INTERRUPT_WINDOW: ListenWindow = ListenWindow::seconds(2);

/// Pause after a recognizer failure before listening again
const LISTEN_BACKOFF: Duration = Duration::from_millis(250);

/// One-shot flag raised by the interrupt listener
#[derive(Debug, Clone, Default)]
pub struct InterruptSignal(CancellationToken);

impl InterruptSignal {
    /// Create an unset signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal; later calls have no effect
    pub fn fire(&self) {
        self.0.cancel();
    }

    /// Check whether the signal has been raised
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolve once the signal is raised
    pub async fn fired(&self) {
        self.0.cancelled().await;
    }
}

/// Synthesizes and plays spoken responses
pub struct SpeechSession {
    synthesizer: Arc<dyn Synthesizer>,
    player: Arc<dyn Player>,
    recognizer: Arc<dyn SpeechRecognizer>,
    interrupt_window: ListenWindow,
}

impl SpeechSession {
    /// Create a session
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
        recognizer: Arc<dyn SpeechRecognizer>,
    ) -> Self {
        Self {
            synthesizer,
            player,
            recognizer,
            interrupt_window: INTERRUPT_WINDOW,
        }
    }

    /// Override the capture window used by the interrupt listener
    #[must_use]
    pub const fn with_interrupt_window(mut self, window: ListenWindow) -> Self {
        self.interrupt_window = window;
        self
    }

    /// Speak `text`, returning true if the user interrupted it
    ///
    /// Synthesis and playback failures are logged and reported as "not
    /// interrupted".
    pub async fn speak(&self, text: &str) -> bool {
        match self.speak_interruptible(text).await {
            Ok(interrupted) => interrupted,
            Err(e) => {
                tracing::warn!(error = %e, "speech skipped");
                false
            }
        }
    }

    /// Speak `text` to completion without listening for interruptions
    pub async fn announce(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        let result = async {
            let clip = self.render(text).await?;
            let mut handle = self.player.play_speech(clip.path()).await?;
            handle.wait().await;
            Ok::<_, crate::Error>(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "announcement skipped");
        }
    }

    async fn speak_interruptible(&self, text: &str) -> Result<bool> {
        let clip = self.render(text).await?;
        let mut handle = self.player.play_speech(clip.path()).await?;
        tracing::debug!(chars = text.len(), "speaking");

        let interrupt = InterruptSignal::new();
        let stop = CancellationToken::new();
        // Both fire if this future is dropped before the listener is joined
        let _stop_guard = stop.clone().drop_guard();
        let listener = AbortOnDropHandle::new(tokio::spawn(listen_for_interrupt(
            Arc::clone(&self.recognizer),
            self.interrupt_window,
            interrupt.clone(),
            stop.clone(),
        )));

        let interrupted = tokio::select! {
            biased;
            () = interrupt.fired() => true,
            () = handle.wait() => false,
        };

        if interrupted {
            handle.stop().await;
            tracing::info!("speech interrupted");
        }

        // The listener must let go of the microphone before we return
        stop.cancel();
        if let Err(e) = listener.await {
            tracing::warn!(error = %e, "interrupt listener failed");
        }

        Ok(interrupted)
    }

    /// Write synthesized audio to a temporary clip, removed when dropped
    async fn render(&self, text: &str) -> Result<NamedTempFile> {
        let audio = self.synthesizer.synthesize(text).await?;

        let mut clip = tempfile::Builder::new()
            .prefix("bloom-tts-")
            .suffix(".mp3")
            .tempfile()?;
        clip.write_all(&audio)?;
        clip.flush()?;

        Ok(clip)
    }
}

/// Listen in short windows until an interrupt phrase is heard or `stop` is cancelled
async fn listen_for_interrupt(
    recognizer: Arc<dyn SpeechRecognizer>,
    window: ListenWindow,
    interrupt: InterruptSignal,
    stop: CancellationToken,
) {
    loop {
        let heard = tokio::select! {
            () = stop.cancelled() => return,
            heard = recognizer.listen(window) => heard,
        };

        match heard {
            Ok(text) if contains_any(&text, INTERRUPT_PHRASES) => {
                tracing::debug!(heard = %text, "interrupt phrase");
                interrupt.fire();
                return;
            }
            Ok(text) => tracing::trace!(heard = %text, "ignored during speech"),
            Err(e) if e.is_no_speech() => {}
            Err(e) => {
                tracing::debug!(error = %e, "interrupt listening error");
                tokio::select! {
                    () = stop.cancelled() => return,
                    () = tokio::time::sleep(LISTEN_BACKOFF) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_is_single_shot() {
        let signal = InterruptSignal::new();
        assert!(!signal.is_set());

        let reader = signal.clone();
        signal.fire();
        signal.fire();
        assert!(reader.is_set());
    }

    #[tokio::test]
    async fn test_fired_resolves_after_fire() {
        let signal = InterruptSignal::new();
        let writer = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.fire();
        });

        tokio::time::timeout(Duration::from_secs(1), signal.fired())
            .await
            .unwrap();
    }
}
