//! Command dispatch
//!
//! Routes a recognized utterance to the music subsystem. Anything that is not
//! a music command comes back as [`DispatchResult::Unhandled`] so the caller
//! can forward it to the language model.

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::MusicCatalog;
use crate::playback::{PlaybackHandle, Player};
use crate::voice::{
    AMBIENT_CALIBRATION, ListenWindow, SpeechRecognizer, SpeechSession, contains_any,
};

/// Phrases that stop a playing track
pub const STOP_MUSIC_PHRASES: &[&str] = &["stop music", "stop song", "pause music", "stop"];

/// Stop requests recognized when nothing is playing
const STOP_REQUEST_PHRASES: &[&str] = &["stop music", "stop song", "pause music"];

/// Phrases that ask for the catalog listing
const LIST_PHRASES: &[&str] = &["list songs", "show songs"];

/// Capture length while listening for a stop phrase during playback
pub const STOP_WINDOW: ListenWindow =
    ListenWindow::seconds(3).with_calibration(AMBIENT_CALIBRATION);

/// Pause after a recognizer failure before listening again
const LISTEN_BACKOFF: Duration = Duration::from_millis(250);

const PLAY_PREFIX: &str = "play ";
const ADD_PREFIX: &str = "add song ";
const REMOVE_PREFIX: &str = "remove song ";

const ADD_USAGE: &str = "Please use format: add song song_name|title|artist|file_path";
const NOT_IN_CATALOG: &str = "Song is not available in the database.";
const NOTHING_PLAYING: &str = "No music is currently playing.";
const MUSIC_STOPPED: &str = "Music stopped.";

/// Outcome of dispatching one utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// A music command ran and the user got a response
    Handled,
    /// Not a music command
    Unhandled,
}

/// A parsed music command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MusicCommand<'a> {
    /// Play the best match for a query
    Play(&'a str),
    /// Add a song from pipe-delimited fields
    Add(&'a str),
    /// Remove a song by name
    Remove(&'a str),
    /// Speak the catalog listing
    List,
    /// Stop phrase with nothing playing
    Stop,
}

impl<'a> MusicCommand<'a> {
    /// Classify an utterance, matching keywords case-insensitively
    ///
    /// Arguments are sliced from the original text so their case survives.
    #[must_use]
    pub fn parse(utterance: &'a str) -> Option<Self> {
        let text = utterance.trim();
        let lower = text.to_lowercase();

        if let Some(rest) = strip_prefix_ignore_case(text, PLAY_PREFIX) {
            return Some(Self::Play(rest.trim()));
        }
        if let Some(rest) = strip_prefix_ignore_case(text, ADD_PREFIX) {
            return Some(Self::Add(rest.trim()));
        }
        if let Some(rest) = strip_prefix_ignore_case(text, REMOVE_PREFIX) {
            return Some(Self::Remove(rest.trim()));
        }
        if contains_any(&lower, LIST_PHRASES) {
            return Some(Self::List);
        }
        if contains_any(&lower, STOP_REQUEST_PHRASES) {
            return Some(Self::Stop);
        }

        None
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        text.get(prefix.len()..)
    } else {
        None
    }
}

/// Executes music commands and speaks their results
pub struct CommandDispatcher {
    catalog: MusicCatalog,
    player: Arc<dyn Player>,
    speech: Arc<SpeechSession>,
    recognizer: Arc<dyn SpeechRecognizer>,
    stop_window: ListenWindow,
}

impl CommandDispatcher {
    /// Create a dispatcher
    #[must_use]
    pub fn new(
        catalog: MusicCatalog,
        player: Arc<dyn Player>,
        speech: Arc<SpeechSession>,
        recognizer: Arc<dyn SpeechRecognizer>,
    ) -> Self {
        Self {
            catalog,
            player,
            speech,
            recognizer,
            stop_window: STOP_WINDOW,
        }
    }

    /// Override the capture window used while a track plays
    #[must_use]
    pub const fn with_stop_window(mut self, window: ListenWindow) -> Self {
        self.stop_window = window;
        self
    }

    /// Dispatch one recognized utterance
    pub async fn dispatch(&self, utterance: &str) -> DispatchResult {
        let Some(command) = MusicCommand::parse(utterance) else {
            return DispatchResult::Unhandled;
        };

        tracing::debug!(?command, "music command");

        match command {
            MusicCommand::Play(query) => self.play(query).await,
            MusicCommand::Add(fields) => self.add(fields).await,
            MusicCommand::Remove(name) => self.remove(name).await,
            MusicCommand::List => {
                self.speech.speak(&self.catalog.list()).await;
            }
            MusicCommand::Stop => {
                self.speech.speak(NOTHING_PLAYING).await;
            }
        }

        DispatchResult::Handled
    }

    async fn play(&self, query: &str) {
        let Some(song) = self.catalog.search(query) else {
            tracing::info!(query, "song not found");
            self.speech.speak(NOT_IN_CATALOG).await;
            return;
        };

        if !song.file_path.exists() {
            tracing::warn!(file = %song.file_path.display(), "song file missing");
            self.speech
                .speak(&format!("Song file not found: {}", song.title))
                .await;
            return;
        }

        let mut handle = match self.player.play_track(&song.file_path).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, title = %song.title, "playback failed");
                self.speech
                    .speak(&format!(
                        "Could not play {} with any available player",
                        song.title
                    ))
                    .await;
                return;
            }
        };

        tracing::info!(title = %song.title, artist = %song.artist, "now playing");
        self.speech
            .speak(&format!("Now playing: {} by {}", song.title, song.artist))
            .await;

        self.listen_for_stop(handle.as_mut()).await;

        // Nothing outlives the cycle that started it
        if handle.is_running() {
            handle.stop().await;
        }
    }

    /// Listen for a stop phrase until the track ends on its own
    async fn listen_for_stop(&self, handle: &mut dyn PlaybackHandle) {
        while handle.is_running() {
            match self.recognizer.listen(self.stop_window).await {
                Ok(text) if contains_any(&text, STOP_MUSIC_PHRASES) => {
                    tracing::info!(heard = %text, "stopping music");
                    handle.stop().await;
                    self.speech.speak(MUSIC_STOPPED).await;
                    return;
                }
                Ok(text) => tracing::debug!(heard = %text, "ignored during playback"),
                Err(e) if e.is_no_speech() => {}
                Err(e) => {
                    tracing::debug!(error = %e, "stop listening error");
                    tokio::time::sleep(LISTEN_BACKOFF).await;
                }
            }
        }

        tracing::debug!("track finished");
    }

    async fn add(&self, fields: &str) {
        let parts: Vec<&str> = fields.split('|').map(str::trim).collect();

        let [name, title, artist, path] = parts.as_slice() else {
            self.speech.speak(ADD_USAGE).await;
            return;
        };

        if name.is_empty() {
            self.speech.speak(ADD_USAGE).await;
            return;
        }

        let reply = match self.catalog.add(name, title, artist, path) {
            Ok(()) => format!("Added {title} to database."),
            Err(e) => {
                tracing::error!(error = %e, "failed to add song");
                format!("Could not save {title} to the database.")
            }
        };
        self.speech.speak(&reply).await;
    }

    async fn remove(&self, name: &str) {
        let reply = match self.catalog.remove(name) {
            Ok(true) => format!("Removed {name} from database."),
            Ok(false) => format!("Song {name} not found in database."),
            Err(e) => {
                tracing::error!(error = %e, "failed to remove song");
                format!("Could not update the database for {name}.")
            }
        };
        self.speech.speak(&reply).await;
    }
}
