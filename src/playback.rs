//! External media-player processes
//!
//! Tracks and synthesized speech are played by spawning a command-line player
//! for the file. A [`PlaybackHandle`] owns the running process until it is
//! stopped or exits on its own.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::{Error, Result};

/// How long a freshly launched track player must stay alive to count as started
pub const LAUNCH_GRACE: Duration = Duration::from_millis(500);

/// A live playback process
#[async_trait]
pub trait PlaybackHandle: Send {
    /// Non-blocking check whether playback is still going
    fn is_running(&mut self) -> bool;

    /// Terminate playback; a no-op once it has finished
    async fn stop(&mut self);

    /// Wait until playback ends on its own
    async fn wait(&mut self);
}

/// Launches playback for audio files
#[async_trait]
pub trait Player: Send + Sync {
    /// Start playing a music track
    async fn play_track(&self, path: &Path) -> Result<Box<dyn PlaybackHandle>>;

    /// Start playing a synthesized speech clip
    async fn play_speech(&self, path: &Path) -> Result<Box<dyn PlaybackHandle>>;
}

/// A player program and the arguments placed before the file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    /// Program name or path
    pub program: String,

    /// Arguments inserted before the file path
    pub args: Vec<String>,
}

impl PlayerCommand {
    /// Build a command from a program name and leading arguments
    #[must_use]
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
        }
    }

    /// Parse a whitespace-separated command line such as `"ffplay -nodisp -autoexit"`
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?.to_string();
        Some(Self {
            program,
            args: parts.map(ToString::to_string).collect(),
        })
    }

    fn spawn(&self, path: &Path) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

/// Default fallback order for music tracks
#[must_use]
pub fn default_track_players() -> Vec<PlayerCommand> {
    vec![
        PlayerCommand::new("afplay", &[]),
        PlayerCommand::new("mpg123", &[]),
        PlayerCommand::new("ffplay", &["-nodisp", "-autoexit"]),
    ]
}

/// Default program for speech clips
#[must_use]
pub fn default_speech_player() -> PlayerCommand {
    if cfg!(target_os = "macos") {
        PlayerCommand::new("afplay", &[])
    } else {
        PlayerCommand::new("mpg123", &["-q"])
    }
}

/// Starts and supervises player processes
#[derive(Debug, Clone)]
pub struct PlaybackController {
    track_players: Vec<PlayerCommand>,
    speech_player: PlayerCommand,
    grace: Duration,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new(default_track_players(), default_speech_player())
    }
}

impl PlaybackController {
    /// Create a controller with explicit player commands
    #[must_use]
    pub const fn new(track_players: Vec<PlayerCommand>, speech_player: PlayerCommand) -> Self {
        Self {
            track_players,
            speech_player,
            grace: LAUNCH_GRACE,
        }
    }

    /// Override how long a track player must survive after launch
    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Start a track with the first player that launches and keeps running
    ///
    /// # Errors
    ///
    /// Returns `PlaybackUnavailable` if the file is missing or no player works
    pub async fn start(&self, path: &Path) -> Result<ProcessHandle> {
        if !path.exists() {
            return Err(Error::PlaybackUnavailable(format!(
                "file not found: {}",
                path.display()
            )));
        }

        for candidate in &self.track_players {
            if which::which(&candidate.program).is_err() {
                tracing::debug!(player = %candidate.program, "player not installed");
                continue;
            }

            tracing::debug!(player = %candidate.program, "trying player");
            let mut child = match candidate.spawn(path) {
                Ok(child) => child,
                Err(e) => {
                    tracing::debug!(player = %candidate.program, error = %e, "player failed to launch");
                    continue;
                }
            };

            tokio::time::sleep(self.grace).await;

            match child.try_wait() {
                Ok(None) => {
                    tracing::info!(player = %candidate.program, file = %path.display(), "playback started");
                    return Ok(ProcessHandle::new(child, &candidate.program));
                }
                Ok(Some(status)) => {
                    tracing::debug!(player = %candidate.program, %status, "player exited early");
                }
                Err(e) => {
                    tracing::debug!(player = %candidate.program, error = %e, "player status unknown");
                }
            }
        }

        Err(Error::PlaybackUnavailable(format!(
            "no player could play {}",
            path.display()
        )))
    }

    /// Start the speech player for a synthesized clip
    ///
    /// # Errors
    ///
    /// Returns `PlaybackUnavailable` if the speech player cannot be launched
    pub fn start_speech(&self, path: &Path) -> Result<ProcessHandle> {
        let child = self.speech_player.spawn(path).map_err(|e| {
            Error::PlaybackUnavailable(format!("{}: {e}", self.speech_player.program))
        })?;

        Ok(ProcessHandle::new(child, &self.speech_player.program))
    }
}

#[async_trait]
impl Player for PlaybackController {
    async fn play_track(&self, path: &Path) -> Result<Box<dyn PlaybackHandle>> {
        let handle = self.start(path).await?;
        Ok(Box::new(handle))
    }

    async fn play_speech(&self, path: &Path) -> Result<Box<dyn PlaybackHandle>> {
        let handle = self.start_speech(path)?;
        Ok(Box::new(handle))
    }
}

/// Playback backed by a child process
///
/// The process is killed if the handle is dropped while still running.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    program: String,
    finished: bool,
}

impl ProcessHandle {
    fn new(child: Child, program: &str) -> Self {
        Self {
            child,
            program: program.to_string(),
            finished: false,
        }
    }
}

#[async_trait]
impl PlaybackHandle for ProcessHandle {
    fn is_running(&mut self) -> bool {
        if self.finished {
            return false;
        }

        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) | Err(_) => {
                self.finished = true;
                false
            }
        }
    }

    async fn stop(&mut self) {
        if !self.is_running() {
            return;
        }

        if let Err(e) = self.child.kill().await {
            tracing::warn!(player = %self.program, error = %e, "failed to stop player");
        } else {
            tracing::debug!(player = %self.program, "playback stopped");
        }
        self.finished = true;
    }

    async fn wait(&mut self) {
        if self.finished {
            return;
        }

        match self.child.wait().await {
            Ok(status) => tracing::trace!(player = %self.program, %status, "playback finished"),
            Err(e) => tracing::warn!(player = %self.program, error = %e, "failed to wait for player"),
        }
        self.finished = true;
    }
}
