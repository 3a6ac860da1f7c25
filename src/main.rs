use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use bloom_assistant::voice::{
    AudioCapture, MicRecognizer, MicrophoneFrames, SpeechRecognizer, SpeechSession, Synthesizer,
    WakeWordDetector,
};
use bloom_assistant::{
    CommandDispatcher, Config, LlmClient, MusicCatalog, Player, StopReason,
    WakeWordEngine, llm,
};

/// Bloom - wake word voice assistant with music playback and LLM answers
#[derive(Parser)]
#[command(name = "bloom", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/bloom/config.toml)
    #[arg(short, long, env = "BLOOM_CONFIG")]
    config: Option<PathBuf>,

    /// Picovoice access key
    #[arg(long, env = "BLOOM_ACCESS_KEY", hide_env_values = true)]
    access_key: Option<String>,

    /// Wake word model (.ppn)
    #[arg(long, env = "BLOOM_KEYWORD_PATH")]
    keyword_path: Option<PathBuf>,

    /// Song catalog file
    #[arg(long, env = "BLOOM_CATALOG")]
    catalog: Option<PathBuf>,

    /// Send every command to the language model
    #[arg(long)]
    no_music: bool,

    /// Skip the startup greeting
    #[arg(long)]
    no_greeting: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the assistant (default)
    Run,
    /// Manage the song catalog
    Songs {
        #[command(subcommand)]
        action: SongsCommand,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Ask the language model one question
    Ask {
        /// Question text
        prompt: String,
    },
}

#[derive(Subcommand)]
enum SongsCommand {
    /// List every song
    List,
    /// Add or replace a song
    Add {
        /// Lookup name, as you would say it
        name: String,
        /// Song title
        title: String,
        /// Performing artist
        artist: String,
        /// Audio file
        path: PathBuf,
    },
    /// Remove a song
    Remove {
        /// Lookup name
        name: String,
    },
    /// Show which song a spoken query would play
    Search {
        /// Query text
        query: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,bloom_assistant=info",
        1 => "info,bloom_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref());

    // CLI flags override file and environment
    if let Some(key) = cli.access_key {
        config.wake_word.access_key = Some(key);
    }
    if let Some(path) = cli.keyword_path {
        config.wake_word.keyword_path = Some(path);
    }
    if let Some(path) = cli.catalog {
        config.catalog_path = path;
    }
    if cli.no_music {
        config.music.enabled = false;
    }
    if cli.no_greeting {
        config.phrases.greeting.clear();
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_assistant(config).await,
        Command::Songs { action } => songs(&config, action),
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestTts { text } => test_tts(&config, &text).await,
        Command::Ask { prompt } => ask(&config, &prompt).await,
    }
}

/// Run the wake word loop until goodbye or Ctrl+C
#[allow(clippy::future_not_send)]
async fn run_assistant(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    tracing::debug!(?config, "loaded configuration");

    let detector = open_detector(&config)?;

    let mut capture = AudioCapture::new()?;
    capture.start()?;
    let microphone = capture.microphone();

    let recognizer: Arc<dyn SpeechRecognizer> = Arc::new(MicRecognizer::new(
        microphone.clone(),
        config.speech_to_text()?,
        config.voice.energy_threshold,
    ));
    let player: Arc<dyn Player> = Arc::new(config.playback_controller());
    let speech = Arc::new(SpeechSession::new(
        Arc::new(config.text_to_speech()?),
        Arc::clone(&player),
        Arc::clone(&recognizer),
    ));
    let llm = Arc::new(LlmClient::new(config.llm.clone())?);

    let mut engine = WakeWordEngine::new(
        MicrophoneFrames::new(microphone),
        detector,
        Arc::clone(&speech),
        Arc::clone(&recognizer),
        llm,
    )
    .with_options(config.engine_options());

    if config.music.enabled {
        let catalog = MusicCatalog::new(&config.catalog_path);
        tracing::info!(catalog = %catalog.path().display(), songs = catalog.load().len(), "music enabled");
        engine = engine.with_music(CommandDispatcher::new(catalog, player, speech, recognizer));
    }

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            ctrl_c.cancel();
        }
    });

    tracing::info!("bloom ready - say \"Hi Bloom\"");
    let reason = engine.run(shutdown).await;

    capture.stop();
    match reason {
        StopReason::Goodbye => tracing::info!("assistant stopped by voice command"),
        StopReason::Shutdown => tracing::info!("assistant stopped"),
    }

    Ok(())
}

#[cfg(feature = "porcupine")]
fn open_detector(config: &Config) -> anyhow::Result<Box<dyn WakeWordDetector>> {
    use bloom_assistant::voice::PorcupineDetector;

    let access_key = config.wake_word.access_key.as_deref().unwrap_or_default();
    let keyword_path = config
        .wake_word
        .keyword_path
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("wake word model path not set"))?;

    let detector = PorcupineDetector::new(access_key, keyword_path, config.wake_word.sensitivity)?;
    Ok(Box::new(detector))
}

#[cfg(not(feature = "porcupine"))]
fn open_detector(_config: &Config) -> anyhow::Result<Box<dyn WakeWordDetector>> {
    anyhow::bail!("built without wake word support; rebuild with the `porcupine` feature")
}

/// Catalog management
fn songs(config: &Config, action: SongsCommand) -> anyhow::Result<()> {
    let catalog = MusicCatalog::new(&config.catalog_path);

    match action {
        SongsCommand::List => {
            let songs = catalog.load();
            if songs.is_empty() {
                println!("{}", bloom_assistant::catalog::EMPTY_CATALOG);
            }
            for (name, song) in &songs {
                println!(
                    "{name}: {} by {} ({})",
                    song.title,
                    song.artist,
                    song.file_path.display()
                );
            }
        }
        SongsCommand::Add {
            name,
            title,
            artist,
            path,
        } => {
            if !path.exists() {
                println!("Warning: {} does not exist yet", path.display());
            }
            catalog.add(&name, &title, &artist, &path.to_string_lossy())?;
            println!("Added {title} to database.");
        }
        SongsCommand::Remove { name } => {
            if catalog.remove(&name)? {
                println!("Removed {name} from database.");
            } else {
                println!("Song {name} not found in database.");
            }
        }
        SongsCommand::Search { query } => match catalog.search(&query) {
            Some(song) => println!(
                "{} by {} ({})",
                song.title,
                song.artist,
                song.file_path.display()
            ),
            None => println!("No match for \"{query}\""),
        },
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;
    let microphone = capture.microphone();

    println!("Sample rate: {} Hz", bloom_assistant::voice::SAMPLE_RATE);
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = microphone.acquire().await.take();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test TTS output through the speech player
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = config.text_to_speech()?;

    println!("Synthesizing speech...");
    let mp3_data = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    let mut clip = tempfile::Builder::new()
        .prefix("bloom-tts-")
        .suffix(".mp3")
        .tempfile()?;
    clip.write_all(&mp3_data)?;
    clip.flush()?;

    println!("Playing audio...");
    let player = config.playback_controller();
    let mut handle = player.play_speech(clip.path()).await?;
    handle.wait().await;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// One language model round-trip
async fn ask(config: &Config, prompt: &str) -> anyhow::Result<()> {
    let client = LlmClient::new(config.llm.clone())?;
    println!("Asking {} at {}...", config.llm.model, client.endpoint());

    let reply = llm::answer(&client, prompt).await;
    println!("{reply}");

    Ok(())
}
