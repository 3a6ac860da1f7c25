//! Text-to-speech (TTS) processing

use async_trait::async_trait;

use crate::{Error, Result};

/// Google Translate TTS endpoint (keyless, MP3 output)
const GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Longest text Google accepts per request
const GOOGLE_MAX_CHARS: usize = 100;

/// Turns text into an audio asset
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text`, returning MP3 bytes
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// TTS provider backend
#[derive(Clone, Debug)]
enum TtsProvider {
    Google { language: String },
    OpenAI { api_key: String, model: String, voice: String, speed: f32 },
}

/// Synthesizes speech from text over HTTP
pub struct TextToSpeech {
    client: reqwest::Client,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a TTS instance using the keyless Google Translate voice
    #[must_use]
    pub fn new_google(language: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider: TtsProvider::Google { language },
        }
    }

    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: String, model: String, voice: String, speed: f32) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::ConfigMissing(
                "OpenAI API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            provider: TtsProvider::OpenAI {
                api_key,
                model,
                voice,
                speed,
            },
        })
    }

    /// Synthesize using Google Translate TTS
    ///
    /// Long text is sent in word-aligned chunks; the MP3 responses are
    /// concatenated, which players handle as one stream.
    async fn synthesize_google(&self, language: &str, text: &str) -> Result<Vec<u8>> {
        let chunks = split_for_google(text);
        let total = chunks.len();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let url = format!(
                "{GOOGLE_TTS_URL}?ie=UTF-8&client=tw-ob&tl={}&q={}&total={total}&idx={idx}&textlen={}",
                urlencoding::encode(language),
                urlencoding::encode(chunk),
                chunk.chars().count()
            );

            let response = self
                .client
                .get(&url)
                .header("User-Agent", "Mozilla/5.0")
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(Error::Tts(format!("Google TTS error {status}")));
            }

            audio.extend_from_slice(&response.bytes().await?);
        }

        tracing::trace!(chunks = total, bytes = audio.len(), "google speech synthesized");
        Ok(audio)
    }

    /// Synthesize using OpenAI TTS
    async fn synthesize_openai(
        &self,
        api_key: &str,
        model: &str,
        voice: &str,
        speed: f32,
        text: &str,
    ) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model,
            input: text,
            voice,
            speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(Error::Tts("nothing to say".to_string()));
        }

        let audio = match &self.provider {
            TtsProvider::Google { language } => self.synthesize_google(language, text).await,
            TtsProvider::OpenAI {
                api_key,
                model,
                voice,
                speed,
            } => {
                self.synthesize_openai(api_key, model, voice, *speed, text)
                    .await
            }
        };

        // Transport errors surface as TTS failures so callers can skip the step
        audio.map_err(|e| match e {
            Error::Tts(_) => e,
            other => Error::Tts(other.to_string()),
        })
    }
}

/// Split text into chunks Google will accept, breaking on whitespace
fn split_for_google(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };

        if needed > GOOGLE_MAX_CHARS && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if word.chars().count() > GOOGLE_MAX_CHARS {
            // A single overlong token gets hard-split
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(GOOGLE_MAX_CHARS) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
