//! Language model backend
//!
//! Sends a prompt to an Ollama-style `generate` endpoint and returns the reply
//! text. Failures are typed; [`apology`] turns them into something the
//! assistant can say out loud.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default local generate endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/generate";

/// Default model name
pub const DEFAULT_MODEL: &str = "llama3";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reply used when the backend answered without any text
pub const NO_VALID_RESPONSE: &str = "No valid response from the language model.";

/// Answers free-form questions
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Ask `prompt` and return the reply
    async fn ask(&self, prompt: &str) -> Result<String>;
}

/// Generation settings
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    /// Full URL of the generate endpoint
    pub endpoint: String,

    /// Model name
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Reply length limit
    pub max_tokens: u32,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 150,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    message: Option<MessageField>,
}

/// `message` is either plain text or a chat message object
#[derive(Deserialize)]
#[serde(untagged)]
enum MessageField {
    Text(String),
    Chat { content: String },
}

impl GenerateResponse {
    fn into_reply(self) -> String {
        if let Some(response) = self.response {
            return response.trim().to_string();
        }

        match self.message {
            Some(MessageField::Text(text) | MessageField::Chat { content: text }) => {
                text.trim().to_string()
            }
            None => NO_VALID_RESPONSE.to_string(),
        }
    }
}

/// HTTP client for the language model backend
pub struct LlmClient {
    client: reqwest::Client,
    settings: LlmSettings,
}

impl LlmClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self { client, settings })
    }

    /// Endpoint requests are sent to
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }

    fn map_transport(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::LlmTimeout
        } else if e.is_connect() {
            Error::LlmUnreachable(self.settings.endpoint.clone())
        } else {
            Error::Http(e)
        }
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn ask(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.settings.model,
            prompt: format!("Please answer briefly: {prompt}"),
            stream: false,
            options: GenerateOptions {
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
            },
        };

        tracing::debug!(model = %self.settings.model, prompt, "asking language model");

        let response = self
            .client
            .post(&self.settings.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        tracing::debug!(status = %status, "language model responded");

        if !status.is_success() {
            return Err(Error::LlmBadStatus(status.as_u16()));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| self.map_transport(e))?;
        let reply = body.into_reply();

        tracing::debug!(reply = %reply, "language model reply");
        Ok(reply)
    }
}

/// Text to speak when a question could not be answered
#[must_use]
pub fn apology(error: &Error) -> String {
    match error {
        Error::LlmUnreachable(_) => "Error: Could not connect to Ollama. Make sure it's running \
            with 'ollama serve' or 'ollama run llama3'."
            .to_string(),
        Error::LlmTimeout => {
            "Error: Request to Ollama timed out. The model might be loading.".to_string()
        }
        Error::LlmBadStatus(code) => {
            format!("Sorry, I couldn't get a response from the language model. Status code: {code}")
        }
        other => format!("Error communicating with the language model: {other}"),
    }
}

/// Ask `model` and always come back with something to say
pub async fn answer(model: &dyn LanguageModel, prompt: &str) -> String {
    match model.ask(prompt).await {
        Ok(reply) if !reply.is_empty() => reply,
        Ok(_) => NO_VALID_RESPONSE.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "language model request failed");
            apology(&e)
        }
    }
}
