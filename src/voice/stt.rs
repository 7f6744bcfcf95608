//! Speech-to-text over hosted transcription services
//!
//! An utterance arrives as a complete WAV file (see [`Utterance::to_wav`]).
//! Each provider differs only in how that file is posted and where the
//! transcript sits in the reply, so both share one send path.
//!
//! [`Utterance::to_wav`]: super::Utterance::to_wav

use async_trait::async_trait;
use serde_json::Value;

use crate::{Error, Result};

/// Converts a WAV utterance into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV bytes
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` if the service fails
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

/// STT provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SttProvider {
    /// `OpenAI` Whisper
    Whisper,
    /// Deepgram
    Deepgram,
}

impl SttProvider {
    const fn endpoint(self) -> &'static str {
        match self {
            Self::Whisper => "https://api.openai.com/v1/audio/transcriptions",
            Self::Deepgram => "https://api.deepgram.com/v1/listen",
        }
    }

    /// JSON pointer to the transcript in a successful reply
    const fn transcript_pointer(self) -> &'static str {
        match self {
            Self::Whisper => "/text",
            Self::Deepgram => "/results/channels/0/alternatives/0/transcript",
        }
    }

    /// Pull the transcript out of a reply body
    ///
    /// A Deepgram reply with no alternatives means nothing was heard and
    /// yields an empty transcript. A Whisper reply always carries `text`.
    fn transcript(self, body: &Value) -> Result<String> {
        match (body.pointer(self.transcript_pointer()), self) {
            (Some(Value::String(text)), _) => Ok(text.trim().to_string()),
            (None, Self::Deepgram) if body.pointer("/results/channels").is_some() => {
                Ok(String::new())
            }
            _ => Err(Error::Transcription(format!(
                "{self:?} reply has no transcript"
            ))),
        }
    }
}

impl std::str::FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Transcribes speech to text over HTTP
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a transcriber for the given provider
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the API key is empty
    pub fn new(provider: SttProvider, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!(
                "{provider:?} API key required for transcription"
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider,
        })
    }

    fn request(&self, wav: &[u8]) -> Result<reqwest::RequestBuilder> {
        let request = self.client.post(self.provider.endpoint());

        Ok(match self.provider {
            SttProvider::Whisper => {
                let file = reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("utterance.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Transcription(e.to_string()))?;
                let form = reqwest::multipart::Form::new()
                    .part("file", file)
                    .text("model", self.model.clone());
                request.bearer_auth(&self.api_key).multipart(form)
            }
            SttProvider::Deepgram => request
                .header("Authorization", format!("Token {}", self.api_key))
                .header("Content-Type", "audio/wav")
                .query(&[("model", self.model.as_str()), ("punctuate", "true")])
                .body(wav.to_vec()),
        })
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        let provider = self.provider;
        tracing::debug!(?provider, wav_bytes = wav.len(), "transcribing utterance");

        let failed = |e: reqwest::Error| {
            tracing::warn!(?provider, error = %e, "transcription request failed");
            Error::Transcription(e.to_string())
        };

        let response = self.request(wav)?.send().await.map_err(failed)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(?provider, %status, "transcription service rejected request");
            return Err(Error::Transcription(format!("{provider:?} {status}: {body}")));
        }

        let body: Value = response.json().await.map_err(failed)?;
        let transcript = provider.transcript(&body)?;
        tracing::info!(%transcript, "transcription complete");
        Ok(transcript)
    }
}
