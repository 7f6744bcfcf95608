//! Configuration management for Fairy
//!
//! Values are layered env > TOML file > default.

pub mod file;

use std::time::Duration;

use crate::agent::{DEFAULT_MAX_ITERATIONS, OrchestratorConfig};
use crate::realtime::{DEFAULT_REALTIME_URL, DEFAULT_SETTLE_DELAY, RealtimeConfig};
use crate::voice::{
    DEFAULT_ENERGY_THRESHOLD, DEFAULT_ONSET_FRAMES, DEFAULT_SILENCE_HOLD_MS, SegmenterConfig,
    SttProvider,
};
use crate::{Error, Result};

/// Default chat model
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Default realtime model
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";

/// Fairy configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API keys
    pub api_keys: ApiKeys,

    /// Capture and transcription
    pub voice: VoiceConfig,

    /// Chat model for turn-based sessions
    pub llm: LlmConfig,

    /// Streaming sessions
    pub realtime: RealtimeSettings,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper, chat and realtime)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,
}

/// Capture and transcription configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT backend
    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// RMS energy above which a frame counts as speech
    pub energy_threshold: f32,

    /// Utterance detection
    pub segmenter: SegmenterConfig,
}

/// Chat model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier
    pub model: String,

    /// Compatible API base URL, if not `OpenAI`
    pub base_url: Option<String>,

    /// Model requests allowed per turn
    pub max_iterations: usize,
}

/// Streaming session configuration
#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    /// Realtime model identifier
    pub model: String,

    /// WebSocket endpoint
    pub url: String,

    /// Voice for spoken responses
    pub voice: Option<String>,

    /// Longest wait for a function output acknowledgment
    pub settle_delay: Duration,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> Result<Self> {
        // Load optional TOML config file (env > toml > default)
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn from_sources(
        fc: file::FairyConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.is_empty());

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
        };

        // Voice config (env > toml > default)
        let stt_provider = env("FAIRY_STT_PROVIDER")
            .or(fc.voice.stt_provider)
            .map(|p| p.parse::<SttProvider>())
            .transpose()?
            .unwrap_or(SttProvider::Whisper);
        let default_stt_model = match stt_provider {
            SttProvider::Whisper => "whisper-1",
            SttProvider::Deepgram => "nova-2",
        };
        let voice = VoiceConfig {
            stt_provider,
            stt_model: env("FAIRY_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| default_stt_model.to_string()),
            energy_threshold: fc.voice.energy_threshold.unwrap_or(DEFAULT_ENERGY_THRESHOLD),
            segmenter: SegmenterConfig {
                onset_frames: fc.voice.onset_frames.unwrap_or(DEFAULT_ONSET_FRAMES).max(1),
                silence_hold_ms: fc.voice.silence_hold_ms.unwrap_or(DEFAULT_SILENCE_HOLD_MS),
                filter_silence: fc.voice.filter_silence.unwrap_or(true),
            },
        };

        let max_iterations = match env("FAIRY_MAX_ITERATIONS") {
            Some(raw) => parse_number::<usize>("FAIRY_MAX_ITERATIONS", &raw)?,
            None => fc.llm.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
        };
        if max_iterations == 0 {
            return Err(Error::Config("max_iterations must be at least 1".to_string()));
        }

        let llm = LlmConfig {
            model: env("FAIRY_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            base_url: fc.llm.base_url,
            max_iterations,
        };

        let settle_delay = match env("FAIRY_SETTLE_DELAY_MS") {
            Some(raw) => Duration::from_millis(parse_number("FAIRY_SETTLE_DELAY_MS", &raw)?),
            None => fc
                .realtime
                .settle_delay_ms
                .map_or(DEFAULT_SETTLE_DELAY, Duration::from_millis),
        };

        let realtime = RealtimeSettings {
            model: env("FAIRY_REALTIME_MODEL")
                .or(fc.realtime.model)
                .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string()),
            url: env("FAIRY_REALTIME_URL")
                .or(fc.realtime.url)
                .unwrap_or_else(|| DEFAULT_REALTIME_URL.to_string()),
            voice: fc.realtime.voice,
            settle_delay,
        };

        Ok(Self {
            api_keys,
            voice,
            llm,
            realtime,
        })
    }

    /// `OpenAI` key, required by chat, Whisper and realtime
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no key is configured
    pub fn openai_key(&self) -> Result<String> {
        self.api_keys
            .openai
            .clone()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".to_string()))
    }

    /// Key for the configured STT provider
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the provider's key is missing
    pub fn stt_key(&self) -> Result<String> {
        match self.voice.stt_provider {
            SttProvider::Whisper => self.openai_key(),
            SttProvider::Deepgram => self
                .api_keys
                .deepgram
                .clone()
                .ok_or_else(|| Error::Config("DEEPGRAM_API_KEY is not set".to_string())),
        }
    }

    /// Tuning for turn-based sessions
    #[must_use]
    pub const fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_iterations: self.llm.max_iterations,
            segmenter: self.voice.segmenter,
        }
    }

    /// Tuning for streaming sessions
    #[must_use]
    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            settle_delay: self.realtime.settle_delay,
            voice: self.realtime.voice.clone(),
            ..RealtimeConfig::default()
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {key} value {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::file::FairyConfigFile;
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_sources() {
        let config = Config::from_sources(FairyConfigFile::default(), env_of(&[])).unwrap();

        assert!(config.api_keys.openai.is_none());
        assert_eq!(config.voice.stt_provider, SttProvider::Whisper);
        assert_eq!(config.voice.stt_model, "whisper-1");
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.llm.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.realtime.settle_delay, DEFAULT_SETTLE_DELAY);
        assert_eq!(config.realtime.url, DEFAULT_REALTIME_URL);
        assert!(config.voice.segmenter.filter_silence);
    }

    #[test]
    fn env_overrides_file() {
        let fc: FairyConfigFile = toml::from_str(
            r#"
            [llm]
            model = "from-file"
            max_iterations = 3

            [api_keys]
            openai = "file-key"
            "#,
        )
        .unwrap();
        let config = Config::from_sources(
            fc,
            env_of(&[("FAIRY_LLM_MODEL", "from-env"), ("FAIRY_SETTLE_DELAY_MS", "50")]),
        )
        .unwrap();

        assert_eq!(config.llm.model, "from-env");
        assert_eq!(config.llm.max_iterations, 3);
        assert_eq!(config.api_keys.openai.as_deref(), Some("file-key"));
        assert_eq!(config.realtime.settle_delay, Duration::from_millis(50));
    }

    #[test]
    fn deepgram_provider_changes_default_model() {
        let config = Config::from_sources(
            FairyConfigFile::default(),
            env_of(&[("FAIRY_STT_PROVIDER", "deepgram")]),
        )
        .unwrap();

        assert_eq!(config.voice.stt_provider, SttProvider::Deepgram);
        assert_eq!(config.voice.stt_model, "nova-2");
        assert!(config.stt_key().is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad_iterations = Config::from_sources(
            FairyConfigFile::default(),
            env_of(&[("FAIRY_MAX_ITERATIONS", "many")]),
        );
        assert!(matches!(bad_iterations, Err(Error::Config(_))));

        let zero = Config::from_sources(
            FairyConfigFile::default(),
            env_of(&[("FAIRY_MAX_ITERATIONS", "0")]),
        );
        assert!(zero.is_err());

        let provider = Config::from_sources(
            FairyConfigFile::default(),
            env_of(&[("FAIRY_STT_PROVIDER", "carrier-pigeon")]),
        );
        assert!(provider.is_err());
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let config = Config::from_sources(
            FairyConfigFile::default(),
            env_of(&[("OPENAI_API_KEY", "")]),
        )
        .unwrap();
        assert!(config.openai_key().is_err());
    }
}
