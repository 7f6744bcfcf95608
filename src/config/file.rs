//! TOML configuration file loading
//!
//! Supports `~/.config/fairy/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct FairyConfigFile {
    /// Chat model configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Capture and transcription configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Streaming session configuration
    #[serde(default)]
    pub realtime: RealtimeFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Chat model configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,

    /// Compatible API base URL
    pub base_url: Option<String>,

    /// Model requests allowed per turn
    pub max_iterations: Option<usize>,
}

/// Capture and transcription configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// RMS energy above which a frame counts as speech
    pub energy_threshold: Option<f32>,

    /// Consecutive speech frames that start an utterance
    pub onset_frames: Option<usize>,

    /// Silence that ends an utterance, in milliseconds
    pub silence_hold_ms: Option<u32>,

    /// Drop silence frames from utterances
    pub filter_silence: Option<bool>,
}

/// Streaming session configuration
#[derive(Debug, Default, Deserialize)]
pub struct RealtimeFileConfig {
    /// Realtime model identifier
    pub model: Option<String>,

    /// WebSocket endpoint
    pub url: Option<String>,

    /// Voice for spoken responses
    pub voice: Option<String>,

    /// Longest wait for a function output acknowledgment
    pub settle_delay_ms: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `FairyConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> FairyConfigFile {
    config_file_path().map_or_else(FairyConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
#[must_use]
pub fn load_config_from(path: &Path) -> FairyConfigFile {
    if !path.exists() {
        return FairyConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                FairyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            FairyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/fairy/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("fairy").join("config.toml"))
}
