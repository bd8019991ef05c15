//! TOML configuration file loading
//!
//! Supports `~/.config/billy/config.toml` as a persistent config source.
//! All fields are optional; the file fills in settings the environment leaves unset.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::EnvSnapshot;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BillyConfigFile {
    /// Language-model provider settings
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice provider settings
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Runtime modes
    #[serde(default)]
    pub modes: ModesFileConfig,
}

/// Language-model settings
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Provider name ("openai", "ollama", "kobold")
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_context: Option<usize>,
    pub instructions: Option<String>,
}

/// Voice synthesis settings
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Provider name ("openai", "chatterai", "xtt")
    pub provider: Option<String>,
    /// Speaker identity (e.g. "ash")
    pub voice: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub speed: Option<f32>,
}

/// Mode toggles
#[derive(Debug, Default, Deserialize)]
pub struct ModesFileConfig {
    pub text_only: Option<bool>,
    pub debug: Option<bool>,
    pub debug_include_delta: Option<bool>,
}

impl BillyConfigFile {
    /// Generic-override variables this file provides, as (key, value) pairs
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let llm = &self.llm;
        let voice = &self.voice;
        let modes = &self.modes;

        [
            ("LLM_PROVIDER", llm.provider.clone()),
            ("LLM_MODEL", llm.model.clone()),
            ("LLM_API_KEY", llm.api_key.clone()),
            ("LLM_API_URL", llm.api_url.clone()),
            ("LLM_TEMPERATURE", llm.temperature.map(|v| v.to_string())),
            ("LLM_MAX_TOKENS", llm.max_tokens.map(|v| v.to_string())),
            ("LLM_MAX_CONTEXT", llm.max_context.map(|v| v.to_string())),
            ("LLM_INSTRUCTIONS", llm.instructions.clone()),
            ("VOICE_PROVIDER", voice.provider.clone()),
            ("VOICE", voice.voice.clone()),
            ("VOICE_MODEL", voice.model.clone()),
            ("VOICE_API_KEY", voice.api_key.clone()),
            ("VOICE_API_URL", voice.api_url.clone()),
            ("VOICE_SPEED", voice.speed.map(|v| v.to_string())),
            ("TEXT_ONLY_MODE", modes.text_only.map(|v| v.to_string())),
            ("DEBUG_MODE", modes.debug.map(|v| v.to_string())),
            ("DEBUG_MODE_INCLUDE_DELTA", modes.debug_include_delta.map(|v| v.to_string())),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect()
    }

    /// Fill unset snapshot keys from this file (env > toml)
    pub fn apply_to(&self, env: &mut EnvSnapshot) {
        for (key, value) in self.to_pairs() {
            env.set_default(key, value);
        }
    }
}

/// Load the TOML config file from the standard path
///
/// Returns `BillyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> BillyConfigFile {
    config_file_path().map_or_else(BillyConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
pub fn load_config_file_from(path: &Path) -> BillyConfigFile {
    if !path.exists() {
        return BillyConfigFile::default();
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
                BillyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            BillyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/billy/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("billy").join("config.toml"))
}
