//! Configuration management for the Billy gateway
//!
//! Precedence is env > TOML file > built-in default. The process environment
//! and the optional `config.toml` are merged into one [`EnvSnapshot`]; all
//! provider selection happens in [`resolve`] as a pure function of that
//! snapshot.

pub mod file;
pub mod resolve;

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::Result;

/// Immutable view of environment-style settings
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a snapshot from explicit pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value for `key`; empty or whitespace-only values count as absent
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// First present value among `keys`, in order
    #[must_use]
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    /// Insert `value` under `key` unless a value is already present
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if !self.contains(&key) {
            self.vars.insert(key, value.into());
        }
    }
}

/// Flat per-provider settings handed to `initialize`
///
/// Absent fields fall back to provider-specific defaults.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    /// Registry name of the provider (e.g. "ollama")
    pub provider: String,
    /// Model identifier
    pub model: Option<String>,
    /// Credential
    pub api_key: Option<SecretString>,
    /// Base URL of the backend
    pub api_url: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Max tokens generated per reply
    pub max_tokens: Option<u32>,
    /// Conversation size budget in characters
    pub max_context: Option<usize>,
    /// Default speaker identity (voice providers)
    pub voice: Option<String>,
    /// Default playback rate multiplier (voice providers)
    pub speed: Option<f32>,
    /// `OpenAI` organization header
    pub organization: Option<String>,
    /// `OpenAI` project header
    pub project_id: Option<String>,
    /// System instructions passed to the model verbatim
    pub instructions: Option<String>,
}

impl ProviderConfig {
    /// Config naming only a provider
    pub fn named(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    #[must_use]
    pub const fn with_max_context(mut self, max_context: usize) -> Self {
        self.max_context = Some(max_context);
        self
    }

    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Credential, if present and non-empty
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .filter(|k| !k.is_empty())
    }

    /// Base URL without a trailing slash, if present and non-empty
    #[must_use]
    pub fn api_url(&self) -> Option<&str> {
        self.api_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .filter(|u| !u.is_empty())
    }

    /// Redacted view for logs and `billy check`
    #[must_use]
    pub fn summary(&self) -> ProviderSummary {
        ProviderSummary {
            provider: self.provider.clone(),
            model: self.model.clone(),
            api_url: self.api_url.clone(),
            has_api_key: self.api_key().is_some(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            max_context: self.max_context,
            voice: self.voice.clone(),
            speed: self.speed,
        }
    }
}

/// Secret-free rendering of a [`ProviderConfig`]
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    pub has_api_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

/// Runtime switches that shape the turn loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modes {
    /// Skip voice synthesis entirely
    pub text_only: bool,
    /// Verbose logging
    pub debug: bool,
    /// Log every incremental fragment
    pub debug_include_delta: bool,
}

/// Billy gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Language-model provider settings
    pub llm: ProviderConfig,
    /// Voice provider settings
    pub voice: ProviderConfig,
    /// Runtime modes
    pub modes: Modes,
}

impl Config {
    /// Load configuration from the process environment and the TOML overlay
    ///
    /// # Errors
    ///
    /// Returns error if a numeric setting cannot be parsed
    pub fn load() -> Result<Self> {
        let mut env = EnvSnapshot::from_process();
        let fc = file::load_config_file();
        fc.apply_to(&mut env);
        Self::from_snapshot(&env)
    }

    /// Resolve configuration from a snapshot without touching the process
    ///
    /// # Errors
    ///
    /// Returns error if a numeric setting cannot be parsed
    pub fn from_snapshot(env: &EnvSnapshot) -> Result<Self> {
        Ok(Self {
            llm: resolve::resolve_llm_config(env)?,
            voice: resolve::resolve_voice_config(env)?,
            modes: resolve::resolve_modes(env),
        })
    }
}
