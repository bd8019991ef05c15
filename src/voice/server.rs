//! Shared client for TTS servers speaking the `/api/v1/tts` protocol

use async_trait::async_trait;
use serde::Serialize;

use super::{VoiceParams, VoiceProvider, choose_speed, choose_voice, configured_voice};
use crate::config::ProviderConfig;
use crate::{Error, Result, http};

/// Static description of one server flavour
#[derive(Debug)]
pub struct ServerProfile {
    /// Registry name
    pub name: &'static str,
    /// Display name for messages
    pub label: &'static str,
    pub default_url: &'static str,
    pub default_voice: &'static str,
    pub voices: &'static [&'static str],
    /// Whether a bearer credential must be configured
    pub key_required: bool,
}

/// Voice provider backed by a ChatterAI-compatible TTS server
pub struct ServerVoiceProvider {
    profile: &'static ServerProfile,
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    voice: String,
    speed: f32,
}

impl ServerVoiceProvider {
    #[must_use]
    pub fn new(profile: &'static ServerProfile) -> Self {
        Self {
            profile,
            client: http::client(),
            api_url: profile.default_url.to_string(),
            api_key: None,
            voice: profile.default_voice.to_string(),
            speed: super::DEFAULT_SPEED,
        }
    }

    /// Provider for the hosted `ChatterAI` service
    #[must_use]
    pub fn chatterai() -> Self {
        Self::new(&super::chatterai::PROFILE)
    }

    /// Provider for a self-hosted XTT server
    #[must_use]
    pub fn xtt() -> Self {
        Self::new(&super::xtt::PROFILE)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl VoiceProvider for ServerVoiceProvider {
    fn name(&self) -> &'static str {
        self.profile.name
    }

    async fn initialize(&mut self, config: &ProviderConfig) -> Result<()> {
        let label = self.profile.label;

        self.api_key = config.api_key().map(ToString::to_string);
        if self.profile.key_required && self.api_key.is_none() {
            return Err(Error::Config(format!("{label} API key required")));
        }
        if let Some(url) = config.api_url() {
            self.api_url = url.to_string();
        }
        self.voice = configured_voice(
            config.voice.as_deref(),
            self.profile.default_voice,
            self.profile.voices,
        );
        self.speed = choose_speed(config.speed, super::DEFAULT_SPEED);

        let probe = self
            .client
            .get(format!("{}/api/v1/voices", self.api_url))
            .timeout(http::PROBE_TIMEOUT);
        let response = self.with_auth(probe).send().await.map_err(|e| {
            Error::Connectivity(format!("failed to reach {label} at {}: {e}", self.api_url))
        })?;

        if !response.status().is_success() {
            return Err(Error::Connectivity(format!(
                "{label} at {} returned {}",
                self.api_url,
                response.status()
            )));
        }

        tracing::info!(
            provider = self.profile.name,
            url = %self.api_url,
            voice = %self.voice,
            "TTS server ready"
        );
        Ok(())
    }

    async fn text_to_speech(&self, text: &str, params: &VoiceParams) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct TtsRequest<'a> {
            text: &'a str,
            voice: &'a str,
            speed: f32,
            format: &'a str,
        }

        let voice = choose_voice(params.voice.as_deref(), &self.voice, self.profile.voices);
        let request = TtsRequest {
            text,
            voice: &voice,
            speed: choose_speed(params.speed, self.speed),
            format: "wav",
        };

        let builder = self
            .client
            .post(format!("{}/api/v1/tts", self.api_url))
            .json(&request);
        let response = self
            .with_auth(builder)
            .send()
            .await
            .map_err(|e| Error::Synthesis {
                status: None,
                message: format!("{} request failed: {e}", self.profile.label),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = http::failure_body(response).await;
            return Err(Error::Synthesis {
                status: Some(status.as_u16()),
                message: format!("{} TTS error: {body}", self.profile.label),
            });
        }

        let audio = response.bytes().await.map_err(|e| Error::Synthesis {
            status: None,
            message: e.to_string(),
        })?;
        tracing::debug!(
            provider = self.profile.name,
            bytes = audio.len(),
            voice = %voice,
            "synthesized speech"
        );
        Ok(audio.to_vec())
    }

    fn get_supported_voices(&self) -> &'static [&'static str] {
        self.profile.voices
    }
}
