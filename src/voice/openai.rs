//! `OpenAI` text-to-speech

use async_trait::async_trait;
use serde::Serialize;

use super::{VoiceParams, VoiceProvider, choose_speed, choose_voice, configured_voice};
use crate::config::ProviderConfig;
use crate::{Error, Result, http};

const DEFAULT_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "ash";

const VOICES: &[&str] = &[
    "alloy", "echo", "fable", "onyx", "nova", "shimmer", "ash", "ballad", "coral", "sage", "verse",
];

/// Synthesizes speech through `/audio/speech`
pub struct OpenAIVoiceProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    voice: String,
    speed: f32,
    organization: Option<String>,
    project_id: Option<String>,
}

impl Default for OpenAIVoiceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAIVoiceProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: http::client(),
            api_url: DEFAULT_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            speed: super::DEFAULT_SPEED,
            organization: None,
            project_id: None,
        }
    }

    /// Bearer credential plus the optional organization and project headers
    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder.bearer_auth(&self.api_key);
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }
        if let Some(project) = &self.project_id {
            builder = builder.header("OpenAI-Project", project);
        }
        builder
    }
}

#[async_trait]
impl VoiceProvider for OpenAIVoiceProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn initialize(&mut self, config: &ProviderConfig) -> Result<()> {
        self.api_key = config
            .api_key()
            .ok_or_else(|| Error::Config("OpenAI API key required for TTS".to_string()))?
            .to_string();

        if let Some(url) = config.api_url() {
            self.api_url = url.to_string();
        }
        if let Some(model) = &config.model {
            self.model.clone_from(model);
        }
        self.voice = configured_voice(config.voice.as_deref(), DEFAULT_VOICE, VOICES);
        self.speed = choose_speed(config.speed, super::DEFAULT_SPEED);
        self.organization.clone_from(&config.organization);
        self.project_id.clone_from(&config.project_id);

        let probe = self
            .client
            .get(format!("{}/models", self.api_url))
            .timeout(http::PROBE_TIMEOUT);
        let response = self
            .authorized(probe)
            .send()
            .await
            .map_err(|e| Error::Connectivity(format!("failed to reach OpenAI API: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Connectivity(format!(
                "OpenAI API returned {} during probe",
                response.status()
            )));
        }

        tracing::info!(model = %self.model, voice = %self.voice, "OpenAI TTS ready");
        Ok(())
    }

    async fn text_to_speech(&self, text: &str, params: &VoiceParams) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let voice = choose_voice(params.voice.as_deref(), &self.voice, VOICES);
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &voice,
            speed: choose_speed(params.speed, self.speed),
            response_format: "wav",
        };

        let builder = self
            .client
            .post(format!("{}/audio/speech", self.api_url))
            .json(&request);
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| Error::Synthesis {
                status: None,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = http::failure_body(response).await;
            return Err(Error::Synthesis {
                status: Some(status.as_u16()),
                message: format!("OpenAI TTS error: {body}"),
            });
        }

        let audio = response.bytes().await.map_err(|e| Error::Synthesis {
            status: None,
            message: e.to_string(),
        })?;
        tracing::debug!(bytes = audio.len(), voice = %voice, "synthesized speech");
        Ok(audio.to_vec())
    }

    fn get_supported_voices(&self) -> &'static [&'static str] {
        VOICES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_list() {
        let provider = OpenAIVoiceProvider::new();
        let voices = provider.get_supported_voices();
        assert_eq!(voices.len(), 11);
        assert!(voices.contains(&DEFAULT_VOICE));
    }

    #[tokio::test]
    async fn test_initialize_requires_key() {
        let mut provider = OpenAIVoiceProvider::new();
        let err = provider
            .initialize(&ProviderConfig::named("openai"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
