//! Kobold provider: one atomic completion per turn from an external Kobold server

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    ChunkStream, ConversationHistory, InteractionStyle, LanguageModelProvider, ResponseChunk,
    Role, guard_terminal,
};
use crate::config::ProviderConfig;
use crate::{Error, Result, http};

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 150;
const DEFAULT_MAX_CONTEXT: usize = 2048;

/// Client for the Kobold `/api/v1/generate` endpoint
pub struct KoboldProvider {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    max_context: usize,
    history: ConversationHistory,
}

impl Default for KoboldProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl KoboldProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: http::client(),
            api_url: String::new(),
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_context: DEFAULT_MAX_CONTEXT,
            history: ConversationHistory::new(),
        }
    }

    /// Current conversation history
    #[must_use]
    pub const fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Fit the history to the context budget and render the prompt
    fn build_prompt(&mut self) -> String {
        let removed = self
            .history
            .truncate_to_budget(self.max_context, |h| h.transcript_prompt().len());
        if removed > 0 {
            tracing::debug!(
                removed,
                remaining = self.history.len(),
                "trimmed kobold history to fit context"
            );
        }
        self.history.transcript_prompt()
    }

    async fn generate(&mut self) -> ResponseChunk {
        let prompt = self.build_prompt();
        let request = GenerateRequest {
            prompt: &prompt,
            max_length: self.max_tokens,
            temperature: self.temperature,
            rep_pen: 1.1,
            top_p: 0.9,
            top_k: 40,
            sampler_order: [6, 0, 1, 2, 3, 4, 5],
            stop_sequence: ["\nUser:", "\nAssistant:"],
        };

        let mut builder = self
            .client
            .post(format!("{}/api/v1/generate", self.api_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                return ResponseChunk::error(format!("Connection error to Kobold server: {e}"));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = http::failure_body(response).await;
            return ResponseChunk::error(format!("Kobold server error {status}: {body}"));
        }

        let data: GenerateResponse = match response.json().await {
            Ok(data) => data,
            Err(e) => return ResponseChunk::error(format!("invalid Kobold response: {e}")),
        };

        let raw = data.results.first().map_or("", |r| r.text.as_str());
        let text = clean_reply(raw);
        if !text.is_empty() {
            self.history.push(Role::Assistant, text.clone());
        }
        tracing::debug!(len = text.len(), "kobold reply");

        ResponseChunk::completed(text)
    }
}

/// Strip an echoed role prefix and any fabricated next user line
fn clean_reply(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("Assistant:") {
        text = rest.trim();
    }
    if let Some(idx) = text.find("\nUser:") {
        text = text[..idx].trim_end();
    }
    text.to_string()
}

#[async_trait]
impl LanguageModelProvider for KoboldProvider {
    fn name(&self) -> &'static str {
        "kobold"
    }

    async fn initialize(&mut self, config: &ProviderConfig) -> Result<()> {
        let api_url = config
            .api_url()
            .ok_or_else(|| Error::Config("Kobold provider requires api_url".to_string()))?
            .to_string();

        self.api_key = config.api_key().map(ToString::to_string);
        self.temperature = config.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        self.max_tokens = config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        self.max_context = config.max_context.unwrap_or(DEFAULT_MAX_CONTEXT);

        let response = self
            .client
            .get(format!("{api_url}/api/v1/model"))
            .timeout(http::PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                Error::Connectivity(format!("failed to reach Kobold server at {api_url}: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(Error::Connectivity(format!(
                "Kobold server at {api_url} returned {}",
                response.status()
            )));
        }

        let model = response
            .json::<ModelInfo>()
            .await
            .ok()
            .and_then(|info| info.result)
            .unwrap_or_else(|| "unknown model".to_string());

        tracing::info!(url = %api_url, model = %model, "connected to Kobold server");
        self.api_url = api_url;
        Ok(())
    }

    async fn start_session(&mut self) -> Result<()> {
        self.history.clear();
        tracing::info!("started kobold session");
        Ok(())
    }

    async fn send_message(&mut self, text: &str) -> Result<()> {
        self.history.push(Role::User, text);
        Ok(())
    }

    fn get_response_stream(&mut self) -> ChunkStream<'_> {
        let this = self;
        guard_terminal(async_stream::stream! {
            yield this.generate().await;
        })
    }

    async fn end_session(&mut self) {
        if !self.history.is_empty() {
            tracing::info!(entries = self.history.len(), "ended kobold session");
        }
        self.history.clear();
    }

    fn interaction_style(&self) -> InteractionStyle {
        InteractionStyle::RequestResponse
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    max_length: u32,
    temperature: f32,
    rep_pen: f32,
    top_p: f32,
    top_k: u32,
    sampler_order: [u8; 7],
    stop_sequence: [&'static str; 2],
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    results: Vec<GenerateResult>,
}

#[derive(Deserialize)]
struct GenerateResult {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ModelInfo {
    result: Option<String>,
}
