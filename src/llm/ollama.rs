//! Ollama provider: streamed chat deltas over newline-delimited JSON

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    ChunkStream, ConversationHistory, InteractionStyle, LanguageModelProvider, ResponseChunk,
    Role, Utterance, guard_terminal,
};
use crate::config::ProviderConfig;
use crate::{Error, Result, http};

const DEFAULT_MODEL: &str = "llama3.2:latest";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 150;

/// Client for Ollama's `/api/chat` endpoint
pub struct OllamaProvider {
    client: Client,
    api_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_context: Option<usize>,
    instructions: Option<String>,
    history: ConversationHistory,
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: http::client(),
            api_url: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_context: None,
            instructions: None,
            history: ConversationHistory::new(),
        }
    }

    /// Current conversation history
    #[must_use]
    pub const fn history(&self) -> &ConversationHistory {
        &self.history
    }

    fn build_request(&mut self) -> ChatRequest {
        if let Some(budget) = self.max_context {
            let removed = self.history.truncate_to_budget(budget, content_len);
            if removed > 0 {
                tracing::debug!(removed, "trimmed ollama history to fit context");
            }
        }

        let mut messages: Vec<Utterance> = Vec::with_capacity(self.history.len() + 1);
        if let Some(instructions) = &self.instructions {
            messages.push(Utterance {
                role: Role::System,
                content: instructions.clone(),
            });
        }
        messages.extend_from_slice(self.history.entries());

        ChatRequest {
            model: self.model.clone(),
            messages,
            stream: true,
            options: ChatOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        }
    }

    async fn open_chat(&mut self) -> std::result::Result<reqwest::Response, String> {
        let request = self.build_request();
        let response = self
            .client
            .post(format!("{}/api/chat", self.api_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("Connection error to Ollama server: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = http::failure_body(response).await;
            return Err(format!("Ollama server error {status}: {body}"));
        }
        Ok(response)
    }

    /// Translate one NDJSON line, recording the reply once it completes
    fn on_line(&mut self, line: &[u8], reply: &mut String) -> Option<ResponseChunk> {
        let line = std::str::from_utf8(line).ok()?.trim();
        if line.is_empty() {
            return None;
        }

        let chunk: ChatChunk = match serde_json::from_str(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed ollama line");
                return None;
            }
        };

        if let Some(error) = chunk.error {
            return Some(ResponseChunk::error(format!("Ollama error: {error}")));
        }

        let content = chunk.message.map(|m| m.content).unwrap_or_default();
        reply.push_str(&content);

        if chunk.done {
            if !reply.is_empty() {
                self.history.push(Role::Assistant, reply.clone());
            }
            tracing::debug!(len = reply.len(), "ollama reply complete");
            return Some(ResponseChunk::final_delta(content));
        }

        (!content.is_empty()).then(|| ResponseChunk::delta(content))
    }
}

fn content_len(history: &ConversationHistory) -> usize {
    history.entries().iter().map(|u| u.content.len()).sum()
}

#[async_trait]
impl LanguageModelProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn initialize(&mut self, config: &ProviderConfig) -> Result<()> {
        let api_url = config
            .api_url()
            .ok_or_else(|| Error::Config("Ollama provider requires api_url".to_string()))?
            .to_string();

        self.model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        self.temperature = config.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        self.max_tokens = config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        self.max_context = config.max_context;
        self.instructions.clone_from(&config.instructions);

        let response = self
            .client
            .get(format!("{api_url}/api/tags"))
            .timeout(http::PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                Error::Connectivity(format!("failed to reach Ollama server at {api_url}: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(Error::Connectivity(format!(
                "Ollama server at {api_url} returned {}",
                response.status()
            )));
        }

        let tags: TagList = response.json().await.unwrap_or_default();
        if !tags.models.iter().any(|m| m.name == self.model) {
            tracing::warn!(
                model = %self.model,
                available = tags.models.len(),
                "model not listed by Ollama server"
            );
        }

        tracing::info!(url = %api_url, model = %self.model, "connected to Ollama server");
        self.api_url = api_url;
        Ok(())
    }

    async fn start_session(&mut self) -> Result<()> {
        self.history.clear();
        tracing::info!(model = %self.model, "started ollama session");
        Ok(())
    }

    async fn send_message(&mut self, text: &str) -> Result<()> {
        self.history.push(Role::User, text);
        Ok(())
    }

    fn get_response_stream(&mut self) -> ChunkStream<'_> {
        let this = self;
        guard_terminal(async_stream::stream! {
            let response = match this.open_chat().await {
                Ok(response) => response,
                Err(message) => {
                    yield ResponseChunk::error(message);
                    return;
                }
            };

            let mut body = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut reply = String::new();

            while let Some(next) = body.next().await {
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield ResponseChunk::error(format!("Ollama stream interrupted: {e}"));
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if let Some(chunk) = this.on_line(&line, &mut reply) {
                        let terminal = chunk.is_terminal();
                        yield chunk;
                        if terminal {
                            return;
                        }
                    }
                }
            }

            // Final line without trailing newline
            if let Some(chunk) = this.on_line(&buffer, &mut reply) {
                yield chunk;
            }
        })
    }

    async fn end_session(&mut self) {
        if !self.history.is_empty() {
            tracing::info!(entries = self.history.len(), "ended ollama session");
        }
        self.history.clear();
    }

    fn interaction_style(&self) -> InteractionStyle {
        InteractionStyle::IncrementalStreaming
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Utterance>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatChunk {
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Default)]
struct TagList {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_become_chunks() {
        let mut provider = OllamaProvider::new();
        provider.history.push(Role::User, "Tell me a joke");
        let mut reply = String::new();

        let first = provider.on_line(
            br#"{"message":{"role":"assistant","content":"Why "},"done":false}"#,
            &mut reply,
        );
        assert_eq!(first, Some(ResponseChunk::delta("Why ")));

        let empty = provider.on_line(b"   \n", &mut reply);
        assert_eq!(empty, None);

        let last = provider.on_line(
            br#"{"message":{"role":"assistant","content":"not?"},"done":true}"#,
            &mut reply,
        );
        assert_eq!(last, Some(ResponseChunk::final_delta("not?")));
        assert_eq!(reply, "Why not?");
        assert_eq!(provider.history().len(), 2);
        assert_eq!(provider.history().entries()[1].content, "Why not?");
    }

    #[test]
    fn test_error_line_is_terminal() {
        let mut provider = OllamaProvider::new();
        let mut reply = String::new();
        let chunk = provider
            .on_line(br#"{"error":"model 'x' not found"}"#, &mut reply)
            .unwrap();
        assert!(chunk.is_terminal());
        assert!(matches!(chunk, ResponseChunk::Error { message } if message.contains("not found")));
    }

    #[test]
    fn test_request_puts_instructions_first() {
        let mut provider = OllamaProvider::new();
        provider.instructions = Some("be a fish".to_string());
        provider.history.push(Role::User, "hi");

        let request = provider.build_request();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["stream"], true);
        assert_eq!(json["options"]["num_predict"], 150);
    }
}
