//! `OpenAI` realtime provider over a persistent WebSocket session
//!
//! The session is full duplex: text deltas, audio deltas and the completion
//! signal all arrive as server events on one socket. Audio is buffered per
//! turn and exposed through [`LanguageModelProvider::take_native_audio`].

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::{ChunkStream, InteractionStyle, LanguageModelProvider, ResponseChunk, guard_terminal};
use crate::config::ProviderConfig;
use crate::config::resolve::DEFAULT_INSTRUCTIONS;
use crate::{Error, Result, voice};

const DEFAULT_URL: &str = "wss://api.openai.com/v1/realtime";
const DEFAULT_MODEL: &str = "gpt-4o-mini-realtime-preview";
const DEFAULT_VOICE: &str = "ash";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 150;

/// Sample rate of realtime PCM16 output
pub const REALTIME_SAMPLE_RATE: u32 = 24_000;

/// Upper bound on waiting for a cancelled response to wind down
const CANCEL_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

struct Connection {
    sink: WsSink,
    source: WsSource,
}

/// Full-duplex session against the `OpenAI` realtime API
pub struct OpenAIRealtimeProvider {
    api_key: String,
    url: String,
    model: String,
    voice: String,
    temperature: f32,
    max_tokens: u32,
    instructions: String,
    organization: Option<String>,
    project_id: Option<String>,
    connection: Option<Connection>,
    response_pending: bool,
    audio: Vec<u8>,
}

impl Default for OpenAIRealtimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAIRealtimeProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: String::new(),
            url: DEFAULT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            organization: None,
            project_id: None,
            connection: None,
            response_pending: false,
            audio: Vec::new(),
        }
    }

    /// Session endpoint with `ws`/`wss` scheme and the model query parameter
    fn session_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("invalid realtime URL '{}': {e}", self.url)))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(Error::Config(format!(
                    "unsupported realtime URL scheme '{other}'"
                )));
            }
        };
        if url.scheme() != scheme {
            url.set_scheme(scheme)
                .map_err(|()| Error::Config(format!("cannot use scheme {scheme} for {}", self.url)))?;
        }

        if !url.query_pairs().any(|(k, _)| k == "model") {
            url.query_pairs_mut().append_pair("model", &self.model);
        }
        Ok(url)
    }

    async fn connect(&self) -> Result<Connection> {
        let url = self.session_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Session(format!("failed to create client request: {e}")))?;

        let headers = request.headers_mut();
        headers.insert("Authorization", header(&format!("Bearer {}", self.api_key))?);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
        if let Some(org) = &self.organization {
            headers.insert("OpenAI-Organization", header(org)?);
        }
        if let Some(project) = &self.project_id {
            headers.insert("OpenAI-Project", header(project)?);
        }

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| Error::Session(format!("realtime connect error: {e}")))?;
        let (sink, source) = stream.split();

        tracing::info!(url = %url, model = %self.model, "connected to realtime API");
        Ok(Connection { sink, source })
    }

    fn session_update(&self) -> Value {
        json!({
            "type": "session.update",
            "session": {
                "modalities": ["text", "audio"],
                "instructions": self.instructions,
                "voice": self.voice,
                "output_audio_format": "pcm16",
                "temperature": self.temperature,
                "max_response_output_tokens": self.max_tokens,
            }
        })
    }

    async fn send_event(&mut self, event: &Value) -> Result<()> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| Error::Session("no active realtime session".to_string()))?;

        let text = serde_json::to_string(event)?;
        if let Err(e) = connection.sink.send(Message::Text(text.into())).await {
            self.connection = None;
            return Err(Error::Session(format!("realtime send error: {e}")));
        }
        Ok(())
    }

    /// Cancel an unfinished response and discard its remaining events
    ///
    /// A response that already finished on the server still has its
    /// `response.done` in flight, and the cancel is then rejected with an
    /// `error` that arrives after it. Both are consumed here so nothing of the
    /// old response reaches the next turn. If the drain cannot settle, the
    /// session is reopened.
    async fn cancel_pending_response(&mut self) -> Result<()> {
        tracing::debug!("cancelling unfinished realtime response");
        self.send_event(&json!({"type": "response.cancel"})).await?;

        let drain = async {
            while let Some(connection) = self.connection.as_mut() {
                match connection.source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                            continue;
                        };
                        match ServerEvent::from_value(&value) {
                            ServerEvent::Done { status, .. } if status == "cancelled" => {
                                return true;
                            }
                            // Finished before the cancel landed; its rejection follows
                            ServerEvent::Done { status, .. } => {
                                tracing::debug!(status = %status, "response finished before cancel");
                            }
                            ServerEvent::Failed(message) => {
                                tracing::debug!(error = %message, "cancel rejected");
                                return true;
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => {
                        self.connection = None;
                    }
                    Some(Ok(_)) => {}
                }
            }
            false
        };
        let settled = matches!(tokio::time::timeout(CANCEL_DRAIN_TIMEOUT, drain).await, Ok(true));

        self.response_pending = false;
        self.audio.clear();

        if !settled {
            tracing::warn!("cancelled response did not settle, reopening realtime session");
            self.open_session().await?;
        }
        Ok(())
    }

    /// Replace any connection with a fresh, configured one
    async fn open_session(&mut self) -> Result<()> {
        self.end_session().await;

        self.connection = Some(self.connect().await?);
        let update = self.session_update();
        self.send_event(&update).await
    }

    /// Map one server event onto the turn, returning the chunk to surface
    fn on_event(&mut self, event: ServerEvent, transcript: &mut String) -> Option<ResponseChunk> {
        match event {
            ServerEvent::TextDelta(delta) => {
                transcript.push_str(&delta);
                (!delta.is_empty()).then(|| ResponseChunk::delta(delta))
            }
            ServerEvent::AudioDelta(encoded) => {
                match BASE64.decode(encoded.as_bytes()) {
                    Ok(pcm) => self.audio.extend_from_slice(&pcm),
                    Err(e) => tracing::warn!(error = %e, "dropping undecodable audio delta"),
                }
                None
            }
            ServerEvent::Done { status, detail } => {
                self.response_pending = false;
                if status == "failed" {
                    Some(ResponseChunk::error(format!(
                        "realtime response failed: {}",
                        detail.unwrap_or_else(|| "no details".to_string())
                    )))
                } else {
                    Some(ResponseChunk::completed(transcript.trim().to_string()))
                }
            }
            ServerEvent::Failed(message) => {
                self.response_pending = false;
                Some(ResponseChunk::error(format!("realtime API error: {message}")))
            }
            ServerEvent::Other(kind) => {
                tracing::trace!(event = %kind, "ignoring realtime event");
                None
            }
        }
    }
}

fn header(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Config(format!("invalid header value: {e}")))
}

/// Realtime server events relevant to a turn
#[derive(Debug, PartialEq)]
enum ServerEvent {
    TextDelta(String),
    AudioDelta(String),
    Done {
        status: String,
        detail: Option<String>,
    },
    Failed(String),
    Other(String),
}

impl ServerEvent {
    fn from_value(value: &Value) -> Self {
        let kind = value["type"].as_str().unwrap_or_default();
        let delta = || value["delta"].as_str().unwrap_or_default().to_string();

        match kind {
            "response.text.delta" | "response.audio_transcript.delta" => Self::TextDelta(delta()),
            "response.audio.delta" => Self::AudioDelta(delta()),
            "response.done" => {
                let response = &value["response"];
                Self::Done {
                    status: response["status"]
                        .as_str()
                        .unwrap_or("completed")
                        .to_string(),
                    detail: response["status_details"]["error"]["message"]
                        .as_str()
                        .map(ToString::to_string),
                }
            }
            "error" => Self::Failed(
                value["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_string(),
            ),
            other => Self::Other(other.to_string()),
        }
    }
}

#[async_trait]
impl LanguageModelProvider for OpenAIRealtimeProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn initialize(&mut self, config: &ProviderConfig) -> Result<()> {
        self.api_key = config
            .api_key()
            .ok_or_else(|| Error::Config("OpenAI realtime provider requires api_key".to_string()))?
            .to_string();

        if let Some(url) = config.api_url() {
            self.url = url.to_string();
        }
        if let Some(model) = &config.model {
            self.model.clone_from(model);
        }
        if let Some(voice) = &config.voice {
            self.voice.clone_from(voice);
        }
        if let Some(instructions) = &config.instructions {
            self.instructions.clone_from(instructions);
        }
        self.temperature = config.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        self.max_tokens = config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        self.organization.clone_from(&config.organization);
        self.project_id.clone_from(&config.project_id);

        // URL problems surface now rather than at first session
        let url = self.session_url()?;
        tracing::info!(url = %url, model = %self.model, voice = %self.voice, "configured realtime provider");
        Ok(())
    }

    async fn start_session(&mut self) -> Result<()> {
        self.open_session().await?;
        tracing::info!("started realtime session");
        Ok(())
    }

    async fn send_message(&mut self, text: &str) -> Result<()> {
        if self.connection.is_none() {
            return Err(Error::Session("no active realtime session".to_string()));
        }
        if self.response_pending {
            self.cancel_pending_response().await?;
        }

        self.audio.clear();
        self.send_event(&json!({
            "type": "conversation.item.create",
            "item": {
                "type": "message",
                "role": "user",
                "content": [{"type": "input_text", "text": text}],
            }
        }))
        .await?;
        self.send_event(&json!({"type": "response.create"})).await?;
        self.response_pending = true;
        Ok(())
    }

    fn get_response_stream(&mut self) -> ChunkStream<'_> {
        let this = self;
        guard_terminal(async_stream::stream! {
            let mut transcript = String::new();
            loop {
                let Some(connection) = this.connection.as_mut() else {
                    yield ResponseChunk::error("no active realtime session");
                    return;
                };

                let message = connection.source.next().await;
                let event = match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Value>(text.as_str()) {
                            Ok(value) => ServerEvent::from_value(&value),
                            Err(e) => {
                                tracing::warn!(error = %e, "skipping malformed realtime event");
                                continue;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        this.connection = None;
                        this.response_pending = false;
                        yield ResponseChunk::error("realtime connection closed");
                        return;
                    }
                    Some(Err(e)) => {
                        this.connection = None;
                        this.response_pending = false;
                        yield ResponseChunk::error(format!("realtime receive error: {e}"));
                        return;
                    }
                    Some(Ok(_)) => continue,
                };

                if let Some(chunk) = this.on_event(event, &mut transcript) {
                    let terminal = chunk.is_terminal();
                    yield chunk;
                    if terminal {
                        return;
                    }
                }
            }
        })
    }

    async fn end_session(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.sink.send(Message::Close(None)).await {
                tracing::debug!(error = %e, "realtime close frame not delivered");
            }
            tracing::info!("ended realtime session");
        }
        self.response_pending = false;
        self.audio.clear();
    }

    fn interaction_style(&self) -> InteractionStyle {
        InteractionStyle::FullDuplexStreaming
    }

    fn take_native_audio(&mut self) -> Option<Vec<u8>> {
        if self.audio.is_empty() {
            return None;
        }
        let pcm = std::mem::take(&mut self.audio);
        match voice::pcm16_to_wav(&pcm, REALTIME_SAMPLE_RATE) {
            Ok(wav) => Some(wav),
            Err(e) => {
                tracing::warn!(error = %e, "failed to wrap realtime audio");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(url: &str) -> OpenAIRealtimeProvider {
        let mut provider = OpenAIRealtimeProvider::new();
        provider.url = url.to_string();
        provider
    }

    #[test]
    fn test_session_url_scheme_and_model() {
        let url = configured("https://api.openai.com/v1/realtime").session_url().unwrap();
        assert_eq!(
            url.as_str(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-mini-realtime-preview"
        );

        let url = configured("http://127.0.0.1:9000/v1/realtime?model=custom")
            .session_url()
            .unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9000/v1/realtime?model=custom");

        assert!(configured("ftp://example.com").session_url().is_err());
    }

    #[test]
    fn test_server_event_parsing() {
        let text = json!({"type": "response.audio_transcript.delta", "delta": "Hi"});
        assert_eq!(ServerEvent::from_value(&text), ServerEvent::TextDelta("Hi".into()));

        let done = json!({"type": "response.done", "response": {"status": "completed"}});
        assert_eq!(
            ServerEvent::from_value(&done),
            ServerEvent::Done {
                status: "completed".into(),
                detail: None
            }
        );

        let error = json!({"type": "error", "error": {"message": "bad key"}});
        assert_eq!(ServerEvent::from_value(&error), ServerEvent::Failed("bad key".into()));
    }

    #[test]
    fn test_events_build_a_turn() {
        let mut provider = OpenAIRealtimeProvider::new();
        provider.response_pending = true;
        let mut transcript = String::new();

        let audio = BASE64.encode([0u8, 0, 1, 0]);
        assert!(
            provider
                .on_event(ServerEvent::AudioDelta(audio), &mut transcript)
                .is_none()
        );
        assert_eq!(
            provider.on_event(ServerEvent::TextDelta("Blub ".into()), &mut transcript),
            Some(ResponseChunk::delta("Blub "))
        );
        let done = provider.on_event(
            ServerEvent::Done {
                status: "completed".into(),
                detail: None,
            },
            &mut transcript,
        );
        assert_eq!(done, Some(ResponseChunk::completed("Blub")));
        assert!(!provider.response_pending);

        let wav = provider.take_native_audio().unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert!(provider.take_native_audio().is_none());
    }

    #[tokio::test]
    async fn test_initialize_requires_key() {
        let mut provider = OpenAIRealtimeProvider::new();
        let err = provider
            .initialize(&ProviderConfig::named("openai"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
