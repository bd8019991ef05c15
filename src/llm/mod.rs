//! Language-model providers
//!
//! Every backend, whatever its native protocol, answers a turn with a lazy
//! stream of [`ResponseChunk`] values. Available providers:
//! - `openai`: realtime WebSocket session (full duplex)
//! - `ollama`: chat endpoint with newline-delimited JSON deltas (incremental)
//! - `kobold`: single-shot generate endpoint (request/response)

mod history;
mod kobold;
mod ollama;
mod openai;

pub use history::{ConversationHistory, Role, Utterance, MIN_RETAINED_ENTRIES};
pub use kobold::KoboldProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIRealtimeProvider;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::config::ProviderConfig;

/// One unit of a provider's response to a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseChunk {
    /// A fragment of a reply that is still being generated
    IncrementalText { text: String, done: bool },
    /// The whole reply, delivered at once
    CompletedText { text: String, done: bool },
    /// The turn failed; always terminal
    Error { message: String },
}

impl ResponseChunk {
    /// Non-terminal text fragment
    pub fn delta(text: impl Into<String>) -> Self {
        Self::IncrementalText {
            text: text.into(),
            done: false,
        }
    }

    /// Terminal marker for an incremental stream, optionally carrying a last fragment
    pub fn final_delta(text: impl Into<String>) -> Self {
        Self::IncrementalText {
            text: text.into(),
            done: true,
        }
    }

    /// Terminal chunk carrying the whole reply
    pub fn completed(text: impl Into<String>) -> Self {
        Self::CompletedText {
            text: text.into(),
            done: true,
        }
    }

    /// Terminal error chunk
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether no further chunks follow this one
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        match self {
            Self::IncrementalText { done, .. } | Self::CompletedText { done, .. } => *done,
            Self::Error { .. } => true,
        }
    }

    /// Text payload, if this is a text chunk
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::IncrementalText { text, .. } | Self::CompletedText { text, .. } => Some(text),
            Self::Error { .. } => None,
        }
    }
}

/// Structural shape of a provider's backend protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStyle {
    /// Provider owns a bidirectional channel and may speak on its own
    FullDuplexStreaming,
    /// Text arrives as a sequence of deltas
    IncrementalStreaming,
    /// One atomic answer per request
    RequestResponse,
}

impl fmt::Display for InteractionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullDuplexStreaming => write!(f, "full-duplex"),
            Self::IncrementalStreaming => write!(f, "incremental"),
            Self::RequestResponse => write!(f, "request-response"),
        }
    }
}

/// Lazy, finite sequence of chunks for one turn
///
/// Dropping the stream abandons the turn and closes any underlying request.
pub type ChunkStream<'a> = Pin<Box<dyn Stream<Item = ResponseChunk> + Send + 'a>>;

/// Capability interface for conversational backends
#[async_trait]
pub trait LanguageModelProvider: Send + Sync {
    /// Registry name of this provider
    fn name(&self) -> &'static str;

    /// Apply configuration and probe the backend
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a required field is missing, or
    /// `Error::Connectivity` if the backend cannot be reached
    async fn initialize(&mut self, config: &ProviderConfig) -> Result<()>;

    /// Open a fresh session, discarding any active one
    ///
    /// # Errors
    ///
    /// Returns error if a stateful backend connection cannot be opened
    async fn start_session(&mut self) -> Result<()>;

    /// Submit a user message; does not wait for the reply
    ///
    /// # Errors
    ///
    /// Returns error if the message cannot be forwarded to a live connection
    async fn send_message(&mut self, text: &str) -> Result<()>;

    /// Reply to the most recently submitted message
    fn get_response_stream(&mut self) -> ChunkStream<'_>;

    /// Release session resources; a no-op when no session is active
    async fn end_session(&mut self);

    /// Interaction style, constant for the lifetime of the instance
    fn interaction_style(&self) -> InteractionStyle;

    /// Audio the backend produced itself during the last turn
    fn take_native_audio(&mut self) -> Option<Vec<u8>> {
        None
    }
}

/// Enforce the one-terminal-chunk contract on a provider stream
///
/// Stops after the first terminal chunk and appends an error chunk if the
/// inner stream ends without one.
pub fn guard_terminal<'a, S>(inner: S) -> ChunkStream<'a>
where
    S: Stream<Item = ResponseChunk> + Send + 'a,
{
    Box::pin(async_stream::stream! {
        let mut inner = std::pin::pin!(inner);
        while let Some(chunk) = inner.next().await {
            let terminal = chunk.is_terminal();
            yield chunk;
            if terminal {
                return;
            }
        }
        yield ResponseChunk::error("response stream ended before completion");
    })
}
