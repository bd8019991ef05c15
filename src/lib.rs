//! Billy Gateway - provider front-end for a talking-fish voice assistant
//!
//! This library routes conversational text and speech synthesis to
//! interchangeable backends chosen by configuration:
//! - Language models: `OpenAI` realtime, Ollama, Kobold
//! - Voices: `OpenAI` TTS, `ChatterAI`, XTT
//! - Configuration resolution from environment and `config.toml`
//! - Turn orchestration across three interaction styles
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            CLI / hardware collaborators             │
//! │     stdin loop  │  button  │  speaker + motors      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Assistant                        │
//! │   OutputSink  │  turn dispatch  │  AudioSink        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 ProviderFactory                     │
//! │  LLM: openai │ ollama │ kobold                      │
//! │  Voice: openai │ chatterai │ xtt                    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod config;
pub mod error;
mod http;
pub mod llm;
pub mod registry;
pub mod voice;

pub use assistant::{
    Assistant, AudioSink, ConsoleOutput, FileAudioSink, InterruptHandle, LoggingAudioSink,
    OutputSink, TurnOutcome,
};
pub use config::{Config, EnvSnapshot, Modes, ProviderConfig};
pub use error::{Error, Result};
pub use llm::{
    ChunkStream, ConversationHistory, InteractionStyle, LanguageModelProvider, ResponseChunk,
};
pub use registry::{Capability, ProviderFactory, RequiredField};
pub use voice::{VoiceParams, VoiceProvider};
