//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use billy_gateway::config::ProviderConfig;
use billy_gateway::llm::guard_terminal;
use billy_gateway::{
    AudioSink, ChunkStream, Error, InteractionStyle, LanguageModelProvider, OutputSink,
    ResponseChunk, Result, VoiceParams, VoiceProvider,
};

/// Language-model provider that replays canned chunk sequences, one per turn
pub struct ScriptedProvider {
    style: InteractionStyle,
    turns: VecDeque<Vec<ResponseChunk>>,
    hang: bool,
    native_audio: Option<Vec<u8>>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub sessions_started: Arc<AtomicUsize>,
    pub sessions_ended: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new(style: InteractionStyle) -> Self {
        Self {
            style,
            turns: VecDeque::new(),
            hang: false,
            native_audio: None,
            sent: Arc::default(),
            sessions_started: Arc::default(),
            sessions_ended: Arc::default(),
        }
    }

    /// Queue the chunks for the next turn
    pub fn turn(mut self, chunks: Vec<ResponseChunk>) -> Self {
        self.turns.push_back(chunks);
        self
    }

    /// Never finish a stream after its scripted chunks
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Audio returned by `take_native_audio` after each turn
    pub fn with_native_audio(mut self, audio: Vec<u8>) -> Self {
        self.native_audio = Some(audio);
        self
    }
}

#[async_trait]
impl LanguageModelProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn initialize(&mut self, _config: &ProviderConfig) -> Result<()> {
        Ok(())
    }

    async fn start_session(&mut self) -> Result<()> {
        self.sessions_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_message(&mut self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn get_response_stream(&mut self) -> ChunkStream<'_> {
        let chunks = stream::iter(self.turns.pop_front().unwrap_or_default());
        if self.hang {
            guard_terminal(futures::StreamExt::chain(chunks, stream::pending()))
        } else {
            guard_terminal(chunks)
        }
    }

    async fn end_session(&mut self) {
        self.sessions_ended.fetch_add(1, Ordering::SeqCst);
    }

    fn interaction_style(&self) -> InteractionStyle {
        self.style
    }

    fn take_native_audio(&mut self) -> Option<Vec<u8>> {
        self.native_audio.clone()
    }
}

/// Voice provider that records every synthesis request
#[derive(Default)]
pub struct RecordingVoice {
    pub spoken: Arc<Mutex<Vec<String>>>,
    failures: Mutex<VecDeque<Error>>,
}

impl RecordingVoice {
    /// Fail the next synthesis with a backend error
    pub fn fail_next(self, status: u16, message: &str) -> Self {
        self.failures.lock().unwrap().push_back(Error::Synthesis {
            status: Some(status),
            message: message.to_string(),
        });
        self
    }
}

#[async_trait]
impl VoiceProvider for RecordingVoice {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn initialize(&mut self, _config: &ProviderConfig) -> Result<()> {
        Ok(())
    }

    async fn text_to_speech(&self, text: &str, _params: &VoiceParams) -> Result<Vec<u8>> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(format!("WAV:{text}").into_bytes())
    }

    fn get_supported_voices(&self) -> &'static [&'static str] {
        &["default"]
    }
}

/// What the output sink saw, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Fragment(String),
    Reply(String),
    Error(String),
    Interrupted,
}

#[derive(Default)]
pub struct RecordingOutput {
    pub events: Mutex<Vec<OutputEvent>>,
}

impl RecordingOutput {
    pub fn fragments(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Fragment(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Error(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }
}

impl OutputSink for RecordingOutput {
    fn fragment(&self, text: &str) {
        self.events
            .lock()
            .unwrap()
            .push(OutputEvent::Fragment(text.to_string()));
    }

    fn reply(&self, text: &str, _streamed: bool) {
        self.events
            .lock()
            .unwrap()
            .push(OutputEvent::Reply(text.to_string()));
    }

    fn error(&self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(OutputEvent::Error(message.to_string()));
    }

    fn interrupted(&self) {
        self.events.lock().unwrap().push(OutputEvent::Interrupted);
    }
}

/// Audio sink that keeps every clip with its text
#[derive(Default)]
pub struct RecordingAudio {
    pub clips: Mutex<Vec<(Vec<u8>, String)>>,
}

#[async_trait]
impl AudioSink for RecordingAudio {
    async fn play(&self, audio: Vec<u8>, text: &str) -> Result<()> {
        self.clips.lock().unwrap().push((audio, text.to_string()));
        Ok(())
    }
}
