//! Turn orchestration
//!
//! The [`Assistant`] owns the active language-model and voice providers and
//! runs one turn at a time: submit the user's text, drain the provider's chunk
//! stream according to its [`InteractionStyle`], then synthesize and hand the
//! audio to an [`AudioSink`]. User-visible text goes to an [`OutputSink`].

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Modes};
use crate::llm::{InteractionStyle, LanguageModelProvider, ResponseChunk};
use crate::registry::ProviderFactory;
use crate::voice::{VoiceParams, VoiceProvider};
use crate::{Error, Result};

/// Receives user-facing text
pub trait OutputSink: Send + Sync {
    /// A piece of a reply that is still being generated
    fn fragment(&self, text: &str);

    /// The finished reply; `streamed` is true when it already went out as fragments
    fn reply(&self, text: &str, streamed: bool);

    /// A turn failed
    fn error(&self, message: &str);

    /// A turn was interrupted before its reply completed
    fn interrupted(&self) {}
}

/// Receives synthesized audio together with the text it speaks
///
/// Playback and mouth/body animation attach here.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the audio cannot be delivered
    async fn play(&self, audio: Vec<u8>, text: &str) -> Result<()>;
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Reply was synthesized and handed to the audio sink
    Spoken(String),
    /// Reply produced but not synthesized (empty reply or text-only mode)
    Unspoken(String),
    /// A full-duplex provider voiced the reply itself
    Delegated(String),
    /// Backend or synthesis failure; the session stays active
    Failed(String),
    /// Interrupted before completion
    Cancelled,
}

/// Cloneable handle for observing and interrupting turns from another task
#[derive(Clone)]
pub struct InterruptHandle {
    busy: Arc<AtomicBool>,
    token: Arc<Mutex<CancellationToken>>,
}

impl InterruptHandle {
    /// Whether a turn is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Cancel the in-flight turn; returns false when idle
    pub fn interrupt(&self) -> bool {
        if !self.is_busy() {
            return false;
        }
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        true
    }

    fn begin_turn(&self) -> Result<(BusyGuard, CancellationToken)> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Session("a turn is already in progress".to_string()));
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        let token = CancellationToken::new();
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        Ok((guard, token))
    }
}

/// Clears the busy flag when a turn ends, however it ends
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Voice-assistant front-end driving one provider pair
pub struct Assistant {
    llm: Box<dyn LanguageModelProvider>,
    voice: Option<Box<dyn VoiceProvider>>,
    voice_params: VoiceParams,
    modes: Modes,
    output: Arc<dyn OutputSink>,
    audio: Arc<dyn AudioSink>,
    handle: InterruptHandle,
    session_active: bool,
}

impl Assistant {
    /// Assemble an assistant from initialized providers
    ///
    /// `voice` may be `None` in text-only setups.
    #[must_use]
    pub fn new(
        llm: Box<dyn LanguageModelProvider>,
        voice: Option<Box<dyn VoiceProvider>>,
        modes: Modes,
    ) -> Self {
        Self {
            llm,
            voice,
            voice_params: VoiceParams::default(),
            modes,
            output: Arc::new(ConsoleOutput::default()),
            audio: Arc::new(LoggingAudioSink),
            handle: InterruptHandle {
                busy: Arc::new(AtomicBool::new(false)),
                token: Arc::new(Mutex::new(CancellationToken::new())),
            },
            session_active: false,
        }
    }

    /// Create and initialize both providers from resolved configuration
    ///
    /// The voice provider is skipped in text-only mode.
    ///
    /// # Errors
    ///
    /// Returns the factory's startup failure (unknown provider or failed
    /// initialization)
    pub async fn from_config(config: &Config, factory: &ProviderFactory) -> Result<Self> {
        let llm = factory.create_llm_provider(&config.llm).await?;
        let voice = if config.modes.text_only {
            tracing::info!("text-only mode, voice provider not created");
            None
        } else {
            Some(factory.create_voice_provider(&config.voice).await?)
        };

        let mut assistant = Self::new(llm, voice, config.modes);
        assistant.voice_params = VoiceParams::new(config.voice.voice.clone(), config.voice.speed);
        Ok(assistant)
    }

    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn OutputSink>) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_audio_sink(mut self, audio: Arc<dyn AudioSink>) -> Self {
        self.audio = audio;
        self
    }

    #[must_use]
    pub fn with_voice_params(mut self, params: VoiceParams) -> Self {
        self.voice_params = params;
        self
    }

    /// Handle for interrupting turns from another task
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn interaction_style(&self) -> InteractionStyle {
        self.llm.interaction_style()
    }

    #[must_use]
    pub const fn is_session_active(&self) -> bool {
        self.session_active
    }

    /// Open (or reopen) the provider session
    ///
    /// # Errors
    ///
    /// Returns error if the provider cannot open a session
    pub async fn start_session(&mut self) -> Result<()> {
        self.llm.start_session().await?;
        self.session_active = true;
        tracing::info!(
            provider = self.llm.name(),
            style = %self.llm.interaction_style(),
            "session started"
        );
        Ok(())
    }

    /// Close the provider session
    pub async fn shutdown(&mut self) {
        self.handle.interrupt();
        if self.session_active {
            self.llm.end_session().await;
            self.session_active = false;
            tracing::info!(provider = self.llm.name(), "session ended");
        }
    }

    /// Run one turn for `text`
    ///
    /// Backend and synthesis failures are reported through the output sink
    /// and returned as [`TurnOutcome::Failed`]; the session stays active.
    ///
    /// # Errors
    ///
    /// Returns `Error::Session` if a turn is already running or the session
    /// cannot be opened
    pub async fn process_user_input(&mut self, text: &str) -> Result<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(TurnOutcome::Unspoken(String::new()));
        }

        if !self.session_active {
            self.start_session().await?;
        }

        let (_busy, token) = self.handle.begin_turn()?;
        tracing::debug!(input = %text, "processing user input");

        tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::info!("turn interrupted");
                self.output.interrupted();
                Ok(TurnOutcome::Cancelled)
            }
            outcome = self.run_turn(text) => Ok(outcome),
        }
    }

    async fn run_turn(&mut self, text: &str) -> TurnOutcome {
        if let Err(e) = self.llm.send_message(text).await {
            return self.fail(e.to_string());
        }

        match self.llm.interaction_style() {
            InteractionStyle::FullDuplexStreaming => self.full_duplex_turn().await,
            InteractionStyle::IncrementalStreaming => self.incremental_turn().await,
            InteractionStyle::RequestResponse => self.request_response_turn().await,
        }
    }

    /// Provider voices the reply; only surface text and any native audio
    async fn full_duplex_turn(&mut self) -> TurnOutcome {
        let debug_delta = self.modes.debug_include_delta;
        let mut transcript = String::new();
        let mut streamed = false;
        let mut failure = None;

        {
            let mut stream = self.llm.get_response_stream();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    ResponseChunk::IncrementalText { text, done } => {
                        if !text.is_empty() {
                            log_delta(debug_delta, &text);
                            self.output.fragment(&text);
                            streamed = true;
                        }
                        if done {
                            break;
                        }
                    }
                    ResponseChunk::CompletedText { text, .. } => {
                        transcript = text;
                        break;
                    }
                    ResponseChunk::Error { message } => {
                        failure = Some(message);
                        break;
                    }
                }
            }
        }

        let native_audio = self.llm.take_native_audio();
        if let Some(message) = failure {
            return self.fail(message);
        }

        self.output.reply(&transcript, streamed);
        if let Some(audio) = native_audio.filter(|_| !self.modes.text_only) {
            deliver(&*self.audio, &*self.output, audio, &transcript).await;
        }
        TurnOutcome::Delegated(transcript)
    }

    /// Surface each fragment, then speak the assembled reply
    async fn incremental_turn(&mut self) -> TurnOutcome {
        let debug_delta = self.modes.debug_include_delta;
        let mut accumulated = String::new();
        let mut failure = None;

        {
            let mut stream = self.llm.get_response_stream();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    ResponseChunk::IncrementalText { text, done }
                    | ResponseChunk::CompletedText { text, done } => {
                        if !text.is_empty() {
                            log_delta(debug_delta, &text);
                            self.output.fragment(&text);
                            accumulated.push_str(&text);
                        }
                        if done {
                            break;
                        }
                    }
                    ResponseChunk::Error { message } => {
                        failure = Some(message);
                        break;
                    }
                }
            }
        }

        if let Some(message) = failure {
            return self.fail(message);
        }

        let reply = accumulated.trim().to_string();
        self.output.reply(&reply, true);
        self.speak(reply).await
    }

    /// One atomic reply, spoken as soon as it arrives
    async fn request_response_turn(&mut self) -> TurnOutcome {
        let terminal = {
            let mut stream = self.llm.get_response_stream();
            let mut partial = String::new();
            let mut terminal = None;
            while let Some(chunk) = stream.next().await {
                match chunk {
                    ResponseChunk::CompletedText { text, .. } => {
                        partial.push_str(&text);
                        terminal = Some(Ok(partial));
                        break;
                    }
                    ResponseChunk::IncrementalText { text, done } => {
                        partial.push_str(&text);
                        if done {
                            terminal = Some(Ok(partial));
                            break;
                        }
                    }
                    ResponseChunk::Error { message } => {
                        terminal = Some(Err(message));
                        break;
                    }
                }
            }
            terminal
        };

        match terminal {
            Some(Ok(text)) => {
                let reply = text.trim().to_string();
                self.output.reply(&reply, false);
                self.speak(reply).await
            }
            Some(Err(message)) => self.fail(message),
            None => self.fail("response stream ended before completion".to_string()),
        }
    }

    async fn speak(&self, text: String) -> TurnOutcome {
        if text.is_empty() {
            return TurnOutcome::Unspoken(text);
        }
        if self.modes.text_only {
            tracing::debug!("text-only mode, skipping synthesis");
            return TurnOutcome::Unspoken(text);
        }
        let Some(voice) = self.voice.as_ref() else {
            return TurnOutcome::Unspoken(text);
        };

        match voice.text_to_speech(&text, &self.voice_params).await {
            Ok(audio) => {
                deliver(&*self.audio, &*self.output, audio, &text).await;
                TurnOutcome::Spoken(text)
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn fail(&self, message: String) -> TurnOutcome {
        tracing::warn!(error = %message, "turn failed");
        self.output.error(&message);
        TurnOutcome::Failed(message)
    }
}

async fn deliver(sink: &dyn AudioSink, output: &dyn OutputSink, audio: Vec<u8>, text: &str) {
    if let Err(e) = sink.play(audio, text).await {
        tracing::warn!(error = %e, "audio sink failed");
        output.error(&e.to_string());
    }
}

fn log_delta(enabled: bool, text: &str) {
    if enabled {
        tracing::debug!(fragment = %text, "delta");
    }
}

/// Prints replies to stdout and errors to stderr
#[derive(Default)]
pub struct ConsoleOutput {
    open_line: AtomicBool,
}

impl OutputSink for ConsoleOutput {
    fn fragment(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        if !self.open_line.swap(true, Ordering::AcqRel) {
            let _ = write!(stdout, "Billy: ");
        }
        let _ = write!(stdout, "{text}");
        let _ = stdout.flush();
    }

    fn reply(&self, text: &str, streamed: bool) {
        if self.open_line.swap(false, Ordering::AcqRel) {
            println!();
        } else if !streamed && !text.is_empty() {
            println!("Billy: {text}");
        }
    }

    fn error(&self, message: &str) {
        if self.open_line.swap(false, Ordering::AcqRel) {
            println!();
        }
        eprintln!("error: {message}");
    }

    fn interrupted(&self) {
        if self.open_line.swap(false, Ordering::AcqRel) {
            println!();
        }
    }
}

/// Logs audio deliveries without playing them
pub struct LoggingAudioSink;

#[async_trait]
impl AudioSink for LoggingAudioSink {
    async fn play(&self, audio: Vec<u8>, text: &str) -> Result<()> {
        let duration = crate::voice::wav_duration(&audio);
        tracing::info!(
            bytes = audio.len(),
            duration_ms = duration.map(|d| d.as_millis()),
            chars = text.len(),
            "audio ready"
        );
        Ok(())
    }
}

/// Writes each delivered clip to a numbered WAV file in a directory
pub struct FileAudioSink {
    dir: PathBuf,
    counter: AtomicUsize,
}

impl FileAudioSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AudioSink for FileAudioSink {
    async fn play(&self, audio: Vec<u8>, _text: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let path = self.dir.join(format!("reply-{n:04}.wav"));
        tokio::fs::write(&path, &audio).await?;
        tracing::info!(path = %path.display(), bytes = audio.len(), "wrote reply audio");
        Ok(())
    }
}
