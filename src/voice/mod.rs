//! Voice synthesis providers
//!
//! Each provider turns text into opaque audio bytes (WAV for the bundled
//! backends). Available providers:
//! - `openai`: `OpenAI` speech endpoint
//! - `chatterai`: hosted `ChatterAI` TTS server
//! - `xtt`: self-hosted XTT server

mod chatterai;
mod openai;
mod server;
mod xtt;

pub use openai::OpenAIVoiceProvider;
pub use server::{ServerProfile, ServerVoiceProvider};

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::{Error, Result};

/// Slowest accepted playback rate
pub const MIN_SPEED: f32 = 0.25;
/// Fastest accepted playback rate
pub const MAX_SPEED: f32 = 4.0;
/// Rate used when none is configured
pub const DEFAULT_SPEED: f32 = 1.0;

/// Per-request synthesis options; absent fields use the provider's configured values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceParams {
    pub voice: Option<String>,
    pub speed: Option<f32>,
}

impl VoiceParams {
    #[must_use]
    pub fn new(voice: Option<String>, speed: Option<f32>) -> Self {
        Self { voice, speed }
    }
}

/// Capability interface for text-to-speech backends
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// Registry name of this provider
    fn name(&self) -> &'static str;

    /// Apply configuration and probe the backend
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a required field is missing, or
    /// `Error::Connectivity` if the backend cannot be reached
    async fn initialize(&mut self, config: &ProviderConfig) -> Result<()>;

    /// Synthesize `text` to audio bytes
    ///
    /// Unsupported voices and out-of-range speeds fall back to the configured
    /// defaults rather than failing.
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` if the backend rejects the request or
    /// cannot be reached
    async fn text_to_speech(&self, text: &str, params: &VoiceParams) -> Result<Vec<u8>>;

    /// Voice identifiers this provider accepts, in a fixed order
    fn get_supported_voices(&self) -> &'static [&'static str];
}

/// Pick the voice for one request
///
/// `configured` must already be a supported voice.
#[must_use]
pub fn choose_voice(requested: Option<&str>, configured: &str, supported: &[&str]) -> String {
    match requested {
        Some(voice) if is_supported(voice, supported) => voice.to_lowercase(),
        Some(voice) => {
            tracing::debug!(voice = %voice, fallback = %configured, "unsupported voice requested");
            configured.to_string()
        }
        None => configured.to_string(),
    }
}

/// Validate a configured voice, falling back to the provider default
#[must_use]
pub fn configured_voice(configured: Option<&str>, default: &str, supported: &[&str]) -> String {
    match configured {
        Some(voice) if is_supported(voice, supported) => voice.to_lowercase(),
        Some(voice) => {
            tracing::warn!(voice = %voice, fallback = %default, "configured voice not supported");
            default.to_string()
        }
        None => default.to_string(),
    }
}

/// Pick the playback rate for one request
#[must_use]
pub fn choose_speed(requested: Option<f32>, configured: f32) -> f32 {
    match requested {
        Some(speed) if speed_in_range(speed) => speed,
        _ if speed_in_range(configured) => configured,
        _ => DEFAULT_SPEED,
    }
}

fn speed_in_range(speed: f32) -> bool {
    speed.is_finite() && (MIN_SPEED..=MAX_SPEED).contains(&speed)
}

fn is_supported(voice: &str, supported: &[&str]) -> bool {
    supported.iter().any(|v| v.eq_ignore_ascii_case(voice))
}

/// Wrap little-endian 16-bit mono PCM in a WAV container
///
/// # Errors
///
/// Returns error if the WAV writer fails
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for pair in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Playback length of WAV bytes, if they parse as WAV
#[must_use]
pub fn wav_duration(wav: &[u8]) -> Option<Duration> {
    let reader = hound::WavReader::new(Cursor::new(wav)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return None;
    }
    let frames = reader.duration();
    Some(Duration::from_secs_f64(
        f64::from(frames) / f64::from(spec.sample_rate),
    ))
}
