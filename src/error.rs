//! Error types for the Billy gateway

use thiserror::Error;

use crate::registry::Capability;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Billy gateway
#[derive(Debug, Error)]
pub enum Error {
    /// A required configuration field is missing or malformed
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend reachability probe failed
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Requested provider name is not registered
    #[error("unknown {capability} provider '{name}', available: {}", .available.join(", "))]
    UnknownProvider {
        capability: Capability,
        name: String,
        available: Vec<String>,
    },

    /// Provider was found but failed to initialize
    #[error("failed to initialize {capability} provider '{provider}': {source}")]
    Initialization {
        capability: Capability,
        provider: String,
        #[source]
        source: Box<Error>,
    },

    /// Text-to-speech backend rejected or failed a request
    #[error("synthesis error{}: {message}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Synthesis {
        status: Option<u16>,
        message: String,
    },

    /// Session lifecycle misuse (no session, turn in progress)
    #[error("session error: {0}")]
    Session(String),

    /// Audio container error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error aborts startup rather than a single turn
    #[must_use]
    pub const fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Self::UnknownProvider { .. } | Self::Initialization { .. } | Self::Config(_)
        )
    }
}
