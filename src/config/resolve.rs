//! Provider selection and per-field configuration resolution
//!
//! Selection per capability: explicit override > connection hint > default.
//! Each field: generic override > provider-specific variable > default literal.
//! Nothing here reads the process environment.

use std::str::FromStr;

use secrecy::SecretString;

use super::{EnvSnapshot, Modes, ProviderConfig};
use crate::{Error, Result};

/// Provider used when nothing selects another one
pub const DEFAULT_PROVIDER: &str = "openai";

/// Default system instructions when none are configured
pub const DEFAULT_INSTRUCTIONS: &str = "You are Billy, a talking fish with attitude.";

/// Variables whose presence selects a backend
struct Hint {
    provider: &'static str,
    vars: &'static [&'static str],
    /// Generic URL variable containing this marker also selects the backend
    url_marker: Option<(&'static str, &'static str)>,
}

const LLM_HINTS: &[Hint] = &[
    Hint {
        provider: "ollama",
        vars: &["OLLAMA_HOST", "OLLAMA_URL"],
        url_marker: None,
    },
    Hint {
        provider: "kobold",
        vars: &["KOBOLD_URL", "KOBOLD_HOST"],
        url_marker: None,
    },
];

const VOICE_HINTS: &[Hint] = &[
    Hint {
        provider: "chatterai",
        vars: &["CHATTERAI_API_KEY", "CHATTERAI_URL"],
        url_marker: Some(("VOICE_API_URL", "chatter")),
    },
    Hint {
        provider: "xtt",
        vars: &["XTT_API_URL", "XTT_HOST"],
        url_marker: Some(("VOICE_API_URL", "xtt")),
    },
];

fn matches_hint(env: &EnvSnapshot, hint: &Hint) -> bool {
    hint.vars.iter().any(|v| env.contains(v))
        || hint.url_marker.is_some_and(|(var, marker)| {
            env.get(var)
                .is_some_and(|url| url.to_lowercase().contains(marker))
        })
}

fn detect(env: &EnvSnapshot, override_var: &str, hints: &[Hint]) -> String {
    if let Some(explicit) = env.get(override_var) {
        return explicit.to_lowercase();
    }

    hints
        .iter()
        .find(|hint| matches_hint(env, hint))
        .map_or_else(|| DEFAULT_PROVIDER.to_string(), |hint| hint.provider.to_string())
}

/// Pick the language-model provider name
#[must_use]
pub fn detect_llm_provider(env: &EnvSnapshot) -> String {
    detect(env, "LLM_PROVIDER", LLM_HINTS)
}

/// Pick the voice provider name
#[must_use]
pub fn detect_voice_provider(env: &EnvSnapshot) -> String {
    detect(env, "VOICE_PROVIDER", VOICE_HINTS)
}

/// Prefix `http://` onto a bare `host:port`
#[must_use]
pub fn with_scheme(host: &str) -> String {
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

fn parse_var<T: FromStr>(env: &EnvSnapshot, keys: &[&str]) -> Result<Option<T>> {
    for key in keys {
        if let Some(raw) = env.get(key) {
            return raw.parse().map(Some).map_err(|_| {
                Error::Config(format!("{key} must be a number, got '{raw}'"))
            });
        }
    }
    Ok(None)
}

fn string_var(env: &EnvSnapshot, keys: &[&str], default: Option<&str>) -> Option<String> {
    env.first_of(keys).or(default).map(ToString::to_string)
}

fn secret_var(env: &EnvSnapshot, keys: &[&str]) -> Option<SecretString> {
    env.first_of(keys).map(|k| SecretString::from(k.to_string()))
}

/// URL chain: generic override, provider URL variables, host variables
/// (scheme added when missing), then the default literal
fn url_var(env: &EnvSnapshot, urls: &[&str], hosts: &[&str], default: Option<&str>) -> Option<String> {
    env.first_of(urls)
        .map(ToString::to_string)
        .or_else(|| env.first_of(hosts).map(with_scheme))
        .or_else(|| default.map(ToString::to_string))
}

/// Resolve the full language-model configuration
///
/// # Errors
///
/// Returns `Error::Config` if a numeric variable cannot be parsed
pub fn resolve_llm_config(env: &EnvSnapshot) -> Result<ProviderConfig> {
    let provider = detect_llm_provider(env);

    let mut config = match provider.as_str() {
        "openai" => ProviderConfig {
            model: string_var(env, &["LLM_MODEL", "OPENAI_MODEL"], Some("gpt-4o-mini-realtime-preview")),
            api_key: secret_var(env, &["LLM_API_KEY", "OPENAI_API_KEY"]),
            api_url: url_var(
                env,
                &["LLM_API_URL", "OPENAI_API_URL"],
                &[],
                Some("wss://api.openai.com/v1/realtime"),
            ),
            voice: string_var(env, &["VOICE"], Some("ash")),
            organization: string_var(env, &["OPENAI_ORGANIZATION"], None),
            project_id: string_var(env, &["OPENAI_PROJECT_ID"], None),
            ..ProviderConfig::default()
        },
        "ollama" => ProviderConfig {
            model: string_var(env, &["LLM_MODEL", "OLLAMA_MODEL"], Some("llama3.2:latest")),
            api_key: secret_var(env, &["LLM_API_KEY", "OLLAMA_API_KEY"]),
            api_url: url_var(
                env,
                &["LLM_API_URL", "OLLAMA_URL"],
                &["OLLAMA_HOST"],
                Some("http://localhost:11434"),
            ),
            ..ProviderConfig::default()
        },
        "kobold" => ProviderConfig {
            model: string_var(env, &["LLM_MODEL", "KOBOLD_MODEL"], Some("kobold")),
            api_key: secret_var(env, &["LLM_API_KEY", "KOBOLD_API_KEY"]),
            api_url: url_var(
                env,
                &["LLM_API_URL", "KOBOLD_URL"],
                &["KOBOLD_HOST"],
                Some("http://localhost:5000"),
            ),
            max_context: Some(
                parse_var(env, &["LLM_MAX_CONTEXT", "KOBOLD_MAX_CONTEXT"])?.unwrap_or(2048),
            ),
            ..ProviderConfig::default()
        },
        _ => ProviderConfig {
            model: string_var(env, &["LLM_MODEL"], None),
            api_key: secret_var(env, &["LLM_API_KEY"]),
            api_url: string_var(env, &["LLM_API_URL"], None),
            ..ProviderConfig::default()
        },
    };

    config.provider = provider;
    config.temperature = Some(parse_var(env, &["LLM_TEMPERATURE"])?.unwrap_or(0.7));
    config.max_tokens = Some(parse_var(env, &["LLM_MAX_TOKENS"])?.unwrap_or(150));
    if config.max_context.is_none() {
        config.max_context = parse_var(env, &["LLM_MAX_CONTEXT"])?;
    }
    config.instructions = string_var(env, &["LLM_INSTRUCTIONS"], Some(DEFAULT_INSTRUCTIONS));

    Ok(config)
}

/// Resolve the full voice configuration
///
/// # Errors
///
/// Returns `Error::Config` if a numeric variable cannot be parsed
pub fn resolve_voice_config(env: &EnvSnapshot) -> Result<ProviderConfig> {
    let provider = detect_voice_provider(env);

    let mut config = match provider.as_str() {
        "openai" => ProviderConfig {
            model: string_var(env, &["VOICE_MODEL", "OPENAI_VOICE_MODEL"], Some("tts-1")),
            voice: string_var(env, &["VOICE"], Some("ash")),
            api_key: secret_var(env, &["VOICE_API_KEY", "OPENAI_VOICE_API_KEY", "OPENAI_API_KEY"]),
            api_url: url_var(
                env,
                &["VOICE_API_URL", "OPENAI_VOICE_API_URL"],
                &[],
                Some("https://api.openai.com/v1"),
            ),
            organization: string_var(env, &["OPENAI_ORGANIZATION"], None),
            project_id: string_var(env, &["OPENAI_PROJECT_ID"], None),
            ..ProviderConfig::default()
        },
        "chatterai" => ProviderConfig {
            model: string_var(env, &["VOICE_MODEL", "CHATTERAI_MODEL"], Some("natural")),
            voice: string_var(env, &["VOICE"], Some("natural")),
            api_key: secret_var(env, &["VOICE_API_KEY", "CHATTERAI_API_KEY"]),
            api_url: url_var(
                env,
                &["VOICE_API_URL", "CHATTERAI_URL"],
                &[],
                Some("https://api.chatterai.com"),
            ),
            ..ProviderConfig::default()
        },
        "xtt" => ProviderConfig {
            model: string_var(env, &["VOICE_MODEL", "XTT_MODEL"], Some("default")),
            voice: string_var(env, &["VOICE"], Some("default")),
            api_key: secret_var(env, &["VOICE_API_KEY", "XTT_API_KEY"]),
            api_url: url_var(
                env,
                &["VOICE_API_URL", "XTT_API_URL"],
                &["XTT_HOST"],
                Some("http://localhost:8080"),
            ),
            ..ProviderConfig::default()
        },
        _ => ProviderConfig {
            model: string_var(env, &["VOICE_MODEL"], None),
            voice: string_var(env, &["VOICE"], None),
            api_key: secret_var(env, &["VOICE_API_KEY"]),
            api_url: string_var(env, &["VOICE_API_URL"], None),
            ..ProviderConfig::default()
        },
    };

    config.provider = provider;
    config.speed = Some(parse_var(env, &["VOICE_SPEED"])?.unwrap_or(1.0));

    Ok(config)
}

fn flag(env: &EnvSnapshot, key: &str, default: bool) -> bool {
    env.get(key).map_or(default, |v| {
        v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
    })
}

/// Resolve runtime modes
#[must_use]
pub fn resolve_modes(env: &EnvSnapshot) -> Modes {
    Modes {
        text_only: flag(env, "TEXT_ONLY_MODE", false),
        debug: flag(env, "DEBUG_MODE", false),
        debug_include_delta: flag(env, "DEBUG_MODE_INCLUDE_DELTA", false),
    }
}
