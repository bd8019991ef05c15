//! Provider registry and factory
//!
//! Maps provider names to constructors for each capability. Lookup is
//! case-insensitive and the registries are frozen once the factory is built.

use std::fmt;
use std::sync::{Arc, LazyLock};

use serde::Serialize;

use crate::config::ProviderConfig;
use crate::llm::{KoboldProvider, LanguageModelProvider, OllamaProvider, OpenAIRealtimeProvider};
use crate::voice::{OpenAIVoiceProvider, ServerVoiceProvider, VoiceProvider};
use crate::{Error, Result};

/// Kind of provider a registry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Llm,
    Voice,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Llm => write!(f, "llm"),
            Self::Voice => write!(f, "voice"),
        }
    }
}

/// Config field a provider cannot start without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    ApiKey,
    ApiUrl,
}

impl RequiredField {
    fn is_present(self, config: &ProviderConfig) -> bool {
        match self {
            Self::ApiKey => config.api_key().is_some(),
            Self::ApiUrl => config.api_url().is_some(),
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey => write!(f, "api_key"),
            Self::ApiUrl => write!(f, "api_url"),
        }
    }
}

/// Builds a fresh, uninitialized provider
pub type Constructor<T> = Arc<dyn Fn() -> Box<T> + Send + Sync>;

/// One name → constructor entry
pub struct Registration<T: ?Sized> {
    name: String,
    required: Vec<RequiredField>,
    constructor: Constructor<T>,
}

impl<T: ?Sized> Registration<T> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn required_fields(&self) -> &[RequiredField] {
        &self.required
    }
}

/// Ordered registry for one capability
pub struct ProviderRegistry<T: ?Sized> {
    capability: Capability,
    entries: Vec<Registration<T>>,
}

impl<T: ?Sized> ProviderRegistry<T> {
    #[must_use]
    pub const fn new(capability: Capability) -> Self {
        Self {
            capability,
            entries: Vec::new(),
        }
    }

    /// Register a constructor, replacing any entry with the same name
    pub fn register(
        &mut self,
        name: &str,
        required: &[RequiredField],
        constructor: Constructor<T>,
    ) {
        let name = name.trim().to_lowercase();
        let registration = Registration {
            name: name.clone(),
            required: required.to_vec(),
            constructor,
        };

        if let Some(existing) = self.entries.iter_mut().find(|r| r.name == name) {
            tracing::debug!(capability = %self.capability, provider = %name, "replacing provider registration");
            *existing = registration;
        } else {
            self.entries.push(registration);
        }
    }

    /// Registration for `name`, compared case-insensitively
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownProvider` listing every registered name
    pub fn lookup(&self, name: &str) -> Result<&Registration<T>> {
        let key = name.trim().to_lowercase();
        self.entries
            .iter()
            .find(|r| r.name == key)
            .ok_or_else(|| Error::UnknownProvider {
                capability: self.capability,
                name: key,
                available: self.names(),
            })
    }

    /// Registered names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.name.clone()).collect()
    }

    /// Check the minimum required fields without instantiating anything
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownProvider` for unregistered names, or
    /// `Error::Config` naming the first missing field
    pub fn validate(&self, config: &ProviderConfig) -> Result<()> {
        let registration = self.lookup(&config.provider)?;
        if let Some(field) = registration
            .required
            .iter()
            .find(|field| !field.is_present(config))
        {
            return Err(Error::Config(format!(
                "{} {} provider requires {field}",
                registration.name, self.capability
            )));
        }
        Ok(())
    }

    fn instantiate(&self, config: &ProviderConfig) -> Result<(String, Box<T>)> {
        let registration = self.lookup(&config.provider)?;
        Ok((registration.name.clone(), (registration.constructor)()))
    }
}

/// Creates initialized providers by name
pub struct ProviderFactory {
    llm: ProviderRegistry<dyn LanguageModelProvider>,
    voice: ProviderRegistry<dyn VoiceProvider>,
}

static BUILTIN: LazyLock<ProviderFactory> =
    LazyLock::new(|| ProviderFactoryBuilder::new().with_builtins().build());

impl ProviderFactory {
    /// Factory with the bundled providers
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    /// Start an empty factory
    #[must_use]
    pub fn builder() -> ProviderFactoryBuilder {
        ProviderFactoryBuilder::new()
    }

    /// Instantiate and initialize the language-model provider named by `config`
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownProvider` if the name is not registered, or
    /// `Error::Initialization` wrapping the provider's own failure
    pub async fn create_llm_provider(
        &self,
        config: &ProviderConfig,
    ) -> Result<Box<dyn LanguageModelProvider>> {
        let (name, mut provider) = self.llm.instantiate(config)?;
        provider
            .initialize(config)
            .await
            .map_err(|e| initialization_error(Capability::Llm, &name, e))?;

        tracing::info!(
            provider = %name,
            style = %provider.interaction_style(),
            "initialized language model provider"
        );
        Ok(provider)
    }

    /// Instantiate and initialize the voice provider named by `config`
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownProvider` if the name is not registered, or
    /// `Error::Initialization` wrapping the provider's own failure
    pub async fn create_voice_provider(
        &self,
        config: &ProviderConfig,
    ) -> Result<Box<dyn VoiceProvider>> {
        let (name, mut provider) = self.voice.instantiate(config)?;
        provider
            .initialize(config)
            .await
            .map_err(|e| initialization_error(Capability::Voice, &name, e))?;

        tracing::info!(provider = %name, "initialized voice provider");
        Ok(provider)
    }

    /// Dry-run check of the fields `config`'s provider needs
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownProvider` or `Error::Config`
    pub fn validate_config(&self, capability: Capability, config: &ProviderConfig) -> Result<()> {
        match capability {
            Capability::Llm => self.llm.validate(config),
            Capability::Voice => self.voice.validate(config),
        }
    }

    #[must_use]
    pub fn available_llm_providers(&self) -> Vec<String> {
        self.llm.names()
    }

    #[must_use]
    pub fn available_voice_providers(&self) -> Vec<String> {
        self.voice.names()
    }

    /// Required fields of a registered provider
    #[must_use]
    pub fn required_fields(&self, capability: Capability, name: &str) -> Option<Vec<RequiredField>> {
        let required = match capability {
            Capability::Llm => self.llm.lookup(name).ok()?.required_fields(),
            Capability::Voice => self.voice.lookup(name).ok()?.required_fields(),
        };
        Some(required.to_vec())
    }
}

fn initialization_error(capability: Capability, provider: &str, source: Error) -> Error {
    tracing::error!(capability = %capability, provider = %provider, error = %source, "provider failed to initialize");
    Error::Initialization {
        capability,
        provider: provider.to_string(),
        source: Box::new(source),
    }
}

/// Collects registrations before the factory is frozen
pub struct ProviderFactoryBuilder {
    llm: ProviderRegistry<dyn LanguageModelProvider>,
    voice: ProviderRegistry<dyn VoiceProvider>,
}

impl Default for ProviderFactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactoryBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            llm: ProviderRegistry::new(Capability::Llm),
            voice: ProviderRegistry::new(Capability::Voice),
        }
    }

    /// Register the bundled providers
    #[must_use]
    pub fn with_builtins(self) -> Self {
        use RequiredField::{ApiKey, ApiUrl};

        self.llm("openai", &[ApiKey], || Box::new(OpenAIRealtimeProvider::new()))
            .llm("ollama", &[ApiUrl], || Box::new(OllamaProvider::new()))
            .llm("kobold", &[ApiUrl], || Box::new(KoboldProvider::new()))
            .voice("openai", &[ApiKey], || Box::new(OpenAIVoiceProvider::new()))
            .voice("chatterai", &[ApiKey, ApiUrl], || {
                Box::new(ServerVoiceProvider::chatterai())
            })
            .voice("xtt", &[ApiUrl], || Box::new(ServerVoiceProvider::xtt()))
    }

    /// Register a language-model constructor
    #[must_use]
    pub fn llm<F>(mut self, name: &str, required: &[RequiredField], constructor: F) -> Self
    where
        F: Fn() -> Box<dyn LanguageModelProvider> + Send + Sync + 'static,
    {
        self.llm.register(name, required, Arc::new(constructor));
        self
    }

    /// Register a voice constructor
    #[must_use]
    pub fn voice<F>(mut self, name: &str, required: &[RequiredField], constructor: F) -> Self
    where
        F: Fn() -> Box<dyn VoiceProvider> + Send + Sync + 'static,
    {
        self.voice.register(name, required, Arc::new(constructor));
        self
    }

    #[must_use]
    pub fn build(self) -> ProviderFactory {
        ProviderFactory {
            llm: self.llm,
            voice: self.voice,
        }
    }
}
