//! Configuration types for receipt scanning.
//!
//! All scan behaviour is controlled through [`ScanConfig`], built via its
//! [`ScanConfigBuilder`]. Reference data and fee rates live here too, so the
//! normalizer receives everything explicitly instead of reaching for globals.

use crate::error::ScanError;
use crate::fees::FeeSchedule;
use crate::progress::ProgressCallback;
use crate::reference::ReferenceData;
use edgequake_llm::{LLMProvider, ProviderType};
use std::fmt;
use std::sync::Arc;

/// Provider used when none is configured.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Model prefix that routes Gemini through Vertex AI (gcloud auth, no key).
pub const VERTEX_MODEL_PREFIX: &str = "vertexai:";

/// Configuration for a receipt scan.
///
/// Built via [`ScanConfig::builder()`] or using [`ScanConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_scanpay::ScanConfig;
///
/// let config = ScanConfig::builder()
///     .model("gemini-2.0-flash")
///     .api_timeout_secs(20)
///     .bridge_fee_rate(0.015)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ScanConfig {
    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic", "ollama").
    /// If None, uses [`DEFAULT_PROVIDER`].
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`
    /// and skips the credential check.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Environment variable holding the API credential. If None, derived
    /// from the provider name (`GEMINI_API_KEY` for gemini, …).
    ///
    /// Read at call time, never cached, so rotating the key needs no restart.
    pub credential_env: Option<String>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction is transcription; any creativity is a defect.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 1024.
    pub max_tokens: usize,

    /// Timeout for the extraction call in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Maximum image dimension (width or height) sent to the provider. Default: 2000.
    ///
    /// Phone cameras produce 4000+ px photos; larger images cost more tokens
    /// without improving extraction of a receipt.
    pub max_image_pixels: u32,

    /// Custom system prompt. If None, uses the built-in extraction prompt.
    pub system_prompt: Option<String>,

    /// Fee rates applied to every quote.
    pub fees: FeeSchedule,

    /// Currency table, domestic-market keywords and placeholders.
    pub reference: Arc<ReferenceData>,

    /// Optional stage-event callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            credential_env: None,
            temperature: 0.0,
            max_tokens: 1024,
            api_timeout_secs: 30,
            download_timeout_secs: 60,
            max_image_pixels: 2000,
            system_prompt: None,
            fees: FeeSchedule::default(),
            reference: Arc::new(ReferenceData::default()),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("credential_env", &self.credential_env)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_image_pixels", &self.max_image_pixels)
            .field("fees", &self.fees)
            .field("currencies", &self.reference.rates.len())
            .finish()
    }
}

impl ScanConfig {
    /// Create a new builder for `ScanConfig`.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider_name.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Environment variable to read the credential from, or None for
    /// providers that need no key or find their own (local Ollama, LM
    /// Studio, Vertex AI, Azure).
    pub fn credential_env(&self) -> Option<String> {
        self.credential_env
            .clone()
            .or_else(|| default_credential_env(self.provider_name(), self.model()).map(str::to_string))
    }
}

/// API-key variable checked before calling `provider`.
///
/// For key-accepting providers (see [`accepts_api_key`]) the key is read
/// from here and handed over; for Mistral it is the variable the provider
/// reads itself.
pub fn default_credential_env(provider: &str, model: &str) -> Option<&'static str> {
    match ProviderType::from_str(provider)? {
        ProviderType::Gemini if model.starts_with(VERTEX_MODEL_PREFIX) => None,
        ProviderType::Gemini => Some("GEMINI_API_KEY"),
        ProviderType::OpenAI => Some("OPENAI_API_KEY"),
        ProviderType::Anthropic => Some("ANTHROPIC_API_KEY"),
        ProviderType::OpenRouter => Some("OPENROUTER_API_KEY"),
        ProviderType::Mistral => Some("MISTRAL_API_KEY"),
        _ => None,
    }
}

/// Whether `provider` can be built from a key read out of any variable.
///
/// The rest read fixed variables of their own, so a custom
/// `credential_env` cannot reach them.
pub fn accepts_api_key(provider: &str, model: &str) -> bool {
    match ProviderType::from_str(provider) {
        Some(ProviderType::Gemini) => !model.starts_with(VERTEX_MODEL_PREFIX),
        Some(ProviderType::OpenAI | ProviderType::Anthropic | ProviderType::OpenRouter) => true,
        _ => false,
    }
}

/// Builder for [`ScanConfig`].
#[derive(Debug)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn credential_env(mut self, var: impl Into<String>) -> Self {
        self.config.credential_env = Some(var.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_image_pixels(mut self, px: u32) -> Self {
        self.config.max_image_pixels = px.max(256);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn bridge_fee_rate(mut self, rate: f64) -> Self {
        self.config.fees.bridge_fee_rate = rate;
        self
    }

    pub fn tax_on_fee_rate(mut self, rate: f64) -> Self {
        self.config.fees.tax_on_fee_rate = rate;
        self
    }

    pub fn bank_markup_rate(mut self, rate: f64) -> Self {
        self.config.fees.bank_markup_rate = rate;
        self
    }

    pub fn reference(mut self, data: Arc<ReferenceData>) -> Self {
        self.config.reference = data;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScanConfig, ScanError> {
        let c = &self.config;
        c.fees.validate().map_err(ScanError::InvalidConfig)?;
        if c.api_timeout_secs == 0 {
            return Err(ScanError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ScanError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if let Some(ref var) = c.credential_env {
            if c.provider.is_none() && !accepts_api_key(c.provider_name(), c.model()) {
                return Err(ScanError::InvalidConfig(format!(
                    "provider '{}' reads its own credentials; credential variable '{}' cannot be used",
                    c.provider_name(),
                    var
                )));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ScanConfig::default();
        assert_eq!(c.provider_name(), "gemini");
        assert_eq!(c.model(), DEFAULT_MODEL);
        assert_eq!(c.api_timeout_secs, 30);
        assert_eq!(c.credential_env().as_deref(), Some("GEMINI_API_KEY"));
    }

    #[test]
    fn credential_env_follows_provider() {
        let c = ScanConfig::builder().provider_name("OpenAI").build().unwrap();
        assert_eq!(c.credential_env().as_deref(), Some("OPENAI_API_KEY"));

        let c = ScanConfig::builder().provider_name("ollama").build().unwrap();
        assert_eq!(c.credential_env(), None);

        let c = ScanConfig::builder()
            .model("vertexai:gemini-2.0-flash")
            .build()
            .unwrap();
        assert_eq!(c.credential_env(), None);

        let c = ScanConfig::builder().provider_name("mistral").build().unwrap();
        assert_eq!(c.credential_env().as_deref(), Some("MISTRAL_API_KEY"));
    }

    #[test]
    fn unknown_provider_has_no_credential_variable() {
        assert_eq!(default_credential_env("acme-vision", DEFAULT_MODEL), None);
    }

    #[test]
    fn custom_credential_env_needs_key_accepting_provider() {
        for provider in ["gemini", "openai", "anthropic", "openrouter"] {
            assert!(
                ScanConfig::builder()
                    .provider_name(provider)
                    .credential_env("API_KEY")
                    .build()
                    .is_ok(),
                "{provider}"
            );
        }
        for provider in ["mistral", "azure", "ollama"] {
            let err = ScanConfig::builder()
                .provider_name(provider)
                .credential_env("API_KEY")
                .build()
                .unwrap_err();
            assert!(matches!(err, ScanError::InvalidConfig(_)), "{provider}");
        }
    }

    #[test]
    fn explicit_credential_env_wins() {
        let c = ScanConfig::builder()
            .provider_name("openai")
            .credential_env("API_KEY")
            .build()
            .unwrap();
        assert_eq!(c.credential_env().as_deref(), Some("API_KEY"));
    }

    #[test]
    fn rejects_negative_fee_rate() {
        let err = ScanConfig::builder().bridge_fee_rate(-0.01).build().unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(ScanConfig::builder().api_timeout_secs(0).build().is_err());
    }

    #[test]
    fn clamps_image_pixels() {
        let c = ScanConfig::builder().max_image_pixels(10).build().unwrap();
        assert_eq!(c.max_image_pixels, 256);
    }
}
