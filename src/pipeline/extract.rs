//! Structured extraction: the one network call in a scan.
//!
//! [`ExtractionService`] is the seam between the pipeline and whatever
//! answers "what does this receipt say?". The default implementation,
//! [`LlmExtractionService`], asks a vision LLM through `edgequake-llm`;
//! tests and embedders can substitute their own.
//!
//! The service returns the response *text* only. It does not parse or
//! validate it: providers treat the schema as advisory, so repair happens in
//! [`crate::pipeline::parse`] regardless of which backend answered.
//!
//! No retry happens at this layer. A failed call fails the scan; retrying is
//! the user's decision.

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::pipeline::encode::ReceiptImage;
use crate::prompts::extraction_prompt;
use async_trait::async_trait;
use crate::config::{accepts_api_key, VERTEX_MODEL_PREFIX};
use edgequake_llm::{
    AnthropicProvider, ChatMessage, CompletionOptions, GeminiProvider, ImageData, LLMProvider,
    OpenAIProvider, OpenRouterProvider, ProviderFactory, ProviderType,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Body returned by an extraction service, plus usage accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResponse {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ExtractionResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Anything that can turn a receipt image into a JSON-ish text body.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Short identifier for logs, e.g. `"gemini/gemini-2.0-flash"`.
    fn name(&self) -> String;

    /// Local checks run before the image is loaded, so that a scan that
    /// cannot succeed fails before any download.
    fn preflight(&self) -> Result<(), ScanError> {
        Ok(())
    }

    /// Perform exactly one extraction call.
    async fn extract(&self, image: &ReceiptImage) -> Result<ExtractionResponse, ScanError>;
}

/// Extraction through an `edgequake-llm` vision provider.
///
/// The provider is resolved on every call so that the credential is read
/// from the environment at call time: a missing key fails with
/// [`ScanError::MissingCredential`] before anything touches the network.
pub struct LlmExtractionService {
    config: ScanConfig,
}

impl LlmExtractionService {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Resolve the provider, from most-specific to least-specific.
    ///
    /// 1. **Pre-built provider** (`config.provider`) — used as-is, no credential check.
    /// 2. **Key-accepting provider** (Gemini, OpenAI, Anthropic, OpenRouter) —
    ///    built from the key read out of the credential variable.
    /// 3. **Anything else** — the credential variable, if any, must be set;
    ///    then [`ProviderFactory::create_llm_provider`] builds it from its own
    ///    environment.
    fn resolve_provider(&self) -> Result<Arc<dyn LLMProvider>, ScanError> {
        if let Some(ref provider) = self.config.provider {
            return Ok(Arc::clone(provider));
        }

        let name = self.config.provider_name();
        let model = self.config.model();
        let key = match self.config.credential_env() {
            Some(var) => Some(read_credential(&var)?),
            None => None,
        };

        if let (Some(key), true) = (key, accepts_api_key(name, model)) {
            debug!("Building {} provider from configured credential", name);
            return provider_with_key(name, model, key).ok_or_else(|| {
                ScanError::InvalidConfig(format!("provider '{name}' does not take an API key"))
            });
        }

        ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            ScanError::InvalidConfig(format!("provider '{name}' could not be created: {e}"))
        })
    }

    fn build_messages(&self, image: &ReceiptImage) -> Vec<ChatMessage> {
        let system_prompt = self
            .config
            .system_prompt
            .clone()
            .unwrap_or_else(extraction_prompt);

        let image_data = ImageData::new(image.data.clone(), image.mime_type.clone());

        vec![
            ChatMessage::system(system_prompt.as_str()),
            // Text is a nudge only; the image carries the content.
            ChatMessage::user_with_images("Extract the receipt data as JSON.", vec![image_data]),
        ]
    }
}

#[async_trait]
impl ExtractionService for LlmExtractionService {
    fn preflight(&self) -> Result<(), ScanError> {
        if self.config.provider.is_none() {
            if let Some(var) = self.config.credential_env() {
                read_credential(&var)?;
            }
        }
        Ok(())
    }

    fn name(&self) -> String {
        if self.config.provider.is_some() {
            "custom".to_string()
        } else {
            format!("{}/{}", self.config.provider_name(), self.config.model())
        }
    }

    async fn extract(&self, image: &ReceiptImage) -> Result<ExtractionResponse, ScanError> {
        let provider = self.resolve_provider()?;
        let messages = self.build_messages(image);
        let options = build_options(&self.config);
        let secs = self.config.api_timeout_secs;

        let start = Instant::now();
        let response = timeout(
            Duration::from_secs(secs),
            provider.chat(&messages, Some(&options)),
        )
        .await
        .map_err(|_| {
            warn!("Extraction call timed out after {}s", secs);
            ScanError::Timeout { secs }
        })?
        .map_err(|e| ScanError::TransportFailure {
            message: e.to_string(),
        })?;

        debug!(
            "Extraction: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(ExtractionResponse {
            text: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}

/// Read the credential in `var`, trimmed.
///
/// # Errors
/// [`ScanError::MissingCredential`] unless `var` is set and non-blank.
pub fn read_credential(var: &str) -> Result<String, ScanError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ScanError::MissingCredential {
            env_var: var.to_string(),
        }),
    }
}

/// Build a key-accepting provider directly from `key`.
fn provider_with_key(name: &str, model: &str, key: String) -> Option<Arc<dyn LLMProvider>> {
    let provider: Arc<dyn LLMProvider> = match ProviderType::from_str(name)? {
        ProviderType::Gemini if !model.starts_with(VERTEX_MODEL_PREFIX) => {
            Arc::new(GeminiProvider::new(key).with_model(model))
        }
        ProviderType::OpenAI => Arc::new(OpenAIProvider::new(key).with_model(model)),
        ProviderType::Anthropic => Arc::new(AnthropicProvider::new(key).with_model(model)),
        ProviderType::OpenRouter => Arc::new(OpenRouterProvider::new(key).with_model(model)),
        _ => return None,
    };
    Some(provider)
}

/// Build `CompletionOptions` from the scan config.
fn build_options(config: &ScanConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
