//! Text generation: the seam between narrative prompts and the model.
//!
//! [`TextGenerator`] is the only thing the narrative step needs from the
//! outside world: prompt in, free text out. [`ProviderTextGenerator`] backs
//! it with any `edgequake_llm` provider; tests and embedders can supply
//! their own implementation through
//! [`crate::config::ReportConfigBuilder::generator`].

use crate::config::ReportConfig;
use crate::error::HtpError;
use crate::prompts::NARRATIVE_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

/// Produces free text for a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short name used in logs, e.g. `"gemini/gemini-2.5-flash-lite"`.
    fn name(&self) -> &str;

    /// Generate a reply for `prompt`. One call, no retries.
    async fn generate(&self, prompt: &str) -> Result<String, HtpError>;
}

/// [`TextGenerator`] backed by an `edgequake_llm` provider.
pub struct ProviderTextGenerator {
    provider: Arc<dyn LLMProvider>,
    name: String,
    options: CompletionOptions,
    timeout_secs: u64,
}

impl ProviderTextGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, name: impl Into<String>, config: &ReportConfig) -> Self {
        Self {
            provider,
            name: name.into(),
            options: build_options(config),
            timeout_secs: config.api_timeout_secs,
        }
    }
}

#[async_trait]
impl TextGenerator for ProviderTextGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    /// Send the fixed system message followed by `prompt` as the user turn.
    async fn generate(&self, prompt: &str) -> Result<String, HtpError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(NARRATIVE_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        let call = self.provider.chat(&messages, Some(&self.options));
        let response = timeout(Duration::from_secs(self.timeout_secs), call)
            .await
            .map_err(|_| HtpError::LlmApiError {
                message: format!("{} timed out after {}s", self.name, self.timeout_secs),
            })?
            .map_err(|e| HtpError::LlmApiError {
                message: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.name,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(response.content)
    }
}

/// API-key variable a named provider reads, or `None` for local providers.
pub fn api_key_var(provider_name: &str) -> Option<&'static str> {
    match provider_name.to_ascii_lowercase().as_str() {
        "gemini" | "google" => Some("GEMINI_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "mistral" => Some("MISTRAL_API_KEY"),
        "xai" => Some("XAI_API_KEY"),
        "openrouter" => Some("OPENROUTER_API_KEY"),
        _ => None,
    }
}

/// Resolve the text generator, from most-specific to least-specific.
///
/// 1. **Pre-built generator** (`config.generator`), used as-is.
/// 2. **Pre-built provider** (`config.provider`), wrapped.
/// 3. **Named provider + model** (`config.provider_name`, `config.model`).
///    The provider's API key variable is checked first, so a missing key is
///    reported before any provider is constructed.
pub fn resolve_generator(config: &ReportConfig) -> Result<Arc<dyn TextGenerator>, HtpError> {
    if let Some(ref generator) = config.generator {
        return Ok(Arc::clone(generator));
    }

    let name = format!("{}/{}", config.provider_name, config.model);

    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderTextGenerator::new(
            Arc::clone(provider),
            name,
            config,
        )));
    }

    if let Some(var) = api_key_var(&config.provider_name) {
        let present = std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false);
        if !present {
            return Err(HtpError::MissingApiKey {
                provider: config.provider_name.clone(),
                var: var.to_string(),
            });
        }
    }

    let provider = ProviderFactory::create_llm_provider(&config.provider_name, &config.model)
        .map_err(|e| HtpError::ProviderNotConfigured {
            provider: config.provider_name.clone(),
            hint: format!("{e}"),
        })?;

    info!("Using text-generation provider {}", name);
    Ok(Arc::new(ProviderTextGenerator::new(provider, name, config)))
}

/// Build `CompletionOptions` from the report config.
fn build_options(config: &ReportConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
