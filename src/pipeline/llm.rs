//! Vision-model interaction: the [`VisionModel`] seam and its provider adapter.
//!
//! Every model-backed operation (transcription, compliance batches, the
//! difference and unified analyses) goes through [`VisionModel::complete`].
//! The orchestrators never talk to `edgequake-llm` directly, so tests can
//! script responses in memory and callers can plug in any backend.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^(attempt-1)`)
//! avoids thundering-herd: with 500 ms base and 2 retries the wait sequence
//! is 500 ms → 1 s. Retries stay inside one call, so a compliance batch is
//! still either fully answered or failed before the next batch starts.

use crate::config::AnalysisConfig;
use crate::error::LabelScanError;
use crate::pipeline::encode::ImagePart;
use crate::prompts::STRUCTURED_SYSTEM_PROMPT;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Default model when the gemini provider is named without a model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-lite";

/// Default model for every other named provider.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// One instruction plus zero or more inline images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub instruction: String,
    pub images: Vec<ImagePart>,
    /// Ask for a bare JSON payload instead of free text.
    pub structured: bool,
}

impl ModelRequest {
    /// A free-text request.
    pub fn text(instruction: impl Into<String>, images: Vec<ImagePart>) -> Self {
        Self {
            instruction: instruction.into(),
            images,
            structured: false,
        }
    }

    /// A structured (JSON) request.
    pub fn structured(instruction: impl Into<String>, images: Vec<ImagePart>) -> Self {
        Self {
            instruction: instruction.into(),
            images,
            structured: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResponse {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// An external service that answers an instruction about images.
///
/// Structured responses are best-effort: the text may still be wrapped in a
/// markdown fence or be invalid JSON. Callers parse and validate it via
/// [`crate::pipeline::structured`].
pub trait VisionModel: Send + Sync {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse, LabelScanError>>;
}

/// [`VisionModel`] backed by an `edgequake-llm` provider.
#[derive(Clone)]
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
}

impl std::fmt::Debug for LlmVisionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmVisionModel")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl LlmVisionModel {
    /// Wrap an already-resolved provider, taking sampling and retry knobs
    /// from `config`.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AnalysisConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
        }
    }

    /// Resolve the provider from `config` (see [`resolve_provider`]) and wrap it.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, LabelScanError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    fn build_messages(request: &ModelRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if request.structured {
            messages.push(ChatMessage::system(STRUCTURED_SYSTEM_PROMPT));
        }
        messages.push(ChatMessage::user_with_images(
            request.instruction.as_str(),
            request.images.iter().map(ImagePart::to_image_data).collect(),
        ));
        messages
    }

    async fn call(&self, request: ModelRequest) -> Result<ModelResponse, LabelScanError> {
        let start = Instant::now();
        let messages = Self::build_messages(&request);
        let options = build_options(self.temperature, self.max_tokens);
        let limit = Duration::from_secs(self.api_timeout_secs);

        let mut last_err: Option<LabelScanError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Model call: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let outcome = match timeout(limit, self.provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(LabelScanError::ExternalServiceError {
                    attempts: attempt + 1,
                    detail: e.to_string(),
                }),
                Err(_) => Err(LabelScanError::ApiTimeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                }),
            };

            match outcome {
                Ok(response) => {
                    debug!(
                        "Model call: {} images, {} input tokens, {} output tokens, {:?}",
                        request.images.len(),
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(ModelResponse {
                        text: response.content,
                        input_tokens: response.prompt_tokens as usize,
                        output_tokens: response.completion_tokens as usize,
                    });
                }
                Err(e) if e.is_retryable() => {
                    warn!("Model call: attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(match last_err {
            Some(LabelScanError::ExternalServiceError { detail, .. }) => {
                LabelScanError::ExternalServiceError {
                    attempts: self.max_retries + 1,
                    detail,
                }
            }
            Some(other) => other,
            None => LabelScanError::ExternalServiceError {
                attempts: self.max_retries + 1,
                detail: "Unknown error".to_string(),
            },
        })
    }
}

impl VisionModel for LlmVisionModel {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse, LabelScanError>> {
        Box::pin(self.call(request))
    }
}

/// Build `CompletionOptions` from the sampling knobs.
fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, LabelScanError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        LabelScanError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Default model for a named provider.
pub fn default_model_for(provider_name: &str) -> &'static str {
    if provider_name.eq_ignore_ascii_case("gemini") {
        DEFAULT_GEMINI_MODEL
    } else {
        DEFAULT_MODEL
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`). The model defaults
///    per [`default_model_for`]; the API key is read from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **`GEMINI_API_KEY`** present: gemini with the configured or default model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, LabelScanError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(default_model_for(name));
        info!("Using provider '{}' with model '{}'", name, model);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            info!("Using provider '{}' with model '{}' from environment", prov, model);
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
            info!("GEMINI_API_KEY found, using gemini with model '{}'", model);
            return create_vision_provider("gemini", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| LabelScanError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Wait before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}
