//! Configuration for rasterisation, diffing and model-backed analysis.
//!
//! Every knob lives in [`AnalysisConfig`], built through
//! [`AnalysisConfigBuilder`]. The pure stages read only the rasterisation and
//! diff fields; the model-backed stages additionally read the provider,
//! sampling and retry fields.

use crate::error::LabelScanError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Magnification applied to the first page of a paginated document.
pub const DEFAULT_PDF_SCALE: f32 = 6.0;

/// Luminance difference (out of 255) above which a pixel is flagged.
pub const DEFAULT_DIFF_THRESHOLD: u8 = 50;

/// Maximum number of requirements sent to the model in one request.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Phrase whose presence in a unified-comparison summary means "no differences".
pub const DEFAULT_EQUALITY_PHRASE: &str = "as imagens são iguais";

/// Configuration for a labelscan session.
///
/// Built via [`AnalysisConfig::builder()`] or [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use labelscan::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .pdf_scale(4.0)
///     .batch_size(5)
///     .model("gemini-2.5-flash-lite")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Magnification for the first page of a PDF. Range: 1.0–10.0. Default: 6.0.
    ///
    /// Label fine print (ingredient lists, lot codes) is often set in 4–6 pt
    /// type. At 6× a 5 pt glyph is roughly 40 px tall, which both the OCR
    /// model and the luminance diff resolve cleanly.
    pub pdf_scale: f32,

    /// Maximum rendered dimension (width or height) in pixels. Default: 8192.
    ///
    /// Caps oversized pages (posters, pallet labels) so a 6× render cannot
    /// exhaust memory. The other dimension scales proportionally.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Luminance difference threshold out of 255. Default: 50.
    ///
    /// A pixel is flagged when `|L1 - L2| > diff_threshold`.
    pub diff_threshold: u8,

    /// Requirements per compliance batch. Default: 5.
    pub batch_size: usize,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Transcription and compliance verdicts should be reproducible.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Retry attempts per model call on transient failure. Default: 2.
    ///
    /// Zero reproduces the fail-fast behaviour where any network error aborts
    /// the whole scan. Retries happen inside one batch and never reorder
    /// batches.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Custom OCR instruction. If None, uses [`crate::prompts::OCR_PROMPT`].
    pub ocr_prompt: Option<String>,

    /// Phrase that marks a unified-comparison summary as "equal".
    ///
    /// Matched case-insensitively as a substring. This is a heuristic: a
    /// model that paraphrases the verdict will be read as "different".
    pub equality_phrase: String,

    /// Optional receiver for compliance-scan progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pdf_scale: DEFAULT_PDF_SCALE,
            max_rendered_pixels: 8192,
            password: None,
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            ocr_prompt: None,
            equality_phrase: DEFAULT_EQUALITY_PHRASE.to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("pdf_scale", &self.pdf_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("diff_threshold", &self.diff_threshold)
            .field("batch_size", &self.batch_size)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("equality_phrase", &self.equality_phrase)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ScanProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn pdf_scale(mut self, scale: f32) -> Self {
        self.config.pdf_scale = scale.clamp(1.0, 10.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn diff_threshold(mut self, threshold: u8) -> Self {
        self.config.diff_threshold = threshold;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

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

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
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

    pub fn ocr_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.ocr_prompt = Some(prompt.into());
        self
    }

    pub fn equality_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.config.equality_phrase = phrase.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, LabelScanError> {
        let c = &self.config;
        if c.batch_size == 0 {
            return Err(LabelScanError::InvalidConfig(
                "Batch size must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(LabelScanError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.equality_phrase.trim().is_empty() {
            return Err(LabelScanError::InvalidConfig(
                "Equality phrase must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
