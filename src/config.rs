//! Configuration for the analyse → narrate → export pipeline.
//!
//! Every knob lives in [`ReportConfig`], built via its
//! [`ReportConfigBuilder`]. The config is cheap to clone and is shared by
//! the session and the top-level entry points; it holds no per-run state.

use crate::error::HtpError;
use crate::pipeline::llm::TextGenerator;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Lowest accepted detection-confidence threshold.
pub const MIN_CONFIDENCE_THRESHOLD: f32 = 0.10;
/// Highest accepted detection-confidence threshold.
pub const MAX_CONFIDENCE_THRESHOLD: f32 = 0.90;
/// Threshold used when none is chosen.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Default analysis service location.
pub const DEFAULT_ANALYSIS_URL: &str = "http://localhost:8000";
/// Default text-generation provider.
pub const DEFAULT_PROVIDER: &str = "gemini";
/// Default text-generation model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// Configuration for analysis, narrative generation and PDF export.
///
/// # Example
/// ```rust
/// use htp_report::ReportConfig;
///
/// let config = ReportConfig::builder()
///     .analysis_base_url("https://htp.example.org")
///     .confidence_threshold(0.4)
///     .model("gemini-2.5-flash-lite")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ReportConfig {
    /// Base URL of the analysis service; `/analyze` is appended.
    pub analysis_base_url: String,

    /// Detection-confidence threshold forwarded to the analysis service.
    /// Range: 0.10–0.90. Default: 0.25.
    pub confidence_threshold: f32,

    /// Timeout for the analysis request in seconds. Default: 120.
    pub analysis_timeout_secs: u64,

    /// Text-generation provider name (e.g. "gemini", "openai", "ollama").
    pub provider_name: String,

    /// Model identifier passed to the provider.
    pub model: String,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed text generator. Takes precedence over `provider`.
    pub generator: Option<Arc<dyn TextGenerator>>,

    /// Sampling temperature for narrative generation. Default: 0.4.
    pub temperature: f32,

    /// Maximum tokens per narrative reply. Default: 4096.
    pub max_tokens: usize,

    /// Per-call timeout for the text-generation API in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Width of the laid-out document in layout units (points). Default: 800.
    pub canvas_width: f32,

    /// Raster scale applied to `canvas_width`. Default: 2.0 (1600 px canvas).
    pub render_scale: f32,

    /// Margin on every side of each A4 page, in millimetres. Default: 10.
    pub page_margin_mm: f32,

    /// Receives per-step progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            analysis_base_url: DEFAULT_ANALYSIS_URL.to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            analysis_timeout_secs: 120,
            provider_name: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider: None,
            generator: None,
            temperature: 0.4,
            max_tokens: 4096,
            api_timeout_secs: 60,
            canvas_width: 800.0,
            render_scale: 2.0,
            page_margin_mm: 10.0,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ReportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportConfig")
            .field("analysis_base_url", &self.analysis_base_url)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("analysis_timeout_secs", &self.analysis_timeout_secs)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("generator", &self.generator.as_ref().map(|g| g.name().to_string()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("canvas_width", &self.canvas_width)
            .field("render_scale", &self.render_scale)
            .field("page_margin_mm", &self.page_margin_mm)
            .finish()
    }
}

impl ReportConfig {
    /// Create a new builder for `ReportConfig`.
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder {
            config: Self::default(),
        }
    }

    /// Canvas width in pixels after scaling.
    pub fn canvas_pixel_width(&self) -> u32 {
        (self.canvas_width * self.render_scale).round().max(1.0) as u32
    }
}

/// Check a threshold against the accepted range without clamping.
pub fn validate_threshold(value: f32) -> Result<f32, HtpError> {
    if value.is_finite() && (MIN_CONFIDENCE_THRESHOLD..=MAX_CONFIDENCE_THRESHOLD).contains(&value) {
        Ok(value)
    } else {
        Err(HtpError::ThresholdOutOfRange {
            value,
            min: MIN_CONFIDENCE_THRESHOLD,
            max: MAX_CONFIDENCE_THRESHOLD,
        })
    }
}

/// Builder for [`ReportConfig`].
#[derive(Debug)]
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl ReportConfigBuilder {
    pub fn analysis_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.analysis_base_url = url.into();
        self
    }

    pub fn confidence_threshold(mut self, t: f32) -> Self {
        self.config.confidence_threshold = t.clamp(MIN_CONFIDENCE_THRESHOLD, MAX_CONFIDENCE_THRESHOLD);
        self
    }

    pub fn analysis_timeout_secs(mut self, secs: u64) -> Self {
        self.config.analysis_timeout_secs = secs;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.config.generator = Some(generator);
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

    pub fn canvas_width(mut self, width: f32) -> Self {
        self.config.canvas_width = width;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(0.5, 4.0);
        self
    }

    pub fn page_margin_mm(mut self, mm: f32) -> Self {
        self.config.page_margin_mm = mm;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReportConfig, HtpError> {
        let c = &self.config;
        validate_threshold(c.confidence_threshold)?;
        if !(c.analysis_base_url.starts_with("http://") || c.analysis_base_url.starts_with("https://")) {
            return Err(HtpError::InvalidConfig(format!(
                "analysis base URL must be http(s), got '{}'",
                c.analysis_base_url
            )));
        }
        if c.canvas_width < 200.0 {
            return Err(HtpError::InvalidConfig(format!(
                "canvas width must be ≥ 200, got {}",
                c.canvas_width
            )));
        }
        if !(0.0..50.0).contains(&c.page_margin_mm) {
            return Err(HtpError::InvalidConfig(format!(
                "page margin must be 0–50 mm, got {}",
                c.page_margin_mm
            )));
        }
        if c.provider_name.trim().is_empty() {
            return Err(HtpError::InvalidConfig("provider name is empty".into()));
        }
        Ok(self.config)
    }
}
