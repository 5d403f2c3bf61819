//! Configuration types for PDF parsing.
//!
//! All pipeline behaviour is controlled through [`ParseConfig`], built via
//! its [`ParseConfigBuilder`]. Nothing here is tied to one provider: the same
//! config drives the OpenAI, Anthropic and Gemini adapters.

use crate::error::ParseError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration for one or many parse requests.
///
/// Built via [`ParseConfig::builder()`] or using [`ParseConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdfparse::ParseConfig;
///
/// let config = ParseConfig::builder()
///     .dpi(200)
///     .page_concurrency(2)
///     .region_concurrency(16)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct ParseConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps the longest edge independently of DPI so a poster-sized page
    /// cannot exhaust memory; the other edge scales proportionally.
    pub max_rendered_pixels: u32,

    /// Size of the pool bounding concurrent layout calls. Default: 4.
    pub page_concurrency: usize,

    /// Size of the pool bounding concurrent describe calls across all pages. Default: 8.
    pub region_concurrency: usize,

    /// Attempts per provider call, first try included. Default: 3.
    pub max_attempts: u32,

    /// Initial retry delay in milliseconds; doubles after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Upper bound for a single backoff delay, `Retry-After` included. Default: 8000.
    pub max_backoff_ms: u64,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: u32,

    /// Per-HTTP-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Deadline for the whole request in seconds. Default: none.
    pub deadline_secs: Option<u64>,

    /// Pixels of context kept around a region when it is cropped. Default: 8.
    pub region_padding_px: u32,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Page separator used by [`crate::ParsedPdfResult::to_markdown`]. Default: None.
    pub page_separator: PageSeparator,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Provider endpoint override (OpenAI-compatible servers, proxies).
    ///
    /// What the URL must contain differs by vendor:
    ///
    /// | provider  | default                                     | appended                                 |
    /// |-----------|---------------------------------------------|------------------------------------------|
    /// | openai    | `https://api.openai.com/v1`                 | `chat/completions`                       |
    /// | anthropic | `https://api.anthropic.com`                 | `v1/messages`                            |
    /// | gemini    | `https://generativelanguage.googleapis.com` | `v1beta/models/{model}:generateContent`  |
    ///
    /// So an OpenAI override includes the version (`http://host:8000/v1`)
    /// while Anthropic and Gemini overrides stop at the host.
    pub base_url: Option<String>,

    /// Custom layout instruction. If None, the provider's built-in prompt is used.
    pub layout_prompt: Option<String>,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            page_concurrency: 4,
            region_concurrency: 8,
            max_attempts: 3,
            retry_backoff_ms: 500,
            max_backoff_ms: 8000,
            temperature: 0.0,
            max_tokens: 4096,
            api_timeout_secs: 60,
            deadline_secs: None,
            region_padding_px: 8,
            pages: PageSelection::default(),
            page_separator: PageSeparator::default(),
            password: None,
            base_url: None,
            layout_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ParseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("page_concurrency", &self.page_concurrency)
            .field("region_concurrency", &self.region_concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("deadline_secs", &self.deadline_secs)
            .field("pages", &self.pages)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ParseProgressCallback>"),
            )
            .finish()
    }
}

impl ParseConfig {
    /// Create a new builder for `ParseConfig`.
    pub fn builder() -> ParseConfigBuilder {
        ParseConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`ParseConfig`].
#[derive(Debug)]
pub struct ParseConfigBuilder {
    config: ParseConfig,
}

impl ParseConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.page_concurrency = n.max(1);
        self
    }

    pub fn region_concurrency(mut self, n: usize) -> Self {
        self.config.region_concurrency = n.max(1);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn deadline_secs(mut self, secs: u64) -> Self {
        self.config.deadline_secs = Some(secs);
        self
    }

    pub fn region_padding_px(mut self, px: u32) -> Self {
        self.config.region_padding_px = px;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    /// See [`ParseConfig::base_url`] for what each provider expects.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn layout_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.layout_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ParseConfig, ParseError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(ParseError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.page_concurrency == 0 || c.region_concurrency == 0 {
            return Err(ParseError::InvalidConfig(
                "Concurrency limits must be ≥ 1".into(),
            ));
        }
        if c.max_attempts == 0 {
            return Err(ParseError::InvalidConfig("max_attempts must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(ParseError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.deadline_secs == Some(0) {
            return Err(ParseError::InvalidConfig("deadline_secs must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of the PDF to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Parse all pages (default).
    #[default]
    All,
    /// Parse a single page (1-indexed).
    Single(usize),
    /// Parse a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Parse specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// How to separate pages in [`crate::ParsedPdfResult::to_markdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n". (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator string for the given page number (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
