//! Parsing entry points: render → extract → assemble.
//!
//! ## Why a `PdfParser` as well as free functions?
//!
//! [`parse_bytes`] is the one-shot API that matches an HTTP shell's contract:
//! bytes, two model names, a provider name and a key. [`PdfParser`] is the
//! same pipeline with its parts exposed, so callers (and tests) can supply
//! their own renderer or provider pair and reuse one parser for many
//! documents. Neither keeps state between requests: every call builds fresh
//! pools and drops every page image before returning.

use crate::config::ParseConfig;
use crate::error::ParseError;
use crate::output::ParsedPdfResult;
use crate::pipeline::assemble::assemble;
use crate::pipeline::extract::{ExtractRequest, RegionExtractor};
use crate::pipeline::input::read_input;
use crate::pipeline::render::{render_pages, PageRenderer, PdfiumRenderer, RenderOptions};
use crate::pipeline::retry::RetryPolicy;
use crate::providers::{adapters_for, Credential, ProviderKind, ProviderPair};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A configured parsing pipeline for one provider.
#[derive(Clone)]
pub struct PdfParser {
    provider: ProviderKind,
    providers: ProviderPair,
    renderer: Arc<dyn PageRenderer>,
    retry_policy: Option<RetryPolicy>,
    config: ParseConfig,
}

impl PdfParser {
    /// Build a parser for a provider named `openai`, `anthropic` or `gemini`.
    ///
    /// Fails with [`ParseError::UnsupportedProvider`] for any other name;
    /// nothing touches the network here.
    pub fn for_provider(provider: &str, config: &ParseConfig) -> Result<Self, ParseError> {
        let kind: ProviderKind = provider.parse()?;
        let providers = adapters_for(kind, config)?;
        Ok(Self::new(kind, providers, config.clone()))
    }

    /// Build a parser from an explicit capability pair.
    pub fn new(provider: ProviderKind, providers: ProviderPair, config: ParseConfig) -> Self {
        Self {
            provider,
            providers,
            renderer: Arc::new(PdfiumRenderer),
            retry_policy: None,
            config,
        }
    }

    /// Replace the pdfium renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the retry policy derived from the config, e.g. to change
    /// which errors count as retryable.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn config(&self) -> &ParseConfig {
        &self.config
    }

    /// Parse one PDF.
    ///
    /// Returns `Err` only for fatal errors (corrupt or empty document,
    /// missing password, deadline). Failed layout and describe calls are
    /// recorded inside the result instead.
    ///
    /// Dropping the returned future cancels every in-flight provider call.
    pub async fn parse(
        &self,
        pdf_bytes: &[u8],
        layout_model: &str,
        description_model: &str,
        credential: &Credential,
    ) -> Result<ParsedPdfResult, ParseError> {
        let run = self.run(pdf_bytes, layout_model, description_model, credential);
        match self.config.deadline_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), run)
                .await
                .map_err(|_| ParseError::DeadlineExceeded { secs })?,
            None => run.await,
        }
    }

    async fn run(
        &self,
        pdf_bytes: &[u8],
        layout_model: &str,
        description_model: &str,
        credential: &Credential,
    ) -> Result<ParsedPdfResult, ParseError> {
        let total_start = Instant::now();
        info!(
            "Parsing {} bytes with {} (layout '{}', describe '{}')",
            pdf_bytes.len(),
            self.provider,
            layout_model,
            description_model
        );

        // ── Step 1: Render ───────────────────────────────────────────────
        let render_start = Instant::now();
        let pages = render_pages(
            Arc::clone(&self.renderer),
            Arc::from(pdf_bytes),
            RenderOptions::from(&self.config),
        )
        .await?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;
        info!("Rendered {} pages in {}ms", pages.len(), render_duration_ms);

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_parse_start(pages.len());
        }

        // ── Step 2: Extract ──────────────────────────────────────────────
        let extract_start = Instant::now();
        let mut extractor = RegionExtractor::new(self.providers.clone(), &self.config);
        if let Some(policy) = self.retry_policy {
            extractor = extractor.with_retry_policy(policy);
        }
        let request = ExtractRequest {
            layout_model,
            description_model,
            credential,
        };
        let extractions = extractor.extract(&pages, request).await;
        let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
        drop(pages);

        // ── Step 3: Assemble ─────────────────────────────────────────────
        let (pages, mut stats) = assemble(extractions);
        stats.render_duration_ms = render_duration_ms;
        stats.extract_duration_ms = extract_duration_ms;
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        info!(
            "Parse complete: {}/{} pages, {}/{} regions, {} calls, {}ms",
            stats.parsed_pages,
            stats.total_pages,
            stats.described_regions,
            stats.total_regions,
            stats.api_calls,
            stats.total_duration_ms
        );
        debug!(
            "Tokens: {} in / {} out",
            stats.total_input_tokens, stats.total_output_tokens
        );

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_parse_complete(stats.total_regions, stats.failed_regions);
        }

        Ok(ParsedPdfResult {
            provider: self.provider,
            layout_model: layout_model.to_string(),
            description_model: description_model.to_string(),
            pages,
            stats,
        })
    }
}

/// Parse PDF bytes with the named provider.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `pdf_bytes` — Raw PDF bytes
/// * `layout_model` — Model that finds regions on each page
/// * `description_model` — Model that transcribes or describes each region
/// * `provider` — `openai`, `anthropic` or `gemini`
/// * `credential` — API key for that provider, used for this call only
/// * `config` — Parsing configuration
///
/// # Errors
/// [`ParseError::UnsupportedProvider`] before any rendering or network
/// call; document errors such as [`ParseError::CorruptDocument`] and
/// [`ParseError::EmptyDocument`] abort the request. Provider failures do
/// not: they are recorded per page or region in the result.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfparse::{parse_bytes, Credential, ParseConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("document.pdf")?;
/// let key = Credential::new(std::env::var("OPENAI_API_KEY")?);
/// let result = parse_bytes(&bytes, "gpt-4.1", "gpt-4.1-mini", "openai", &key, &ParseConfig::default()).await?;
/// for page in &result.pages {
///     println!("page {}: {} regions", page.page_index + 1, page.regions.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn parse_bytes(
    pdf_bytes: &[u8],
    layout_model: &str,
    description_model: &str,
    provider: &str,
    credential: &Credential,
    config: &ParseConfig,
) -> Result<ParsedPdfResult, ParseError> {
    PdfParser::for_provider(provider, config)?
        .parse(pdf_bytes, layout_model, description_model, credential)
        .await
}

/// Parse a PDF given as a local path or an HTTP(S) URL.
///
/// The provider name is checked before the input is read. Downloads use
/// `api_timeout_secs` as their timeout.
pub async fn parse_input(
    input: &str,
    layout_model: &str,
    description_model: &str,
    provider: &str,
    credential: &Credential,
    config: &ParseConfig,
) -> Result<ParsedPdfResult, ParseError> {
    let parser = PdfParser::for_provider(provider, config)?;
    let bytes = read_input(input, config.api_timeout_secs).await?;
    parser
        .parse(&bytes, layout_model, description_model, credential)
        .await
}

/// Synchronous wrapper around [`parse_bytes`].
///
/// Creates a temporary tokio runtime internally; do not call from inside an
/// async context.
pub fn parse_sync(
    pdf_bytes: &[u8],
    layout_model: &str,
    description_model: &str,
    provider: &str,
    credential: &Credential,
    config: &ParseConfig,
) -> Result<ParsedPdfResult, ParseError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ParseError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(parse_bytes(
            pdf_bytes,
            layout_model,
            description_model,
            provider,
            credential,
            config,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsupported_provider_fails_before_rendering() {
        // Not a PDF: a render attempt would report CorruptDocument instead.
        let err = parse_bytes(
            b"not a pdf",
            "m",
            "m",
            "mistral",
            &Credential::new("k"),
            &ParseConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedProvider { ref provider } if provider == "mistral"));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn unsupported_provider_fails_before_reading_input() {
        let err = parse_input(
            "/definitely/not/a/real/file.pdf",
            "m",
            "m",
            "azure",
            &Credential::new("k"),
            &ParseConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedProvider { .. }));
    }

    #[tokio::test]
    async fn corrupt_bytes_are_fatal() {
        let err = parse_bytes(
            b"PK\x03\x04 not a pdf",
            "m",
            "m",
            "openai",
            &Credential::new("k"),
            &ParseConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ParseError::CorruptDocument { .. }));
    }

    #[test]
    fn sync_wrapper_reports_errors() {
        let err = parse_sync(
            b"",
            "m",
            "m",
            "gemini",
            &Credential::new("k"),
            &ParseConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::CorruptDocument { .. }));
    }
}
