//! CLI binary for edgequake-pdfparse.
//!
//! A thin shim over the library crate that maps CLI flags to `ParseConfig`
//! and prints the structured result as JSON or Markdown.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfparse::{
    parse_input, Credential, PageSelection, PageSeparator, ParseConfig, ParseProgressCallback,
    ParsedPdfResult, ProgressCallback, ProviderKind,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar counting layout calls and describe calls.
///
/// The bar starts at one step per page and grows by each page's region count
/// as its layout call returns, so the total is only known once every page
/// has been analysed.
struct CliProgressCallback {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }

    fn report_failure(&self, what: String, error: &str) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        let msg = match error.char_indices().nth(100) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), what, red(&msg)));
    }
}

impl ParseProgressCallback for CliProgressCallback {
    fn on_parse_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} calls  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Parsing");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing layout of {total_pages} pages…"))
        ));
    }

    fn on_layout_complete(&self, page_index: usize, region_count: usize) {
        self.bar.inc_length(region_count as u64);
        self.bar.inc(1);
        self.bar.println(format!(
            "  {} Page {:>3}  {}",
            green("✓"),
            page_index + 1,
            dim(&format!("{region_count} regions")),
        ));
    }

    fn on_layout_error(&self, page_index: usize, error: &str) {
        self.bar.inc(1);
        self.report_failure(format!("Page {:>3} layout", page_index + 1), error);
    }

    fn on_region_complete(&self, _page_index: usize, _detection_index: usize) {
        self.bar.inc(1);
    }

    fn on_region_error(&self, page_index: usize, detection_index: usize, error: &str) {
        self.bar.inc(1);
        self.report_failure(
            format!("Page {:>3} region {}", page_index + 1, detection_index),
            error,
        );
    }

    fn on_parse_complete(&self, total_regions: usize, failed_regions: usize) {
        self.bar.finish_and_clear();
        let failures = self.failures.load(Ordering::SeqCst);
        if failures == 0 {
            eprintln!(
                "{} {} regions parsed successfully",
                green("✔"),
                bold(&total_regions.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} regions parsed  ({} failed calls)",
                cyan("⚠"),
                bold(&(total_regions - failed_regions).to_string()),
                total_regions,
                red(&failures.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Structured JSON on stdout
  pdfparse document.pdf --provider openai --layout-model gpt-4.1 --description-model gpt-4.1-mini

  # Markdown to a file
  pdfparse paper.pdf --provider anthropic \
      --layout-model claude-sonnet-4-5 --description-model claude-haiku-4-5 \
      --format markdown -o paper.md

  # Selected pages, from a URL, with Gemini
  pdfparse https://arxiv.org/pdf/1706.03762 --provider gemini \
      --layout-model gemini-2.5-flash --description-model gemini-2.5-flash --pages 1-3

  # OpenAI-compatible local server
  pdfparse scan.pdf --provider openai --base-url http://localhost:8000/v1 \
      --layout-model qwen2.5-vl --description-model qwen2.5-vl --api-key none

ENVIRONMENT VARIABLES:
  PDFPARSE_API_KEY        API key for the selected provider
  OPENAI_API_KEY          Fallback key when --provider openai
  ANTHROPIC_API_KEY       Fallback key when --provider anthropic
  GEMINI_API_KEY          Fallback key when --provider gemini
  PDFIUM_LIB_PATH         Path to libpdfium (otherwise ./ then the system library)
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Parse PDF files and URLs into structured regions using vision models.
#[derive(Parser, Debug)]
#[command(
    name = "pdfparse",
    version,
    about = "Parse PDF files and URLs into structured regions using vision models",
    long_about = "Render each PDF page, detect its layout regions (text, tables, figures, \
headings) with a vision model, then transcribe or describe every region. Supports OpenAI \
(and OpenAI-compatible servers), Anthropic and Google Gemini.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Provider: openai, anthropic or gemini.
    #[arg(long, env = "PDFPARSE_PROVIDER")]
    provider: String,

    /// Model that detects layout regions on each page.
    #[arg(long, env = "PDFPARSE_LAYOUT_MODEL")]
    layout_model: String,

    /// Model that transcribes or describes each region.
    #[arg(long, env = "PDFPARSE_DESCRIPTION_MODEL")]
    description_model: String,

    /// API key. Falls back to the provider's own variable.
    #[arg(long, env = "PDFPARSE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "PDFPARSE_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format.
    #[arg(long, env = "PDFPARSE_FORMAT", value_enum, default_value = "json")]
    format: OutputFormat,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDFPARSE_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Cap on the longest rendered edge, in pixels.
    #[arg(long, env = "PDFPARSE_MAX_PIXELS", default_value_t = 2000)]
    max_rendered_pixels: u32,

    /// Concurrent layout calls (one per page).
    #[arg(long, env = "PDFPARSE_PAGE_CONCURRENCY", default_value_t = 4)]
    page_concurrency: usize,

    /// Concurrent describe calls (one per region, across all pages).
    #[arg(long, env = "PDFPARSE_REGION_CONCURRENCY", default_value_t = 8)]
    region_concurrency: usize,

    /// Attempts per provider call, first try included.
    #[arg(long, env = "PDFPARSE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// First retry delay in milliseconds; doubles per attempt.
    #[arg(long, env = "PDFPARSE_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Longest single retry delay in milliseconds.
    #[arg(long, env = "PDFPARSE_MAX_BACKOFF_MS", default_value_t = 8000)]
    max_backoff_ms: u64,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PDFPARSE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max output tokens per call.
    #[arg(long, env = "PDFPARSE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: u32,

    /// Per-call HTTP timeout in seconds (also used for downloads).
    #[arg(long, env = "PDFPARSE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Give up on the whole document after this many seconds.
    #[arg(long, env = "PDFPARSE_DEADLINE")]
    deadline: Option<u64>,

    /// Pixels of context kept around each region crop.
    #[arg(long, env = "PDFPARSE_REGION_PADDING", default_value_t = 8)]
    region_padding: u32,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDFPARSE_PAGES", default_value = "all")]
    pages: String,

    /// Page separator for Markdown output: none, hr, comment, or custom string.
    #[arg(long, env = "PDFPARSE_SEPARATOR", default_value = "none")]
    separator: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFPARSE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Override the provider endpoint (proxies, OpenAI-compatible servers).
    ///
    /// For openai include the version, e.g. http://localhost:8000/v1.
    /// For anthropic and gemini give the bare host; their version path
    /// (v1/messages, v1beta/models/...) is appended.
    #[arg(long, env = "PDFPARSE_BASE_URL")]
    base_url: Option<String>,

    /// Path to a text file containing a custom layout prompt.
    #[arg(long, env = "PDFPARSE_LAYOUT_PROMPT")]
    layout_prompt: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "PDFPARSE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFPARSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFPARSE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v brings them back.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Resolve provider and key ─────────────────────────────────────────
    let provider: ProviderKind = cli.provider.parse()?;
    let credential = resolve_credential(cli.api_key.as_deref(), provider)?;

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ParseProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run ──────────────────────────────────────────────────────────────
    let result = parse_input(
        &cli.input,
        &cli.layout_model,
        &cli.description_model,
        provider.as_str(),
        &credential,
        &config,
    )
    .await
    .context("Parsing failed")?;

    let rendered = render_output(&result, cli.format, &config.page_separator)?;

    if let Some(ref output_path) = cli.output {
        write_atomic(output_path, &rendered).await?;
        if !cli.quiet {
            eprintln!(
                "{}  {}/{} pages  {}/{} regions  {}ms  →  {}",
                if result.is_complete() {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                result.stats.parsed_pages,
                result.stats.total_pages,
                result.stats.described_regions,
                result.stats.total_regions,
                result.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
        if !rendered.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {} calls",
            dim(&result.stats.total_input_tokens.to_string()),
            dim(&result.stats.total_output_tokens.to_string()),
            result.stats.api_calls,
        );
    }

    Ok(())
}

/// `--api-key` / `PDFPARSE_API_KEY`, else the provider's own variable.
fn resolve_credential(flag: Option<&str>, provider: ProviderKind) -> Result<Credential> {
    let key = match flag {
        Some(k) if !k.trim().is_empty() => k.to_string(),
        _ => std::env::var(provider.api_key_env()).with_context(|| {
            format!(
                "No API key: pass --api-key or set PDFPARSE_API_KEY or {}",
                provider.api_key_env()
            )
        })?,
    };
    let credential = Credential::new(key);
    if credential.is_empty() {
        anyhow::bail!("API key for {} is empty", provider);
    }
    Ok(credential)
}

/// Map CLI args to `ParseConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ParseConfig> {
    let mut builder = ParseConfig::builder()
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_rendered_pixels)
        .page_concurrency(cli.page_concurrency)
        .region_concurrency(cli.region_concurrency)
        .max_attempts(cli.max_attempts)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .max_backoff_ms(cli.max_backoff_ms)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .region_padding_px(cli.region_padding)
        .pages(parse_pages(&cli.pages)?)
        .page_separator(parse_separator(&cli.separator));

    if let Some(secs) = cli.deadline {
        builder = builder.deadline_secs(secs);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.clone());
    }
    if let Some(ref path) = cli.layout_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read layout prompt from {:?}", path))?;
        builder = builder.layout_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn render_output(
    result: &ParsedPdfResult,
    format: OutputFormat,
    separator: &PageSeparator,
) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(result).context("Failed to serialise output")
        }
        OutputFormat::Markdown => Ok(result.to_markdown(separator)),
    }
}

/// Write to a temp file next to `path`, then rename, so readers never see a
/// partial file.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    tokio::fs::write(&tmp_path, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to move output into {}", path.display()))?;
    Ok(())
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_flag() {
        assert_eq!(parse_pages("all").unwrap(), PageSelection::All);
        assert_eq!(parse_pages("5").unwrap(), PageSelection::Single(5));
        assert_eq!(parse_pages("3-15").unwrap(), PageSelection::Range(3, 15));
        assert_eq!(
            parse_pages("1, 3,5").unwrap(),
            PageSelection::Set(vec![1, 3, 5])
        );
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("9-2").is_err());
        assert!(parse_pages("x").is_err());
    }

    #[test]
    fn separator_flag_keeps_custom_case() {
        assert_eq!(parse_separator("HR"), PageSeparator::HorizontalRule);
        assert_eq!(
            parse_separator("<Page Break>"),
            PageSeparator::Custom("<Page Break>".into())
        );
    }

    #[test]
    fn cli_requires_models_and_provider() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
        let parsed = Cli::try_parse_from([
            "pdfparse",
            "doc.pdf",
            "--provider",
            "gemini",
            "--layout-model",
            "gemini-2.5-flash",
            "--description-model",
            "gemini-2.5-flash",
            "--format",
            "markdown",
        ])
        .unwrap();
        assert_eq!(parsed.format, OutputFormat::Markdown);
        assert_eq!(parsed.page_concurrency, 4);
    }
}
