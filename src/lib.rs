//! # edgequake-pdfparse
//!
//! Parse PDF documents into structured, ordered regions using vision models.
//!
//! ## Why this crate?
//!
//! Text extractors lose the structure of complex pages: tables flatten into
//! runs of words, figures vanish, multi-column text interleaves. Instead this
//! crate rasterises each page, asks a vision model where the text blocks,
//! tables, figures and headings are, then asks a (possibly different) model
//! to transcribe or describe each region. The result keeps every region with
//! its page, position, type and the model that produced it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Render    rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 2. Layout    one call per page → typed bounding boxes   (page pool)
//!  ├─ 3. Describe  one call per region on its crop            (region pool)
//!  │               every call retried with exponential backoff
//!  └─ 4. Assemble  pages in order, regions top-to-bottom, failures marked
//! ```
//!
//! One failed region or page never aborts the document: it is kept in the
//! result with its [`CallFailure`] attached.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfparse::{parse_bytes, Credential, PageSeparator, ParseConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("document.pdf")?;
//!     let key = Credential::new(std::env::var("ANTHROPIC_API_KEY")?);
//!     let config = ParseConfig::builder().region_concurrency(16).build()?;
//!     let result = parse_bytes(
//!         &bytes,
//!         "claude-sonnet-4-5",
//!         "claude-haiku-4-5",
//!         "anthropic",
//!         &key,
//!         &config,
//!     )
//!     .await?;
//!     println!("{}", result.to_markdown(&PageSeparator::HorizontalRule));
//!     eprintln!(
//!         "{} regions, {} failed",
//!         result.stats.total_regions, result.stats.failed_regions
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfparse` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfparse = { version = "0.1", default-features = false }
//! ```
//!
//! ## Providers
//!
//! | Name | API | Key variable (CLI) |
//! |------|-----|--------------------|
//! | `openai`    | Chat Completions (also OpenAI-compatible servers via `base_url`) | `OPENAI_API_KEY` |
//! | `anthropic` | Messages | `ANTHROPIC_API_KEY` |
//! | `gemini`    | `generateContent` | `GEMINI_API_KEY` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod region;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PageSelection, PageSeparator, ParseConfig, ParseConfigBuilder};
pub use error::{CallError, CallFailure, ParseError};
pub use output::{ParseStats, ParsedPage, ParsedPdfResult, RegionEntry, RegionOutcome};
pub use parse::{parse_bytes, parse_input, parse_sync, PdfParser};
pub use pipeline::encode::EncodedImage;
pub use pipeline::render::{PageRenderer, PdfiumRenderer, RenderOptions};
pub use pipeline::retry::RetryPolicy;
pub use progress::{NoopProgressCallback, ParseProgressCallback, ProgressCallback};
pub use providers::{
    ContentDescriber, Credential, LayoutDescriber, ProviderKind, ProviderPair, RegionRequest,
    Reply, TokenUsage,
};
pub use region::{BoundingBox, DetectedRegion, Region, RegionContent, RegionType};
