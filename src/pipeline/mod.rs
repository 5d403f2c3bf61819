//! Pipeline stages for PDF parsing.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the orchestrator in [`crate::parse`] stays a
//! short sequence of calls.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ extract ────────────────────▶ assemble
//! (bytes)   (pdfium)   (layout + describe, retried)   (reading order)
//! ```
//!
//! 1. [`input`]  — read a local path or download a URL into bytes
//! 2. [`render`] — rasterise selected pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe. [`encode`] turns rasters and crops into
//!    base64 PNG for the request bodies
//! 3. [`extract`] — one layout call per page, one describe call per region,
//!    in two bounded pools; every call goes through [`retry`]
//! 4. [`postprocess`] — deterministic cleanup of describe replies
//! 5. [`assemble`] — order pages and regions, attach failure markers, count

pub mod assemble;
pub mod encode;
pub mod extract;
pub mod input;
pub mod postprocess;
pub mod render;
pub mod retry;
