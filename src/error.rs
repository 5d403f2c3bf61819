//! Error types for the edgequake-pdfparse library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ParseError`] — **Fatal**: the request cannot proceed at all (bad
//!   bytes, unsupported provider, unreadable input). Returned as
//!   `Err(ParseError)` from the top-level `parse*` functions.
//!
//! * [`CallError`] — **Per call**: one layout or describe call failed. After
//!   the retry budget is spent it is wrapped in a [`CallFailure`] and stored
//!   inside the result next to the page or region it belongs to, so one bad
//!   region never costs the caller the rest of the document.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfparse library.
///
/// Per-page and per-region failures use [`CallFailure`] and are stored in
/// [`crate::output::ParsedPdfResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ParseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Document errors ───────────────────────────────────────────────────
    /// The bytes cannot be parsed as a PDF.
    #[error("Document is not a valid PDF: {detail}")]
    CorruptDocument { detail: String },

    /// The PDF parsed but produced no pages to work on.
    #[error("Document contains no pages")]
    EmptyDocument,

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for encrypted PDF")]
    WrongPassword,

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Caller errors ─────────────────────────────────────────────────────
    /// Provider name outside the supported set.
    #[error("Unsupported provider '{provider}'. Supported providers are: openai, anthropic, gemini")]
    UnsupportedProvider { provider: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The whole request ran past `deadline_secs`.
    #[error("Parsing did not finish within {secs}s")]
    DeadlineExceeded { secs: u64 },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParseError {
    /// Whether the caller caused this error (bad provider, bad input, bad
    /// document) as opposed to an environment or server-side failure.
    ///
    /// HTTP shells map `true` to a 4xx status and `false` to a 5xx status.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ParseError::FileNotFound { .. }
                | ParseError::InvalidInput { .. }
                | ParseError::CorruptDocument { .. }
                | ParseError::EmptyDocument
                | ParseError::PasswordRequired
                | ParseError::WrongPassword
                | ParseError::UnsupportedProvider { .. }
                | ParseError::InvalidConfig(_)
        )
    }
}

/// A failed provider call (layout or describe).
///
/// Serialisable because, once retries are exhausted, it becomes part of the
/// result returned to the caller.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallError {
    /// The provider answered with a non-success HTTP status.
    #[error("provider returned HTTP {status}: {message}")]
    Provider {
        status: u16,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },

    /// The reply arrived but could not be read into the expected schema.
    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String },

    /// HTTP 429 persisted through every attempt.
    #[error("rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded {
        attempts: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },

    /// Connection-level failure (DNS, TLS, reset).
    #[error("transport error: {detail}")]
    Transport { detail: String },

    /// The HTTP call exceeded `api_timeout_secs`.
    #[error("call timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl CallError {
    /// Default retryability predicate used by the extractor.
    ///
    /// Retryable: 408, 429, every 5xx (Anthropic's 529 included), transport
    /// failures, timeouts and malformed replies. Other 4xx are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallError::Provider { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            CallError::MalformedResponse { .. }
            | CallError::Transport { .. }
            | CallError::Timeout { .. } => true,
            CallError::RateLimitExceeded { .. } => false,
        }
    }

    /// True for an HTTP 429 answer.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CallError::Provider { status: 429, .. })
    }

    /// Server-suggested delay before the next attempt, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            CallError::Provider {
                retry_after_secs, ..
            }
            | CallError::RateLimitExceeded {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        CallError::MalformedResponse {
            detail: detail.into(),
        }
    }
}

/// The error marker stored in the result for a page or region whose call
/// failed terminally.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{error} (model '{model}', {attempts} attempt(s))")]
pub struct CallFailure {
    /// The last error observed.
    pub error: CallError,
    /// How many attempts were made before giving up.
    pub attempts: u32,
    /// The model the call was addressed to.
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(status: u16) -> CallError {
        CallError::Provider {
            status,
            message: "boom".into(),
            retry_after_secs: None,
        }
    }

    #[test]
    fn retryable_statuses() {
        assert!(provider(429).is_retryable());
        assert!(provider(500).is_retryable());
        assert!(provider(503).is_retryable());
        assert!(provider(529).is_retryable());
        assert!(provider(408).is_retryable());
        assert!(!provider(400).is_retryable());
        assert!(!provider(401).is_retryable());
        assert!(!provider(404).is_retryable());
    }

    #[test]
    fn malformed_and_transport_are_retryable() {
        assert!(CallError::malformed("bad json").is_retryable());
        assert!(CallError::Transport {
            detail: "reset".into()
        }
        .is_retryable());
        assert!(CallError::Timeout { secs: 60 }.is_retryable());
    }

    #[test]
    fn rate_limit_exceeded_is_terminal() {
        let e = CallError::RateLimitExceeded {
            attempts: 3,
            retry_after_secs: Some(10),
        };
        assert!(!e.is_retryable());
        assert_eq!(e.retry_after_secs(), Some(10));
        assert!(e.to_string().contains("3 attempts"));
    }

    #[test]
    fn call_error_serialises_with_kind_tag() {
        let json = serde_json::to_value(provider(503)).unwrap();
        assert_eq!(json["kind"], "provider");
        assert_eq!(json["status"], 503);
        assert!(json.get("retry_after_secs").is_none());
    }

    #[test]
    fn client_error_classification() {
        assert!(ParseError::UnsupportedProvider {
            provider: "mistral".into()
        }
        .is_client_error());
        assert!(ParseError::CorruptDocument {
            detail: "x".into()
        }
        .is_client_error());
        assert!(ParseError::EmptyDocument.is_client_error());
        assert!(!ParseError::Internal("x".into()).is_client_error());
        assert!(!ParseError::DeadlineExceeded { secs: 5 }.is_client_error());
    }

    #[test]
    fn unsupported_provider_display_lists_supported_set() {
        let e = ParseError::UnsupportedProvider {
            provider: "mistral".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("mistral"));
        assert!(msg.contains("openai, anthropic, gemini"));
    }

    #[test]
    fn call_failure_display() {
        let f = CallFailure {
            error: provider(400),
            attempts: 1,
            model: "gpt-4o".into(),
        };
        let msg = f.to_string();
        assert!(msg.contains("HTTP 400"), "got: {msg}");
        assert!(msg.contains("gpt-4o"));
    }
}
