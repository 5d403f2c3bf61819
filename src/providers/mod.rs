//! Provider adapters: one uniform capability pair over three vendor APIs.
//!
//! ```text
//!                 ┌──────────────────┐   ┌───────────────────┐
//!  extractor ───▶ │ LayoutDescriber  │   │ ContentDescriber  │
//!                 └────────┬─────────┘   └─────────┬─────────┘
//!                          │  implemented by each  │
//!            ┌─────────────┼───────────────┬───────┘
//!      OpenAiAdapter  AnthropicAdapter  GeminiAdapter
//!            └─────────────┴───────────────┘
//!                     http::HttpTransport
//! ```
//!
//! Adapters translate requests and replies only. They never retry: retry
//! policy lives in [`crate::pipeline::retry`] so it is identical for every
//! vendor.

pub mod anthropic;
pub mod gemini;
pub mod http;
pub mod layout;
pub mod openai;

use crate::config::ParseConfig;
use crate::error::{CallError, ParseError};
use crate::pipeline::encode::EncodedImage;
use crate::region::{BoundingBox, DetectedRegion, RegionType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

/// The supported vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
        }
    }

    /// Environment variable the CLI falls back to for this vendor's key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ParseError;

    /// Exact, case-sensitive match on `openai`, `anthropic` or `gemini`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseError::UnsupportedProvider {
                provider: s.to_string(),
            })
    }
}

/// An API key supplied per request.
///
/// Never serialised; `Debug` is redacted so it cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl From<String> for Credential {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for Credential {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Token counts reported by a vendor for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// A successful call's payload plus its token usage.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub value: T,
    pub usage: TokenUsage,
}

impl<T> Reply<T> {
    pub fn new(value: T, usage: TokenUsage) -> Self {
        Self { value, usage }
    }
}

/// Everything a describe call needs to know about its region.
#[derive(Debug, Clone)]
pub struct RegionRequest<'a> {
    /// Cropped region image (or the full page when cropping failed).
    pub image: &'a EncodedImage,
    pub region_type: RegionType,
    /// Position of the region on the page, for the prompt.
    pub bbox: &'a BoundingBox,
}

/// Finds layout regions on a page image.
#[async_trait]
pub trait LayoutDescriber: Send + Sync {
    async fn layout(
        &self,
        page: &EncodedImage,
        model: &str,
        credential: &Credential,
    ) -> Result<Reply<Vec<DetectedRegion>>, CallError>;
}

/// Transcribes or describes one region.
///
/// Returns cleaned text; the extractor attaches the model name.
#[async_trait]
pub trait ContentDescriber: Send + Sync {
    async fn describe(
        &self,
        region: RegionRequest<'_>,
        model: &str,
        credential: &Credential,
    ) -> Result<Reply<String>, CallError>;
}

/// The capability pair one vendor supplies.
#[derive(Clone)]
pub struct ProviderPair {
    pub layout: Arc<dyn LayoutDescriber>,
    pub content: Arc<dyn ContentDescriber>,
}

impl ProviderPair {
    /// Use one adapter for both capabilities.
    pub fn from_adapter<A>(adapter: A) -> Self
    where
        A: LayoutDescriber + ContentDescriber + 'static,
    {
        let adapter = Arc::new(adapter);
        Self {
            layout: adapter.clone(),
            content: adapter,
        }
    }
}

/// Build the adapter pair for a vendor.
pub fn adapters_for(kind: ProviderKind, config: &ParseConfig) -> Result<ProviderPair, ParseError> {
    let transport = http::HttpTransport::new(config.api_timeout())?;
    let pair = match kind {
        ProviderKind::OpenAi => ProviderPair::from_adapter(OpenAiAdapter::new(transport, config)),
        ProviderKind::Anthropic => {
            ProviderPair::from_adapter(AnthropicAdapter::new(transport, config))
        }
        ProviderKind::Gemini => ProviderPair::from_adapter(GeminiAdapter::new(transport, config)),
    };
    Ok(pair)
}

/// Clean a describe reply; an empty result counts as a malformed reply.
pub(crate) fn finish_description(raw: &str, region_type: RegionType) -> Result<String, CallError> {
    let cleaned = crate::pipeline::postprocess::clean_content(raw, region_type);
    if cleaned.trim().is_empty() {
        return Err(CallError::malformed("empty description"));
    }
    Ok(cleaned)
}

/// Sampling knobs every adapter forwards.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&ParseConfig> for Sampling {
    fn from(config: &ParseConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_round_trip() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        for bad in ["mistral", "OpenAI", "", " gemini"] {
            let err = bad.parse::<ProviderKind>().unwrap_err();
            assert!(matches!(err, ParseError::UnsupportedProvider { .. }), "{bad}");
        }
    }

    #[test]
    fn credential_debug_is_redacted() {
        let c = Credential::new("sk-secret");
        assert_eq!(format!("{c:?}"), "Credential(***)");
        assert_eq!(c.expose(), "sk-secret");
        assert!(Credential::new("  ").is_empty());
    }

    #[test]
    fn usage_accumulates() {
        let mut total = TokenUsage::default();
        total += TokenUsage {
            input_tokens: 10,
            output_tokens: 2,
        };
        total += TokenUsage {
            input_tokens: 5,
            output_tokens: 1,
        };
        assert_eq!(total.input_tokens, 15);
        assert_eq!(total.output_tokens, 3);
    }

    #[test]
    fn empty_description_is_malformed() {
        assert_eq!(
            finish_description("```\n\n```", RegionType::Text).unwrap_err(),
            CallError::malformed("empty description")
        );
        assert_eq!(
            finish_description("  Hello  \n", RegionType::Text).unwrap(),
            "Hello"
        );
    }

    #[test]
    fn adapters_build_for_every_provider() {
        let config = ParseConfig::default();
        for kind in ProviderKind::ALL {
            assert!(adapters_for(kind, &config).is_ok());
        }
    }
}
