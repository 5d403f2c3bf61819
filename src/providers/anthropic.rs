//! Anthropic Messages API adapter.

use super::http::{join_url, HttpTransport};
use super::layout::{parse_layout_reply, AxisOrder};
use super::{
    finish_description, ContentDescriber, Credential, LayoutDescriber, RegionRequest, Reply,
    Sampling, TokenUsage,
};
use crate::config::ParseConfig;
use crate::error::CallError;
use crate::pipeline::encode::EncodedImage;
use crate::prompts::{describe_prompt, DESCRIBE_SYSTEM_PROMPT, LAYOUT_PROMPT};
use crate::region::DetectedRegion;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const LAYOUT_USER_TEXT: &str = "Analyse the layout of this page.";

pub struct AnthropicAdapter {
    transport: HttpTransport,
    base_url: String,
    layout_prompt: String,
    sampling: Sampling,
}

impl AnthropicAdapter {
    pub fn new(transport: HttpTransport, config: &ParseConfig) -> Self {
        Self {
            transport,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            layout_prompt: config
                .layout_prompt
                .clone()
                .unwrap_or_else(|| LAYOUT_PROMPT.to_string()),
            sampling: Sampling::from(config),
        }
    }

    /// The version segment is appended here, so a base URL is the bare host.
    fn endpoint(&self) -> String {
        join_url(&self.base_url, "v1/messages")
    }

    async fn complete(
        &self,
        request: &MessagesRequest,
        credential: &Credential,
    ) -> Result<(String, TokenUsage), CallError> {
        let url = self.endpoint();
        let response: MessagesResponse = self
            .transport
            .post_json(
                &url,
                &[
                    ("x-api-key", credential.expose()),
                    ("anthropic-version", API_VERSION),
                ],
                request,
            )
            .await?;
        response.into_text()
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    system: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Image { source: ImageSource },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ReplyBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ReplyBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

fn build_request(
    model: &str,
    system: &str,
    text: String,
    image: &EncodedImage,
    sampling: Sampling,
) -> MessagesRequest {
    MessagesRequest {
        model: model.to_string(),
        system: system.to_string(),
        messages: vec![Message {
            role: "user",
            content: vec![
                ContentBlock::Image {
                    source: ImageSource {
                        kind: "base64",
                        media_type: image.mime_type,
                        data: image.data.clone(),
                    },
                },
                ContentBlock::Text { text },
            ],
        }],
        max_tokens: sampling.max_tokens,
        temperature: sampling.temperature,
    }
}

impl MessagesResponse {
    fn into_text(self) -> Result<(String, TokenUsage), CallError> {
        let usage = self
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            })
            .unwrap_or_default();
        let texts: Vec<String> = self
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect();
        if texts.is_empty() {
            return Err(CallError::malformed("reply has no text block"));
        }
        Ok((texts.join(""), usage))
    }
}

// ── Capabilities ─────────────────────────────────────────────────────────────

#[async_trait]
impl LayoutDescriber for AnthropicAdapter {
    async fn layout(
        &self,
        page: &EncodedImage,
        model: &str,
        credential: &Credential,
    ) -> Result<Reply<Vec<DetectedRegion>>, CallError> {
        let request = build_request(
            model,
            &self.layout_prompt,
            LAYOUT_USER_TEXT.to_string(),
            page,
            self.sampling,
        );
        let (text, usage) = self.complete(&request, credential).await?;
        let regions = parse_layout_reply(&text, AxisOrder::Xyxy, page.width, page.height)?;
        Ok(Reply::new(regions, usage))
    }
}

#[async_trait]
impl ContentDescriber for AnthropicAdapter {
    async fn describe(
        &self,
        region: RegionRequest<'_>,
        model: &str,
        credential: &Credential,
    ) -> Result<Reply<String>, CallError> {
        let request = build_request(
            model,
            DESCRIBE_SYSTEM_PROMPT,
            describe_prompt(region.region_type, region.bbox),
            region.image,
            self.sampling,
        );
        let (text, usage) = self.complete(&request, credential).await?;
        Ok(Reply::new(finish_description(&text, region.region_type)?, usage))
    }
}
