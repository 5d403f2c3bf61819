//! OpenAI Chat Completions adapter.
//!
//! Also works against OpenAI-compatible servers (vLLM, Ollama, LiteLLM)
//! through [`crate::config::ParseConfig::base_url`].

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
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const LAYOUT_USER_TEXT: &str = "Analyse the layout of this page.";

pub struct OpenAiAdapter {
    transport: HttpTransport,
    base_url: String,
    layout_prompt: String,
    sampling: Sampling,
}

impl OpenAiAdapter {
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

    /// The base URL carries the API version (`.../v1`); only the route is
    /// appended.
    fn endpoint(&self) -> String {
        join_url(&self.base_url, "chat/completions")
    }

    async fn complete(
        &self,
        request: &ChatRequest,
        credential: &Credential,
    ) -> Result<(String, TokenUsage), CallError> {
        let url = self.endpoint();
        let auth = format!("Bearer {}", credential.expose());
        let response: ChatResponse = self
            .transport
            .post_json(&url, &[("Authorization", auth.as_str())], request)
            .await?;
        response.into_text()
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn build_request(
    model: &str,
    system: &str,
    text: String,
    image: &EncodedImage,
    sampling: Sampling,
    json_mode: bool,
) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system",
                content: MessageContent::Text(system.to_string()),
            },
            ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text { text },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.data_url(),
                            detail: "high",
                        },
                    },
                ]),
            },
        ],
        temperature: sampling.temperature,
        max_tokens: sampling.max_tokens,
        // JSON mode is rejected unless the word "JSON" appears in the messages.
        response_format: (json_mode && system.to_ascii_lowercase().contains("json"))
            .then_some(ResponseFormat {
                kind: "json_object",
            }),
    }
}

impl ChatResponse {
    fn into_text(self) -> Result<(String, TokenUsage), CallError> {
        let usage = self
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CallError::malformed("reply has no choices"))?;
        if let Some(refusal) = choice.message.refusal.filter(|r| !r.is_empty()) {
            return Err(CallError::malformed(format!("model refused: {refusal}")));
        }
        match choice.message.content {
            Some(text) => {
                if choice.finish_reason.as_deref() == Some("length") {
                    debug!("OpenAI reply truncated at max_tokens");
                }
                Ok((text, usage))
            }
            None => Err(CallError::malformed("reply has no message content")),
        }
    }
}

// ── Capabilities ─────────────────────────────────────────────────────────────

#[async_trait]
impl LayoutDescriber for OpenAiAdapter {
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
            true,
        );
        let (text, usage) = self.complete(&request, credential).await?;
        let regions = parse_layout_reply(&text, AxisOrder::Xyxy, page.width, page.height)?;
        Ok(Reply::new(regions, usage))
    }
}

#[async_trait]
impl ContentDescriber for OpenAiAdapter {
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
            false,
        );
        let (text, usage) = self.complete(&request, credential).await?;
        Ok(Reply::new(finish_description(&text, region.region_type)?, usage))
    }
}
