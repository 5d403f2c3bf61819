//! Google Gemini `generateContent` adapter.
//!
//! Gemini is trained to answer layout questions with `box_2d` in
//! `[ymin, xmin, ymax, xmax]` order on a 0–1000 grid, so its built-in layout
//! prompt asks for exactly that and the reply parser swaps the axes back.
//! The key travels in the `x-goog-api-key` header, never in the URL.

use super::http::{join_url, HttpTransport};
use super::layout::{parse_layout_reply, AxisOrder};
use super::{
    finish_description, ContentDescriber, Credential, LayoutDescriber, RegionRequest, Reply,
    Sampling, TokenUsage,
};
use crate::config::ParseConfig;
use crate::error::CallError;
use crate::pipeline::encode::EncodedImage;
use crate::prompts::{describe_prompt, DESCRIBE_SYSTEM_PROMPT, GEMINI_LAYOUT_PROMPT};
use crate::region::DetectedRegion;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const LAYOUT_USER_TEXT: &str = "Analyse the layout of this page.";

pub struct GeminiAdapter {
    transport: HttpTransport,
    base_url: String,
    layout_prompt: String,
    layout_order: AxisOrder,
    sampling: Sampling,
}

impl GeminiAdapter {
    pub fn new(transport: HttpTransport, config: &ParseConfig) -> Self {
        // A custom prompt decides its own box format; only `box_2d` keys are
        // still read as yxyx.
        let (layout_prompt, layout_order) = match &config.layout_prompt {
            Some(p) => (p.clone(), AxisOrder::Xyxy),
            None => (GEMINI_LAYOUT_PROMPT.to_string(), AxisOrder::Yxyx),
        };
        Self {
            transport,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            layout_prompt,
            layout_order,
            sampling: Sampling::from(config),
        }
    }

    /// The version segment is appended here, so a base URL is the bare host.
    fn endpoint(&self, model: &str) -> String {
        join_url(
            &self.base_url,
            &format!("v1beta/models/{model}:generateContent"),
        )
    }

    async fn complete(
        &self,
        model: &str,
        request: &GenerateRequest,
        credential: &Credential,
    ) -> Result<(String, TokenUsage), CallError> {
        let url = self.endpoint(model);
        let response: GenerateResponse = self
            .transport
            .post_json(&url, &[("x-goog-api-key", credential.expose())], request)
            .await?;
        response.into_text()
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Instruction,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Instruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

fn build_request(
    system: &str,
    text: String,
    image: &EncodedImage,
    sampling: Sampling,
    json_mode: bool,
) -> GenerateRequest {
    GenerateRequest {
        system_instruction: Instruction {
            parts: vec![Part::Text {
                text: system.to_string(),
            }],
        },
        contents: vec![Content {
            role: "user",
            parts: vec![
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: image.mime_type,
                        data: image.data.clone(),
                    },
                },
                Part::Text { text },
            ],
        }],
        generation_config: GenerationConfig {
            temperature: sampling.temperature,
            max_output_tokens: sampling.max_tokens,
            response_mime_type: json_mode.then_some("application/json"),
        },
    }
}

impl GenerateResponse {
    fn into_text(self) -> Result<(String, TokenUsage), CallError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(CallError::malformed(format!("prompt blocked: {reason}")));
        }
        let usage = self
            .usage_metadata
            .map(|u| TokenUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| CallError::malformed("reply has no candidates"))?;
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
            return Err(CallError::malformed(format!(
                "candidate has no text (finish reason {reason})"
            )));
        }
        Ok((text, usage))
    }
}

// ── Capabilities ─────────────────────────────────────────────────────────────

#[async_trait]
impl LayoutDescriber for GeminiAdapter {
    async fn layout(
        &self,
        page: &EncodedImage,
        model: &str,
        credential: &Credential,
    ) -> Result<Reply<Vec<DetectedRegion>>, CallError> {
        let request = build_request(
            &self.layout_prompt,
            LAYOUT_USER_TEXT.to_string(),
            page,
            self.sampling,
            true,
        );
        let (text, usage) = self.complete(model, &request, credential).await?;
        let regions = parse_layout_reply(&text, self.layout_order, page.width, page.height)?;
        Ok(Reply::new(regions, usage))
    }
}

#[async_trait]
impl ContentDescriber for GeminiAdapter {
    async fn describe(
        &self,
        region: RegionRequest<'_>,
        model: &str,
        credential: &Credential,
    ) -> Result<Reply<String>, CallError> {
        let request = build_request(
            DESCRIBE_SYSTEM_PROMPT,
            describe_prompt(region.region_type, region.bbox),
            region.image,
            self.sampling,
            false,
        );
        let (text, usage) = self.complete(model, &request, credential).await?;
        Ok(Reply::new(finish_description(&text, region.region_type)?, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn image() -> EncodedImage {
        EncodedImage {
            data: "QUJD".into(),
            mime_type: "image/png",
            width: 100,
            height: 100,
        }
    }

    #[test]
    fn base_url_override_gets_the_version_appended() {
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let adapter = GeminiAdapter::new(transport.clone(), &ParseConfig::default());
        assert_eq!(
            adapter.endpoint("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );

        let config = ParseConfig::builder()
            .base_url("http://localhost:8080")
            .build()
            .unwrap();
        let adapter = GeminiAdapter::new(transport, &config);
        assert_eq!(
            adapter.endpoint("gemini-2.5-flash"),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn request_shape() {
        let sampling = Sampling {
            temperature: 0.0,
            max_tokens: 2048,
        };
        let v: Value =
            serde_json::to_value(build_request("sys", "go".into(), &image(), sampling, true))
                .unwrap();
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(v["contents"][0]["role"], "user");
        assert_eq!(v["contents"][0]["parts"][0]["inline_data"]["mime_type"], "image/png");
        assert_eq!(v["contents"][0]["parts"][0]["inline_data"]["data"], "QUJD");
        assert_eq!(v["contents"][0]["parts"][1]["text"], "go");
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(v["generationConfig"]["responseMimeType"], "application/json");

        let v: Value =
            serde_json::to_value(build_request("sys", "go".into(), &image(), sampling, false))
                .unwrap();
        assert!(v["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn concatenates_parts_and_reads_usage() {
        let resp: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "[{\"type\": "}, {"text": "\"text\"}]"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 800, "candidatesTokenCount": 40, "totalTokenCount": 840}
        }))
        .unwrap();
        let (text, usage) = resp.into_text().unwrap();
        assert_eq!(text, "[{\"type\": \"text\"}]");
        assert_eq!(usage.input_tokens, 800);
        assert_eq!(usage.output_tokens, 40);
    }

    #[test]
    fn blocked_and_empty_candidates_are_malformed() {
        let resp: GenerateResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let err = resp.into_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));

        let resp: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "RECITATION"}]
        }))
        .unwrap();
        let err = resp.into_text().unwrap_err();
        assert!(matches!(err, CallError::MalformedResponse { .. }));
        assert!(err.to_string().contains("RECITATION"));
    }

    #[test]
    fn custom_prompt_switches_axis_order() {
        let transport = HttpTransport::new(std::time::Duration::from_secs(5)).unwrap();
        let adapter = GeminiAdapter::new(transport.clone(), &ParseConfig::default());
        assert_eq!(adapter.layout_order, AxisOrder::Yxyx);

        let config = ParseConfig::builder()
            .layout_prompt("find regions, answer with bbox")
            .build()
            .unwrap();
        let adapter = GeminiAdapter::new(transport, &config);
        assert_eq!(adapter.layout_order, AxisOrder::Xyxy);
        assert_eq!(adapter.layout_prompt, "find regions, answer with bbox");
    }
}
