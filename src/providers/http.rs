//! Shared HTTP plumbing for the adapters.
//!
//! One `reqwest::Client` per request keeps connection pools from leaking
//! across callers. Every failure is mapped onto [`CallError`] here, so the
//! adapters only deal with payload shapes.

use crate::error::{CallError, ParseError};
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// JSON-over-HTTPS transport with a per-call timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ParseError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParseError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    /// POST a JSON body and decode the JSON reply into `R`.
    ///
    /// `headers` carry authentication; they are never logged.
    pub async fn post_json<B, R>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &B,
    ) -> Result<R, CallError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| self.map_reqwest(e))?;
        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await.map_err(|e| self.map_reqwest(e))?;
        debug!("POST {} → {} ({} bytes)", url, status.as_u16(), text.len());

        if !status.is_success() {
            return Err(CallError::Provider {
                status: status.as_u16(),
                message: error_message(&text),
                retry_after_secs,
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| CallError::malformed(format!("unexpected reply shape: {e}")))
    }

    fn map_reqwest(&self, e: reqwest::Error) -> CallError {
        if e.is_timeout() {
            CallError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            CallError::Transport {
                detail: e.without_url().to_string(),
            }
        }
    }
}

/// Pull a human-readable message out of a vendor error body.
///
/// OpenAI, Anthropic and Gemini all nest it under `error.message`.
pub fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = json
            .pointer("/error/message")
            .and_then(Value::as_str)
            .or_else(|| json.get("message").and_then(Value::as_str))
        {
            return msg.to_string();
        }
    }
    let body = body.trim();
    if body.is_empty() {
        return "empty error body".to_string();
    }
    match body.char_indices().nth(200) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}

/// Join a base URL and a path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_from_vendor_bodies() {
        let openai = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(error_message(openai), "Incorrect API key provided");

        let anthropic = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(error_message(anthropic), "Overloaded");

        let gemini = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(error_message(gemini), "API key not valid");
    }

    #[test]
    fn error_message_falls_back_to_truncated_body() {
        assert_eq!(error_message("<html>Bad Gateway</html>"), "<html>Bad Gateway</html>");
        assert_eq!(error_message("  "), "empty error body");
        let long = "x".repeat(500);
        let msg = error_message(&long);
        assert_eq!(msg.chars().count(), 201);
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(
            join_url("https://api.openai.com/v1/", "/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(join_url("http://localhost:8080", "v1/messages"), "http://localhost:8080/v1/messages");
    }
}
