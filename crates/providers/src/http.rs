//! HTTP plumbing shared by the provider clients.
//!
//! Status mapping, error-body extraction and line splitting for SSE and
//! NDJSON streams.

use agentscope_core::ModelError;
use std::time::Duration;
use tracing::warn;

/// Build the reqwest client every provider uses.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ModelError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ModelError::NotConfigured(format!("Failed to create HTTP client: {e}")))
}

pub(crate) fn network_error(e: reqwest::Error) -> ModelError {
    ModelError::Network(e.to_string())
}

/// Pass a successful response through; turn anything else into the
/// matching [`ModelError`].
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    warn!(provider, status = status.as_u16(), body = %body, "Provider returned error");

    let mut error = ModelError::from_status(status.as_u16(), error_message(&body));
    if let (ModelError::RateLimited { retry_after_secs, .. }, Some(secs)) = (&mut error, retry_after) {
        *retry_after_secs = secs;
    }
    Err(error)
}

/// Pull a readable message out of a provider error body.
///
/// Understands `{"error": {"message"}}` (OpenAI), `{"code", "message"}`
/// (DashScope) and `{"error": "..."}` (Ollama); falls back to the raw body.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    if let Some(msg) = value.pointer("/error/message").and_then(|m| m.as_str()) {
        return msg.to_string();
    }
    if let Some(msg) = value.get("error").and_then(|m| m.as_str()) {
        return msg.to_string();
    }
    if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
        return match value.get("code").and_then(|c| c.as_str()) {
            Some(code) => format!("{code}: {msg}"),
            None => msg.to_string(),
        };
    }
    body.trim().to_string()
}

/// Splits a byte stream into complete lines.
///
/// Bytes are buffered until a newline arrives, so multi-byte characters
/// split across network chunks survive intact.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Whatever is left once the stream ends.
    pub(crate) fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buf).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Payload of an SSE `data:` line (with or without a space after the colon).
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|d| d.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_joins_partial_lines() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        let lines = buf.push(b":1}\r\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "data: [DONE]"]);
        assert!(buf.finish().is_none());
    }

    #[test]
    fn line_buffer_keeps_split_utf8() {
        let text = "héllo\n".as_bytes();
        let mut buf = LineBuffer::default();
        assert!(buf.push(&text[..2]).is_empty());
        assert_eq!(buf.push(&text[2..]), vec!["héllo"]);
    }

    #[test]
    fn line_buffer_finish_returns_tail() {
        let mut buf = LineBuffer::default();
        buf.push(b"{\"done\":true}");
        assert_eq!(buf.finish().as_deref(), Some("{\"done\":true}"));
    }

    #[test]
    fn sse_data_with_and_without_space() {
        assert_eq!(sse_data("data: {}"), Some("{}"));
        assert_eq!(sse_data("data:{}"), Some("{}"));
        assert_eq!(sse_data("event:result"), None);
    }

    #[test]
    fn error_message_formats() {
        assert_eq!(
            error_message(r#"{"error":{"message":"Incorrect API key","type":"invalid_request_error"}}"#),
            "Incorrect API key"
        );
        assert_eq!(
            error_message(r#"{"code":"InvalidApiKey","message":"Invalid API-key provided.","request_id":"x"}"#),
            "InvalidApiKey: Invalid API-key provided."
        );
        assert_eq!(error_message(r#"{"error":"model 'x' not found"}"#), "model 'x' not found");
        assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
    }
}
