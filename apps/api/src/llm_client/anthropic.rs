//! Anthropic Messages adapter.

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::llm_client::error::{ErrorKind, GatewayError};
use crate::llm_client::GatewayRequest;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    stream: bool,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: BlockDelta },
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct BlockDelta {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

pub fn build_request(client: &Client, base_url: &str, request: &GatewayRequest) -> RequestBuilder {
    let body = MessagesRequest {
        model: &request.model,
        max_tokens: request.output_tokens(),
        stream: true,
        messages: vec![Message {
            role: "user",
            content: &request.prompt,
        }],
    };

    client
        .post(format!("{}/messages", base_url.trim_end_matches('/')))
        .header("x-api-key", &request.credential)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&body)
}

pub fn extract_fragment(data: &str) -> Result<Option<String>, GatewayError> {
    let event: StreamEvent = serde_json::from_str(data).map_err(|e| {
        GatewayError::new(
            ErrorKind::UpstreamError,
            format!("unreadable stream event: {e}"),
        )
    })?;

    match event {
        StreamEvent::ContentBlockDelta { delta } => Ok(delta.text),
        StreamEvent::Error { error } => {
            let kind = match error.error_type.as_str() {
                "authentication_error" | "permission_error" => ErrorKind::Unauthorized,
                "rate_limit_error" => ErrorKind::QuotaExceeded,
                "not_found_error" => ErrorKind::ModelNotFound,
                _ => ErrorKind::UpstreamError,
            };
            Err(GatewayError::new(kind, error.message))
        }
        StreamEvent::Other => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        assert_eq!(extract_fragment(data).unwrap().as_deref(), Some("Hello"));
    }

    #[test]
    fn test_bookkeeping_events_are_skipped() {
        for data in [
            r#"{"type":"message_start","message":{"id":"m1"}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"message_stop"}"#,
        ] {
            assert_eq!(extract_fragment(data).unwrap(), None);
        }
    }

    #[test]
    fn test_error_event_is_classified_by_type() {
        let data = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#;
        let err = extract_fragment(data).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QuotaExceeded);
        assert_eq!(err.message, "slow down");

        let data = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(extract_fragment(data).unwrap_err().kind, ErrorKind::UpstreamError);
    }
}
