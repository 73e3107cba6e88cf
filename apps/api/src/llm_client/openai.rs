//! OpenAI Chat Completions adapter.

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::llm_client::error::{ErrorKind, GatewayError};
use crate::llm_client::GatewayRequest;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_completion_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

pub fn build_request(client: &Client, base_url: &str, request: &GatewayRequest) -> RequestBuilder {
    let body = ChatRequest {
        model: &request.model,
        messages: vec![ChatMessage {
            role: "user",
            content: &request.prompt,
        }],
        max_completion_tokens: request.output_tokens(),
        stream: true,
    };

    client
        .post(format!("{}/chat/completions", base_url.trim_end_matches('/')))
        .bearer_auth(&request.credential)
        .json(&body)
}

pub fn extract_fragment(data: &str) -> Result<Option<String>, GatewayError> {
    let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| {
        GatewayError::new(
            ErrorKind::UpstreamError,
            format!("unreadable stream chunk: {e}"),
        )
    })?;

    if let Some(error) = chunk.error {
        return Err(GatewayError::from_text(error.message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content))
}
