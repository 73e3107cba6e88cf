//! Google Generative Language (Gemini) adapter.

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::llm_client::error::{ErrorKind, GatewayError};
use crate::llm_client::GatewayRequest;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

pub fn build_request(client: &Client, base_url: &str, request: &GatewayRequest) -> RequestBuilder {
    let body = GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![Part {
                text: &request.prompt,
            }],
        }],
        generation_config: GenerationConfig {
            max_output_tokens: request.output_tokens(),
        },
    };

    client
        .post(format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            base_url.trim_end_matches('/'),
            request.model
        ))
        .header("x-goog-api-key", &request.credential)
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

    let text: String = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok((!text.is_empty()).then_some(text))
}
