//! Single-persona relay: one prompt in, the raw fragment stream out as a
//! chunked `text/plain` body. Errors use a flat `{"error": string}` body.

use std::pin::Pin;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::{stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::gateway_status;
use crate::llm_client::prompts::{render_prompt, Phase};
use crate::llm_client::{FragmentStream, GatewayError, GatewayRequest};
use crate::models::{AnalysisInput, Persona};
use crate::state::AppState;

pub const SERVICE_KEY_HEADER: &str = "x-internal-service-key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub input: AnalysisInput,
    pub persona: Persona,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub phase: Phase,
}

pub struct RelayError {
    status: StatusCode,
    message: String,
}

impl RelayError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<GatewayError> for RelayError {
    fn from(e: GatewayError) -> Self {
        let (status, _) = gateway_status(e.kind);
        Self::new(status, e.message)
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// POST /api/v1/relay/analyze
pub async fn handle_relay_analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RelayRequest>, JsonRejection>,
) -> Result<Response, RelayError> {
    if let Some(expected) = &state.config.internal_service_key {
        let presented = headers
            .get(SERVICE_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return Err(RelayError::new(StatusCode::UNAUTHORIZED, "Unauthorized access."));
        }
    }

    let Json(req) = body.map_err(|e| RelayError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    if req.api_key.trim().is_empty() {
        return Err(RelayError::new(StatusCode::BAD_REQUEST, "apiKey is required"));
    }

    let request = GatewayRequest {
        provider: req.persona.provider,
        model: req.persona.model.clone(),
        credential: req.api_key.trim().to_string(),
        prompt: render_prompt(&req.input, &req.persona, req.phase),
        max_output_tokens: None,
    };

    info!(
        provider = %request.provider,
        persona_id = %req.persona.id,
        phase = ?req.phase,
        "Relaying analysis stream"
    );

    // Dropping the response body (client gone) cancels the upstream call.
    let cancel = CancellationToken::new();
    let fragments = state.gateway.invoke(request, cancel.clone()).await?;
    let guard = cancel.drop_guard();

    let timeout = state.config.stream_timeout;
    let body = with_deadline(fragments, timeout).map(move |item| {
        let _keep_alive = &guard;
        item.map(Bytes::from).map_err(|e| {
            warn!(kind = ?e.kind, error = %e.message, "Relay stream failed");
            e
        })
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}

/// Ends the stream with a timeout error once `limit` has elapsed.
fn with_deadline(fragments: FragmentStream, limit: Duration) -> FragmentStream {
    struct Deadline {
        inner: FragmentStream,
        sleep: Pin<Box<Sleep>>,
        expired: bool,
    }

    let state = Deadline {
        inner: fragments,
        sleep: Box::pin(tokio::time::sleep(limit)),
        expired: false,
    };

    stream::unfold(state, move |mut st| async move {
        if st.expired {
            return None;
        }
        tokio::select! {
            biased;
            item = st.inner.next() => item.map(|i| (i, st)),
            _ = &mut st.sleep => {
                st.expired = true;
                Some((Err(GatewayError::timeout(limit.as_secs())), st))
            }
        }
    })
    .boxed()
}
