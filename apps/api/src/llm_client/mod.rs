//! Provider Gateway: one uniform streaming contract over the three upstream
//! AI backends.
//!
//! The gateway never retries. Retry policy belongs to the orchestrator,
//! which retries whole persona tasks, never individual fragments.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub mod anthropic;
pub mod error;
pub mod google;
pub mod openai;
pub mod prompts;
pub mod sse;

pub use error::{ErrorKind, GatewayError};

use crate::models::{Credential, Provider};

/// Lazily produced text fragments. Concatenated in arrival order they form
/// the full response.
pub type FragmentStream = BoxStream<'static, Result<String, GatewayError>>;

/// A fully rendered call: which backend, which model, which key, what prompt.
#[derive(Clone)]
pub struct GatewayRequest {
    pub provider: Provider,
    pub model: String,
    pub credential: String,
    pub prompt: String,
    /// Output ceiling; `None` uses the provider default.
    pub max_output_tokens: Option<u32>,
}

impl fmt::Debug for GatewayRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayRequest")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("prompt_len", &self.prompt.len())
            .finish_non_exhaustive()
    }
}

impl GatewayRequest {
    pub fn output_tokens(&self) -> u32 {
        self.max_output_tokens
            .unwrap_or(self.provider.spec().max_output_tokens)
    }

    /// Checks the inputs that can be rejected without a network call.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.credential.trim().is_empty() {
            return Err(GatewayError::missing_credential(self.provider));
        }
        if !self.provider.supports_model(&self.model) {
            return Err(GatewayError::model_not_found(self.provider, &self.model));
        }
        Ok(())
    }
}

/// Uniform streaming call contract. Carried as `Arc<dyn ProviderGateway>`.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Starts one streaming generation. Failures before the first fragment
    /// are returned directly; later failures arrive as the stream's last item.
    /// Once `cancel` fires the stream stops yielding.
    async fn invoke(
        &self,
        request: GatewayRequest,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, GatewayError>;
}

/// Base URLs for each upstream API.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub openai: String,
    pub anthropic: String,
    pub google: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            openai: openai::DEFAULT_BASE_URL.to_string(),
            anthropic: anthropic::DEFAULT_BASE_URL.to_string(),
            google: google::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// The production gateway: HTTPS + SSE against the real providers.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    endpoints: ProviderEndpoints,
}

impl HttpGateway {
    pub fn new(endpoints: ProviderEndpoints) -> anyhow::Result<Self> {
        // No overall request timeout here: streams are long-lived and the
        // orchestrator bounds each task's wall-clock time itself.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, endpoints })
    }
}

#[async_trait]
impl ProviderGateway for HttpGateway {
    async fn invoke(
        &self,
        request: GatewayRequest,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, GatewayError> {
        request.validate()?;

        let (builder, extract): (_, sse::FragmentExtractor) = match request.provider {
            Provider::OpenAi => (
                openai::build_request(&self.client, &self.endpoints.openai, &request),
                openai::extract_fragment,
            ),
            Provider::Anthropic => (
                anthropic::build_request(&self.client, &self.endpoints.anthropic, &request),
                anthropic::extract_fragment,
            ),
            Provider::Google => (
                google::build_request(&self.client, &self.endpoints.google, &request),
                google::extract_fragment,
            ),
        };

        debug!(provider = %request.provider, model = %request.model, "Opening provider stream");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GatewayError::cancelled()),
            response = builder.send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = GatewayError::from_status(status.as_u16(), &body);
            warn!(
                provider = %request.provider,
                status = status.as_u16(),
                kind = ?err.kind,
                "Provider rejected request"
            );
            return Err(err);
        }

        Ok(sse::fragment_stream(response, cancel, extract))
    }
}

/// Output ceiling for credential checks.
pub const VERIFY_MAX_TOKENS: u32 = 20;

/// Confirms a credential works by requesting a tiny completion and draining
/// it. Gives up with a network error once `limit` has elapsed.
pub async fn verify_credential(
    gateway: &Arc<dyn ProviderGateway>,
    credential: &Credential,
    limit: Duration,
) -> Result<(), GatewayError> {
    let request = GatewayRequest {
        provider: credential.provider,
        model: credential.model.clone(),
        credential: credential.key.clone(),
        prompt: "hi".to_string(),
        max_output_tokens: Some(VERIFY_MAX_TOKENS),
    };

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let drain = async {
        let mut stream = gateway.invoke(request, cancel).await?;
        while let Some(fragment) = stream.next().await {
            fragment?;
        }
        Ok::<(), GatewayError>(())
    };

    match tokio::time::timeout(limit, drain).await {
        Ok(result) => result,
        Err(_) => {
            warn!(provider = %credential.provider, "Credential check timed out");
            Err(GatewayError::timeout(limit.as_secs()))
        }
    }
}
