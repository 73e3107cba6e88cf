use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::key_store::KeyStore;
use crate::llm_client::verify_credential;
use crate::models::{Credential, Provider};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// One provider's settings row. Raw keys never leave the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderKeyView {
    pub provider: Provider,
    pub label: &'static str,
    pub models: Vec<&'static str>,
    pub default_model: &'static str,
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_key: Option<String>,
}

impl ProviderKeyView {
    fn new(provider: Provider, credential: Option<&Credential>) -> Self {
        let spec = provider.spec();
        Self {
            provider,
            label: spec.label,
            models: spec.models.to_vec(),
            default_model: spec.default_model,
            configured: credential.is_some(),
            model: credential.map(|c| c.model.clone()),
            masked_key: credential.map(Credential::masked_key),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KeyListResponse {
    pub providers: Vec<ProviderKeyView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveKeyRequest {
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestKeyRequest {
    pub provider: Provider,
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TestKeyResponse {
    pub ok: bool,
}

fn parse_provider(raw: &str) -> Result<Provider, AppError> {
    raw.parse::<Provider>().map_err(AppError::Validation)
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/keys
pub async fn handle_list_keys(State(state): State<AppState>) -> Json<KeyListResponse> {
    let stored = state.key_store.all_credentials();
    let providers = Provider::ALL
        .iter()
        .map(|p| ProviderKeyView::new(*p, stored.iter().find(|c| c.provider == *p)))
        .collect();
    Json(KeyListResponse { providers })
}

/// PUT /api/v1/keys/:provider
pub async fn handle_save_key(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(req): Json<SaveKeyRequest>,
) -> Result<Json<ProviderKeyView>, AppError> {
    let provider = parse_provider(&provider)?;
    let credential = state
        .key_store
        .save(provider, &req.api_key, req.model.as_deref())
        .await?;
    Ok(Json(ProviderKeyView::new(provider, Some(&credential))))
}

/// DELETE /api/v1/keys/:provider
pub async fn handle_delete_key(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<StatusCode, AppError> {
    let provider = parse_provider(&provider)?;
    if state.key_store.remove(provider).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("No API key stored for {provider}")))
    }
}

/// POST /api/v1/keys/test
///
/// Sends a one-word prompt with the given key and drains the reply.
/// Nothing is stored.
pub async fn handle_test_key(
    State(state): State<AppState>,
    Json(req): Json<TestKeyRequest>,
) -> Result<Json<TestKeyResponse>, AppError> {
    if req.api_key.trim().is_empty() {
        return Err(AppError::Validation("apiKey cannot be empty".to_string()));
    }
    let model = req
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| req.provider.default_model().to_string());

    let credential = Credential {
        provider: req.provider,
        key: req.api_key.trim().to_string(),
        model,
    };
    verify_credential(&state.gateway, &credential, state.config.stream_timeout).await?;

    info!(provider = %req.provider, "API key verified");
    Ok(Json(TestKeyResponse { ok: true }))
}

