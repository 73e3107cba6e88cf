use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::key_store::KeyStoreError;
use crate::llm_client::{ErrorKind, GatewayError};
use crate::orchestrator::RetryError;
use crate::personas::PersonaError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Provider error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<KeyStoreError> for AppError {
    fn from(e: KeyStoreError) -> Self {
        match e {
            KeyStoreError::EmptyKey | KeyStoreError::UnsupportedModel { .. } => {
                AppError::Validation(e.to_string())
            }
            KeyStoreError::Storage(inner) => AppError::Internal(inner),
        }
    }
}

impl From<RetryError> for AppError {
    fn from(e: RetryError) -> Self {
        match e {
            RetryError::UnknownPersona(_) => AppError::NotFound(e.to_string()),
            RetryError::NotTerminal { .. } | RetryError::ShutDown => {
                AppError::Conflict(e.to_string())
            }
            RetryError::MissingCredential(_) => AppError::UnprocessableEntity(e.to_string()),
        }
    }
}

impl From<PersonaError> for AppError {
    fn from(e: PersonaError) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// Status and machine-readable code for a classified provider failure.
pub fn gateway_status(kind: ErrorKind) -> (StatusCode, &'static str) {
    match kind {
        ErrorKind::MissingCredential => (StatusCode::UNPROCESSABLE_ENTITY, "MISSING_CREDENTIAL"),
        ErrorKind::Unauthorized => (StatusCode::UNAUTHORIZED, "PROVIDER_UNAUTHORIZED"),
        ErrorKind::QuotaExceeded => (StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED"),
        ErrorKind::ModelNotFound => (StatusCode::NOT_FOUND, "MODEL_NOT_FOUND"),
        ErrorKind::NetworkError => (StatusCode::BAD_GATEWAY, "NETWORK_ERROR"),
        ErrorKind::UpstreamError => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
        ErrorKind::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "CANCELLED"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Gateway(e) => {
                tracing::warn!("Provider error: {e}");
                let (status, code) = gateway_status(e.kind);
                (status, code, e.message.clone())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
