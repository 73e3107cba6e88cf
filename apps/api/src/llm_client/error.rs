//! Classified provider failures.
//!
//! Every failure coming out of the gateway carries an [`ErrorKind`] so the
//! orchestrator can attach it to a persona's result without inspecting raw
//! upstream text again.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No stored key for the persona's provider.
    MissingCredential,
    /// The key was rejected.
    Unauthorized,
    /// Rate limit or billing exhaustion.
    QuotaExceeded,
    /// The requested model does not exist for the provider.
    ModelNotFound,
    /// DNS, connect, reset or timeout.
    NetworkError,
    /// Anything else the provider reported.
    UpstreamError,
    /// Consumer went away. Never attached to a result.
    Cancelled,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::MissingCredential => "missing credential",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::QuotaExceeded => "quota exceeded",
            ErrorKind::ModelNotFound => "model not found",
            ErrorKind::NetworkError => "network error",
            ErrorKind::UpstreamError => "upstream error",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}: {message}", kind.label())]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn missing_credential(provider: Provider) -> Self {
        Self::new(
            ErrorKind::MissingCredential,
            format!("no API key stored for {}", provider.spec().label),
        )
    }

    pub fn model_not_found(provider: Provider, model: &str) -> Self {
        Self::new(
            ErrorKind::ModelNotFound,
            format!("model '{model}' is not available for {}", provider.spec().label),
        )
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::new(
            ErrorKind::NetworkError,
            format!("request timed out after {seconds}s"),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "request cancelled")
    }

    /// Classifies free-form upstream error text.
    pub fn from_text(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify_text(&message),
            message,
        }
    }

    /// Classifies a non-2xx response. The status code wins when it is
    /// unambiguous; otherwise the body text decides.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = extract_error_message(body).unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("provider returned HTTP {status}")
            } else {
                body.trim().to_string()
            }
        });

        let kind = match status {
            401 | 403 => ErrorKind::Unauthorized,
            429 => ErrorKind::QuotaExceeded,
            404 => ErrorKind::ModelNotFound,
            _ => match classify_text(&message) {
                ErrorKind::UpstreamError | ErrorKind::NetworkError => ErrorKind::UpstreamError,
                other => other,
            },
        };

        Self { kind, message }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), &err.to_string());
        }
        if err.is_timeout() {
            Self::new(ErrorKind::NetworkError, format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::new(ErrorKind::NetworkError, format!("connection failed: {err}"))
        } else if err.is_decode() || err.is_body() {
            Self::new(ErrorKind::NetworkError, format!("stream interrupted: {err}"))
        } else {
            Self::new(ErrorKind::NetworkError, err.to_string())
        }
    }
}

/// Keyword classification of raw provider error text.
pub fn classify_text(raw: &str) -> ErrorKind {
    let text = raw.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if has(&[
        "api key",
        "api_key",
        "x-api-key",
        "unauthorized",
        "authentication",
        "invalid_api_key",
        "permission denied",
        "incorrect api key",
    ]) {
        ErrorKind::Unauthorized
    } else if has(&[
        "quota",
        "rate limit",
        "rate_limit",
        "too many requests",
        "billing",
        "insufficient_quota",
        "resource_exhausted",
        "credit balance",
    ]) {
        ErrorKind::QuotaExceeded
    } else if text.contains("model")
        && has(&["not found", "does not exist", "not_found", "unknown model", "not supported"])
    {
        ErrorKind::ModelNotFound
    } else if has(&[
        "timed out",
        "timeout",
        "connection refused",
        "connection reset",
        "dns",
        "network",
        "failed to fetch",
    ]) {
        ErrorKind::NetworkError
    } else {
        ErrorKind::UpstreamError
    }
}

/// Pulls a human-readable message out of the JSON error bodies the three
/// providers return (`{"error": {"message"}}`, `{"error": "..."}`, or a
/// one-element array of either).
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let value = match value {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };
    let error = value.get("error")?;
    match error {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(obj) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    }
}
