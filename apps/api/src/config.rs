use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::ProviderEndpoints;

/// Application configuration loaded from environment variables.
/// Every variable has a default; only malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Holds `keys.json` and `history.json`.
    pub data_dir: PathBuf,
    pub stream_timeout: Duration,
    pub history_capacity: usize,
    /// Shared secret for the relay endpoint. Unset disables the check.
    pub internal_service_key: Option<String>,
    pub endpoints: ProviderEndpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            rust_log: "info".to_string(),
            data_dir: PathBuf::from("./data"),
            stream_timeout: Duration::from_secs(30),
            history_capacity: 50,
            internal_service_key: None,
            endpoints: ProviderEndpoints::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = Config::default();
        let endpoints = ProviderEndpoints {
            openai: optional_env("OPENAI_BASE_URL").unwrap_or(defaults.endpoints.openai),
            anthropic: optional_env("ANTHROPIC_BASE_URL").unwrap_or(defaults.endpoints.anthropic),
            google: optional_env("GOOGLE_BASE_URL").unwrap_or(defaults.endpoints.google),
        };

        Ok(Config {
            port: parse_env("PORT", defaults.port).context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG").unwrap_or(defaults.rust_log),
            data_dir: optional_env("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            stream_timeout: Duration::from_secs(
                parse_env("STREAM_TIMEOUT_SECS", defaults.stream_timeout.as_secs())
                    .context("STREAM_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            history_capacity: parse_env("HISTORY_CAPACITY", defaults.history_capacity)
                .context("HISTORY_CAPACITY must be a positive integer")?,
            internal_service_key: optional_env("INTERNAL_SERVICE_KEY"),
            endpoints,
        })
    }

    pub fn keys_path(&self) -> PathBuf {
        self.data_dir.join("keys.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.json")
    }
}

/// Unset and blank variables both count as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value '{raw}' for {key}")),
        None => Ok(default),
    }
}
