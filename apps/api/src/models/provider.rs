use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Upstream AI backends a persona can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
}

/// Static description of one provider: display label, selectable models and limits.
#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub provider: Provider,
    pub label: &'static str,
    pub models: &'static [&'static str],
    pub default_model: &'static str,
    pub max_output_tokens: u32,
}

const OPENAI: ProviderSpec = ProviderSpec {
    provider: Provider::OpenAi,
    label: "OpenAI",
    models: &["gpt-5.2-pro", "gpt-5.2", "gpt-5.1"],
    default_model: "gpt-4o",
    max_output_tokens: 4000,
};

const ANTHROPIC: ProviderSpec = ProviderSpec {
    provider: Provider::Anthropic,
    label: "Anthropic (Claude)",
    models: &["claude-opus-4-6"],
    default_model: "claude-opus-4-6",
    max_output_tokens: 4000,
};

const GOOGLE: ProviderSpec = ProviderSpec {
    provider: Provider::Google,
    label: "Google (Gemini)",
    models: &[
        "gemini-3-pro-preview",
        "gemini-3-flash-preview",
        "gemini-2.5-pro",
        "gemini-2.5-flash",
    ],
    default_model: "gemini-2.0-flash",
    max_output_tokens: 8000,
};

impl Provider {
    /// Every provider, in the order credentials are listed.
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::Google];

    pub fn spec(self) -> &'static ProviderSpec {
        match self {
            Provider::OpenAi => &OPENAI,
            Provider::Anthropic => &ANTHROPIC,
            Provider::Google => &GOOGLE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
        }
    }

    pub fn default_model(self) -> &'static str {
        self.spec().default_model
    }

    /// The default model is accepted alongside the listed ones since stored
    /// keys without an explicit model fall back to it.
    pub fn supports_model(self, model: &str) -> bool {
        let spec = self.spec();
        spec.default_model == model || spec.models.contains(&model)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "google" => Ok(Provider::Google),
            other => Err(format!("unsupported provider '{other}'")),
        }
    }
}

/// A stored API key for one provider together with the model selected for it.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub provider: Provider,
    pub key: String,
    pub model: String,
}

impl Credential {
    /// Key with everything but a short prefix and the last four characters hidden.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.key.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("key", &self.masked_key())
            .field("model", &self.model)
            .finish()
    }
}
