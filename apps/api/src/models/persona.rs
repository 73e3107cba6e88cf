use serde::{Deserialize, Serialize};

use crate::models::provider::Provider;

/// A configured interviewer viewpoint bound to one provider and model.
/// Immutable once an analysis run has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub description: String,
    pub provider: Provider,
    pub model: String,
}

impl Persona {
    /// Name shown to the user; falls back to the provider label for blank personas.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.provider.spec().label
        } else {
            &self.name
        }
    }
}
