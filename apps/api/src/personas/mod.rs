//! Persona Registry: builds and checks the interviewer list for a run.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Credential, Persona};

pub mod handlers;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PersonaError {
    #[error("at least one persona is required")]
    Empty,

    #[error("persona id cannot be empty")]
    EmptyId,

    #[error("duplicate persona id '{0}'")]
    DuplicateId(String),

    #[error("persona '{id}' uses model '{model}', which {provider} does not offer")]
    UnsupportedModel {
        id: String,
        provider: String,
        model: String,
    },
}

/// A ready-made interviewer viewpoint that can be applied to any persona.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PersonaPreset {
    pub name: &'static str,
    pub description: &'static str,
}

impl PersonaPreset {
    /// Overwrites the persona's name, role and description. Provider and
    /// model are kept.
    pub fn apply(&self, persona: &mut Persona) {
        persona.name = self.name.to_string();
        persona.role = self.name.to_string();
        persona.description = self.description.to_string();
    }
}

pub const PRESETS: [PersonaPreset; 3] = [
    PersonaPreset {
        name: "Domain expert",
        description: "a senior engineer with ten years in the field who judges how well the \
                      candidate's stack and hands-on experience match the posting's requirements",
    },
    PersonaPreset {
        name: "HR partner",
        description: "an HR team member who weighs job-change history, culture fit, \
                      collaboration and communication",
    },
    PersonaPreset {
        name: "Hiring manager",
        description: "the team lead who looks at growth potential, self-directed learning \
                      and how quickly the candidate could onboard",
    },
];

#[derive(Debug, Clone, Default)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
}

impl PersonaRegistry {
    /// One blank persona per stored credential, bound to its provider and
    /// selected model.
    pub fn from_credentials(credentials: &[Credential]) -> Self {
        let personas = credentials
            .iter()
            .map(|c| Persona {
                id: Uuid::new_v4().to_string(),
                name: String::new(),
                role: String::new(),
                description: String::new(),
                provider: c.provider,
                model: c.model.clone(),
            })
            .collect();
        Self { personas }
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn into_personas(self) -> Vec<Persona> {
        self.personas
    }

    /// Rejects lists a run cannot be keyed on. Missing credentials are not
    /// checked here; the run reports them per persona.
    pub fn validate(personas: &[Persona]) -> Result<(), PersonaError> {
        if personas.is_empty() {
            return Err(PersonaError::Empty);
        }

        let mut seen = HashSet::new();
        for p in personas {
            if p.id.trim().is_empty() {
                return Err(PersonaError::EmptyId);
            }
            if !seen.insert(p.id.as_str()) {
                return Err(PersonaError::DuplicateId(p.id.clone()));
            }
            if !p.provider.supports_model(&p.model) {
                return Err(PersonaError::UnsupportedModel {
                    id: p.id.clone(),
                    provider: p.provider.to_string(),
                    model: p.model.clone(),
                });
            }
        }
        Ok(())
    }
}
