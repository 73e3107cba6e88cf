use axum::{extract::State, Json};
use serde::Serialize;

use crate::key_store::KeyStore;
use crate::models::Persona;
use crate::personas::{PersonaPreset, PersonaRegistry, PRESETS};
use crate::state::AppState;

#[derive(Serialize)]
pub struct PersonaDefaultsResponse {
    pub personas: Vec<Persona>,
    pub presets: Vec<PersonaPreset>,
}

/// GET /api/v1/personas/defaults
///
/// One blank persona per stored key, plus the built-in presets.
pub async fn handle_persona_defaults(State(state): State<AppState>) -> Json<PersonaDefaultsResponse> {
    let registry = PersonaRegistry::from_credentials(&state.key_store.all_credentials());
    Json(PersonaDefaultsResponse {
        personas: registry.into_personas(),
        presets: PRESETS.to_vec(),
    })
}
