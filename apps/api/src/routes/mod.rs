pub mod health;
pub mod relay;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::history::handlers as history;
use crate::key_store::handlers as keys;
use crate::orchestrator::handlers as analyses;
use crate::personas::handlers as personas;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Settings
        .route("/api/v1/keys", get(keys::handle_list_keys))
        .route(
            "/api/v1/keys/:provider",
            put(keys::handle_save_key).delete(keys::handle_delete_key),
        )
        .route("/api/v1/keys/test", post(keys::handle_test_key))
        .route(
            "/api/v1/personas/defaults",
            get(personas::handle_persona_defaults),
        )
        // Analysis runs
        .route("/api/v1/analyses", post(analyses::handle_create_analysis))
        .route(
            "/api/v1/analyses/:id",
            get(analyses::handle_get_analysis).delete(analyses::handle_delete_analysis),
        )
        .route(
            "/api/v1/analyses/:id/events",
            get(analyses::handle_analysis_events),
        )
        .route(
            "/api/v1/analyses/:id/personas/:persona_id/retry",
            post(analyses::handle_retry_persona),
        )
        .route(
            "/api/v1/analyses/:id/save",
            post(analyses::handle_save_analysis),
        )
        .route(
            "/api/v1/analyses/:id/export",
            get(analyses::handle_export_analysis),
        )
        // History
        .route(
            "/api/v1/history",
            get(history::handle_list_history).delete(history::handle_clear_history),
        )
        .route(
            "/api/v1/history/:id",
            get(history::handle_get_history).delete(history::handle_delete_history),
        )
        // Relay
        .route("/api/v1/relay/analyze", post(relay::handle_relay_analyze))
        .with_state(state)
}
