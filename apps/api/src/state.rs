use std::sync::Arc;

use crate::config::Config;
use crate::history::HistoryStore;
use crate::key_store::LocalKeyStore;
use crate::llm_client::ProviderGateway;
use crate::orchestrator::RunRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Production uses `HttpGateway`; tests swap in a scripted double.
    pub gateway: Arc<dyn ProviderGateway>,
    pub key_store: Arc<LocalKeyStore>,
    pub history: Arc<HistoryStore>,
    pub runs: Arc<RunRegistry>,
}
