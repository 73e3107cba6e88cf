use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::prompts::Phase;
use crate::models::{AnalysisInput, AnalysisResult, HistoryItem, InterviewerResult};
use crate::orchestrator::export::render_markdown;
use crate::orchestrator::{Orchestrator, OrchestratorConfig, RunEvent, SettlementOutcome};
use crate::personas::PersonaRegistry;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateAnalysisRequest {
    #[serde(flatten)]
    pub input: AnalysisInput,
    #[serde(default)]
    pub phase: Phase,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRunView {
    pub run_id: Uuid,
    pub settled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SettlementOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,
    pub results: Vec<InterviewerResult>,
    /// Settled record, or a progressive preview while personas are running.
    pub result: AnalysisResult,
}

impl AnalysisRunView {
    fn of(run: &Orchestrator) -> Self {
        match run.settlement() {
            Some(settlement) => Self {
                run_id: run.run_id(),
                settled: true,
                outcome: Some(settlement.outcome),
                epoch: Some(settlement.epoch),
                results: settlement.result.interviewer_results.clone(),
                result: settlement.result,
            },
            None => {
                let result = run.assemble();
                Self {
                    run_id: run.run_id(),
                    settled: false,
                    outcome: None,
                    epoch: None,
                    results: result.interviewer_results.clone(),
                    result,
                }
            }
        }
    }
}

fn find_run(state: &AppState, id: Uuid) -> Result<std::sync::Arc<Orchestrator>, AppError> {
    state
        .runs
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("Analysis run {id} not found")))
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/analyses
///
/// Validates the persona list and fans out one stream per persona.
pub async fn handle_create_analysis(
    State(state): State<AppState>,
    Json(req): Json<CreateAnalysisRequest>,
) -> Result<(StatusCode, Json<AnalysisRunView>), AppError> {
    PersonaRegistry::validate(&req.input.personas)?;

    let config = OrchestratorConfig {
        stream_timeout: state.config.stream_timeout,
        phase: req.phase,
    };
    let run = Orchestrator::new(
        req.input,
        state.gateway.clone(),
        state.key_store.clone(),
        config,
    );
    let run = state.runs.insert(run);
    run.start();

    info!(run_id = %run.run_id(), "Analysis run created");
    Ok((StatusCode::CREATED, Json(AnalysisRunView::of(&run))))
}

/// GET /api/v1/analyses/:id
pub async fn handle_get_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisRunView>, AppError> {
    let run = find_run(&state, id)?;
    Ok(Json(AnalysisRunView::of(&run)))
}

/// GET /api/v1/analyses/:id/events
///
/// Server-sent events: a `snapshot` first, then every `RunEvent` as it happens.
pub async fn handle_analysis_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, AppError> {
    let run = find_run(&state, id)?;

    // Subscribe before the snapshot so nothing falls in between.
    let rx = run.subscribe();
    let snapshot = sse_event("snapshot", &AnalysisRunView::of(&run));

    let events = BroadcastStream::new(rx).filter_map(move |item| async move {
        match item {
            Ok(event) => Some(sse_event(event_name(&event), &event)),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(run_id = %id, skipped, "Event subscriber lagged; dropping old events");
                None
            }
        }
    });

    let stream = stream::once(async move { snapshot })
        .chain(events)
        .map(Ok::<_, Infallible>);

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(10))
            .text("keepalive"),
    ))
}

fn event_name(event: &RunEvent) -> &'static str {
    match event {
        RunEvent::Status { .. } => "status",
        RunEvent::Fragment { .. } => "fragment",
        RunEvent::Settled { .. } => "settled",
    }
}

fn sse_event<T: Serialize>(name: &'static str, payload: &T) -> SseEvent {
    let data = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    SseEvent::default().event(name).data(data)
}

/// POST /api/v1/analyses/:id/personas/:persona_id/retry
pub async fn handle_retry_persona(
    State(state): State<AppState>,
    Path((id, persona_id)): Path<(Uuid, String)>,
) -> Result<(StatusCode, Json<AnalysisRunView>), AppError> {
    let run = find_run(&state, id)?;
    run.retry(&persona_id)?;
    Ok((StatusCode::ACCEPTED, Json(AnalysisRunView::of(&run))))
}

/// POST /api/v1/analyses/:id/save
///
/// Hands the settled record to the history sink. Runs with no completed
/// persona are refused.
pub async fn handle_save_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<HistoryItem>), AppError> {
    let run = find_run(&state, id)?;
    let settlement = run
        .settlement()
        .ok_or_else(|| AppError::Conflict(format!("Analysis run {id} has not settled yet")))?;
    if !settlement.outcome.is_success() {
        return Err(AppError::UnprocessableEntity(
            "No interviewer finished successfully; nothing to save".to_string(),
        ));
    }

    let item = HistoryItem::from_result(settlement.result);
    let evicted = state.history.save(item.clone()).await?;
    info!(run_id = %id, history_id = %item.id, evicted, "Analysis saved to history");
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /api/v1/analyses/:id/export
pub async fn handle_export_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let run = find_run(&state, id)?;
    let result = match run.settlement() {
        Some(settlement) => settlement.result,
        None => run.assemble(),
    };
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        render_markdown(&result),
    ))
}

/// DELETE /api/v1/analyses/:id
pub async fn handle_delete_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.runs.remove(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Analysis run {id} not found")))
    }
}
