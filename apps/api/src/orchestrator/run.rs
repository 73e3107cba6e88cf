//! Stream Orchestrator: one streaming task per persona, fanned out at once.
//!
//! The orchestrator exclusively owns the run's results. Tasks never write to
//! a result directly; they report back through [`Inner`], which re-validates
//! the slot's attempt number and cancellation token under the lock before
//! every mutation. A task that was cancelled or superseded by a retry can
//! therefore never touch the entry again.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::key_store::KeyStore;
use crate::llm_client::prompts::{render_prompt, Phase};
use crate::llm_client::{GatewayError, GatewayRequest, ProviderGateway};
use crate::models::{
    AnalysisInput, AnalysisResult, InterviewerResult, Persona, Provider, ResultError,
    ResultStatus,
};
use crate::orchestrator::assembler;
use crate::orchestrator::parser::parse_feedback;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Wall-clock ceiling for one persona request, first byte to last.
    pub stream_timeout: Duration,
    pub phase: Phase,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stream_timeout: Duration::from_secs(30),
            phase: Phase::Full,
        }
    }
}

/// Aggregate result reported once every persona is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// At least one persona produced feedback.
    Success,
    /// Every persona failed.
    AllFailed,
    /// Nothing was configured to run. Not a success.
    NoPersonas,
}

impl SettlementOutcome {
    pub fn from_results(results: &[InterviewerResult]) -> Self {
        if results.is_empty() {
            SettlementOutcome::NoPersonas
        } else if results.iter().any(|r| r.status == ResultStatus::Done) {
            SettlementOutcome::Success
        } else {
            SettlementOutcome::AllFailed
        }
    }

    pub fn is_success(self) -> bool {
        self == SettlementOutcome::Success
    }
}

/// The one-shot "all settled" signal. `epoch` counts settlements of this run;
/// a retry re-opens the run and the next settlement carries `epoch + 1`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub epoch: u64,
    pub outcome: SettlementOutcome,
    pub result: AnalysisResult,
}

/// Progress notifications for observers (UI streams, tests).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RunEvent {
    Status {
        persona_id: String,
        status: ResultStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ResultError>,
    },
    Fragment {
        persona_id: String,
        text: String,
    },
    Settled {
        epoch: u64,
        outcome: SettlementOutcome,
    },
}

/// Caller errors from [`Orchestrator::retry`]. Reported synchronously.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetryError {
    #[error("unknown persona '{0}'")]
    UnknownPersona(String),

    #[error("persona '{persona_id}' is {status:?}; only finished personas can be retried")]
    NotTerminal {
        persona_id: String,
        status: ResultStatus,
    },

    #[error("no API key stored for {0}")]
    MissingCredential(Provider),

    #[error("the analysis run has been shut down")]
    ShutDown,
}

struct Slot {
    persona: Persona,
    result: InterviewerResult,
    /// Bumped on every launch; a task only writes while its attempt is current.
    attempt: u64,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl Slot {
    fn accepts(&self, attempt: u64) -> bool {
        self.attempt == attempt
            && self.result.status == ResultStatus::Streaming
            && self.cancel.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

#[derive(Default)]
struct RunState {
    slots: IndexMap<String, Slot>,
    started: bool,
    settlement_fired: bool,
    epoch: u64,
}

impl RunState {
    fn all_terminal(&self) -> bool {
        self.slots.values().all(|s| s.result.status.is_terminal())
    }

    fn results(&self) -> Vec<InterviewerResult> {
        self.slots.values().map(|s| s.result.clone()).collect()
    }
}

struct Inner {
    run_id: Uuid,
    input: AnalysisInput,
    gateway: Arc<dyn ProviderGateway>,
    key_store: Arc<dyn KeyStore>,
    config: OrchestratorConfig,
    state: Mutex<RunState>,
    events: broadcast::Sender<RunEvent>,
    settled: watch::Sender<Option<Settlement>>,
    /// Parent of every persona token; cancelling it tears the whole group down.
    group: CancellationToken,
}

/// Owns one analysis run. Dropping it cancels every outstanding task.
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        input: AnalysisInput,
        gateway: Arc<dyn ProviderGateway>,
        key_store: Arc<dyn KeyStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (settled, _) = watch::channel(None);

        Self {
            inner: Arc::new(Inner {
                run_id: Uuid::new_v4(),
                input,
                gateway,
                key_store,
                config,
                state: Mutex::new(RunState::default()),
                events,
                settled,
                group: CancellationToken::new(),
            }),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    pub fn input(&self) -> &AnalysisInput {
        &self.inner.input
    }

    /// Subscribe before [`start`](Self::start) to observe every transition.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.inner.events.subscribe()
    }

    /// Initialises every persona to `Pending`, then launches all of them
    /// concurrently. Calling it again is a no-op.
    pub fn start(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.started {
            warn!(run_id = %inner.run_id, "Run already started");
            return;
        }
        state.started = true;

        for persona in &inner.input.personas {
            if state.slots.contains_key(&persona.id) {
                warn!(run_id = %inner.run_id, persona_id = %persona.id, "Duplicate persona skipped");
                continue;
            }
            let result = InterviewerResult::pending(persona);
            inner.emit_status(&result);
            state.slots.insert(
                persona.id.clone(),
                Slot {
                    persona: persona.clone(),
                    result,
                    attempt: 0,
                    cancel: None,
                    task: None,
                },
            );
        }

        info!(
            run_id = %inner.run_id,
            personas = state.slots.len(),
            "Starting analysis run"
        );

        let ids: Vec<String> = state.slots.keys().cloned().collect();
        for persona_id in ids {
            Inner::launch(inner, &mut state, &persona_id);
        }

        inner.check_settlement(&mut state);
    }

    /// Re-runs one finished persona. Every other entry is left untouched.
    pub fn retry(&self, persona_id: &str) -> Result<(), RetryError> {
        let inner = &self.inner;
        if inner.group.is_cancelled() {
            return Err(RetryError::ShutDown);
        }

        let mut state = inner.state.lock();
        let slot = state
            .slots
            .get_mut(persona_id)
            .ok_or_else(|| RetryError::UnknownPersona(persona_id.to_string()))?;

        let status = slot.result.status;
        if !status.is_terminal() {
            return Err(RetryError::NotTerminal {
                persona_id: persona_id.to_string(),
                status,
            });
        }
        let provider = slot.persona.provider;
        if inner.key_store.credential_for(provider).is_none() {
            return Err(RetryError::MissingCredential(provider));
        }

        // Terminal status was checked above, so Reset is legal.
        if let Err(e) = slot.result.reset() {
            warn!(error = %e, "Retry reset rejected");
            return Err(RetryError::NotTerminal {
                persona_id: persona_id.to_string(),
                status,
            });
        }
        inner.emit_status(&slot.result);

        if state.settlement_fired {
            state.settlement_fired = false;
            inner.settled.send_replace(None);
        }

        info!(run_id = %inner.run_id, persona_id, "Retrying persona");
        Inner::launch(inner, &mut state, persona_id);
        inner.check_settlement(&mut state);
        Ok(())
    }

    /// Stops consuming one persona's stream. No state transition happens: the
    /// entry stays wherever it was. Returns whether a task was running.
    pub fn cancel(&self, persona_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let Some(slot) = state.slots.get_mut(persona_id) else {
            return false;
        };
        match slot.cancel.take() {
            Some(token) => {
                token.cancel();
                if let Some(task) = slot.task.take() {
                    task.abort();
                }
                debug!(run_id = %self.inner.run_id, persona_id, "Cancelled persona task");
                true
            }
            None => false,
        }
    }

    /// Cancels every outstanding task as one operation.
    pub fn shutdown(&self) {
        self.inner.group.cancel();
        let mut state = self.inner.state.lock();
        for slot in state.slots.values_mut() {
            slot.cancel = None;
            if let Some(task) = slot.task.take() {
                task.abort();
            }
        }
        debug!(run_id = %self.inner.run_id, "Analysis run shut down");
    }

    /// Point-in-time copy of every result, in persona order.
    pub fn snapshot(&self) -> Vec<InterviewerResult> {
        self.inner.state.lock().results()
    }

    /// True once started and every persona is `Done` or `Error`. Vacuously
    /// true for a started run with no personas.
    pub fn is_settled(&self) -> bool {
        let state = self.inner.state.lock();
        state.started && state.all_terminal()
    }

    /// The latest settlement, if the run is currently settled.
    pub fn settlement(&self) -> Option<Settlement> {
        self.inner.settled.borrow().clone()
    }

    /// Waits for the next (or current) settlement.
    pub async fn wait_settled(&self) -> Option<Settlement> {
        let mut rx = self.inner.settled.subscribe();
        let settled = rx.wait_for(|s| s.is_some()).await.ok()?;
        settled.clone()
    }

    /// Progressive preview of the assembled record.
    pub fn assemble(&self) -> AnalysisResult {
        assembler::assemble(&self.inner.input, &self.snapshot())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.inner.group.cancel();
    }
}

impl Inner {
    fn emit(&self, event: RunEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_status(&self, result: &InterviewerResult) {
        self.emit(RunEvent::Status {
            persona_id: result.persona_id.clone(),
            status: result.status,
            error: result.error.clone(),
        });
    }

    /// `Pending` → `Streaming` and spawn the consumer, or straight to `Error`
    /// when no credential is stored for the persona's provider.
    fn launch(this: &Arc<Self>, state: &mut RunState, persona_id: &str) {
        let Some(slot) = state.slots.get_mut(persona_id) else {
            return;
        };

        let Some(credential) = this.key_store.credential_for(slot.persona.provider) else {
            let err = GatewayError::missing_credential(slot.persona.provider);
            if slot.result.fail(&err).is_ok() {
                warn!(run_id = %this.run_id, persona_id, "No credential for persona");
                this.emit_status(&slot.result);
            }
            return;
        };

        if let Err(e) = slot.result.begin() {
            warn!(run_id = %this.run_id, persona_id, error = %e, "Launch rejected");
            return;
        }
        slot.attempt += 1;
        let token = this.group.child_token();
        slot.cancel = Some(token.clone());
        this.emit_status(&slot.result);

        let request = GatewayRequest {
            provider: slot.persona.provider,
            model: slot.persona.model.clone(),
            credential: credential.key,
            prompt: render_prompt(&this.input, &slot.persona, this.config.phase),
            max_output_tokens: None,
        };

        debug!(
            run_id = %this.run_id,
            persona_id,
            provider = %slot.persona.provider,
            attempt = slot.attempt,
            "Launching persona stream"
        );

        let task = tokio::spawn(Self::run_task(
            Arc::clone(this),
            persona_id.to_string(),
            slot.attempt,
            token,
            request,
        ));
        slot.task = Some(task);
    }

    async fn run_task(
        self: Arc<Self>,
        persona_id: String,
        attempt: u64,
        token: CancellationToken,
        request: GatewayRequest,
    ) {
        let timeout = self.config.stream_timeout;
        let consume = async {
            let mut stream = self.gateway.invoke(request, token.clone()).await?;
            while let Some(fragment) = stream.next().await {
                let fragment = fragment?;
                if !self.apply_fragment(&persona_id, attempt, fragment) {
                    return Err(GatewayError::cancelled());
                }
            }
            Ok::<(), GatewayError>(())
        };

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            res = tokio::time::timeout(timeout, consume) => match res {
                Ok(outcome) => outcome,
                Err(_) => Err(GatewayError::timeout(timeout.as_secs())),
            },
        };

        // A superseded or cancelled attempt is discarded inside `finish`.
        self.finish(&persona_id, attempt, outcome);
    }

    fn apply_fragment(&self, persona_id: &str, attempt: u64, fragment: String) -> bool {
        let mut state = self.state.lock();
        let Some(slot) = state.slots.get_mut(persona_id) else {
            return false;
        };
        if !slot.accepts(attempt) || slot.result.append(&fragment).is_err() {
            return false;
        }
        self.emit(RunEvent::Fragment {
            persona_id: persona_id.to_string(),
            text: fragment,
        });
        true
    }

    fn finish(&self, persona_id: &str, attempt: u64, outcome: Result<(), GatewayError>) {
        let mut state = self.state.lock();
        let Some(slot) = state.slots.get_mut(persona_id) else {
            return;
        };
        if !slot.accepts(attempt) {
            return;
        }

        let transition = match &outcome {
            Ok(()) => {
                let feedback = parse_feedback(&slot.result.stream_text, &self.input.cover_letter_items);
                slot.result.complete(feedback)
            }
            Err(e) => {
                warn!(
                    run_id = %self.run_id,
                    persona_id,
                    provider = %slot.persona.provider,
                    kind = ?e.kind,
                    error = %e.message,
                    "Persona stream failed"
                );
                slot.result.fail(e)
            }
        };
        if let Err(e) = transition {
            warn!(run_id = %self.run_id, persona_id, error = %e, "Finish rejected");
            return;
        }

        slot.cancel = None;
        slot.task = None;
        debug!(
            run_id = %self.run_id,
            persona_id,
            status = ?slot.result.status,
            chars = slot.result.stream_text.len(),
            "Persona finished"
        );
        self.emit_status(&slot.result);
        self.check_settlement(&mut state);
    }

    /// Fires the settlement signal the first time every persona is terminal.
    fn check_settlement(&self, state: &mut RunState) {
        if !state.started || state.settlement_fired || !state.all_terminal() {
            return;
        }
        state.settlement_fired = true;
        state.epoch += 1;

        let results = state.results();
        let outcome = SettlementOutcome::from_results(&results);
        let result = assembler::assemble(&self.input, &results);

        info!(
            run_id = %self.run_id,
            epoch = state.epoch,
            outcome = ?outcome,
            "Analysis run settled"
        );

        self.emit(RunEvent::Settled {
            epoch: state.epoch,
            outcome,
        });
        self.settled.send_replace(Some(Settlement {
            epoch: state.epoch,
            outcome,
            result,
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::stream;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;
    use crate::key_store::LocalKeyStore;
    use crate::llm_client::{ErrorKind, FragmentStream};

    enum Script {
        Fragments(Vec<&'static str>),
        FailBefore(GatewayError),
        FailAfter(Vec<&'static str>, GatewayError),
        Hang,
        Channel(mpsc::UnboundedReceiver<Result<String, GatewayError>>),
    }

    /// Replays queued scripts per provider and counts invocations.
    #[derive(Default)]
    struct ScriptedGateway {
        scripts: parking_lot::Mutex<HashMap<Provider, VecDeque<Script>>>,
        calls: parking_lot::Mutex<HashMap<Provider, usize>>,
        total: AtomicUsize,
    }

    impl ScriptedGateway {
        fn push(&self, provider: Provider, script: Script) {
            self.scripts.lock().entry(provider).or_default().push_back(script);
        }

        fn calls(&self, provider: Provider) -> usize {
            self.calls.lock().get(&provider).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl ProviderGateway for ScriptedGateway {
        async fn invoke(
            &self,
            request: GatewayRequest,
            _cancel: CancellationToken,
        ) -> Result<FragmentStream, GatewayError> {
            self.total.fetch_add(1, Ordering::SeqCst);
            *self.calls.lock().entry(request.provider).or_default() += 1;

            let script = self
                .scripts
                .lock()
                .get_mut(&request.provider)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Script::Fragments(vec!["## 1. Overall assessment\n", "Solid."]));

            let owned = |parts: Vec<&'static str>| {
                parts
                    .into_iter()
                    .map(|p| Ok(p.to_string()))
                    .collect::<Vec<Result<String, GatewayError>>>()
            };

            Ok(match script {
                Script::Fragments(parts) => stream::iter(owned(parts)).boxed(),
                Script::FailBefore(err) => return Err(err),
                Script::FailAfter(parts, err) => {
                    let mut items = owned(parts);
                    items.push(Err(err));
                    stream::iter(items).boxed()
                }
                Script::Hang => stream::pending::<Result<String, GatewayError>>().boxed(),
                Script::Channel(rx) => UnboundedReceiverStream::new(rx).boxed(),
            })
        }
    }

    fn persona(id: &str, provider: Provider) -> Persona {
        Persona {
            id: id.to_string(),
            name: format!("Interviewer {id}"),
            role: String::new(),
            description: String::new(),
            provider,
            model: provider.default_model().to_string(),
        }
    }

    async fn keys(providers: &[Provider]) -> Arc<LocalKeyStore> {
        let store = LocalKeyStore::ephemeral();
        for p in providers {
            store.save(*p, "test-key-123456", None).await.unwrap();
        }
        Arc::new(store)
    }

    fn orchestrator(
        personas: Vec<Persona>,
        gateway: &Arc<ScriptedGateway>,
        keys: &Arc<LocalKeyStore>,
    ) -> Orchestrator {
        orchestrator_with(personas, gateway, keys, OrchestratorConfig::default())
    }

    fn orchestrator_with(
        personas: Vec<Persona>,
        gateway: &Arc<ScriptedGateway>,
        keys: &Arc<LocalKeyStore>,
        config: OrchestratorConfig,
    ) -> Orchestrator {
        let input = AnalysisInput {
            personas,
            ..AnalysisInput::default()
        };
        Orchestrator::new(input, gateway.clone(), keys.clone(), config)
    }

    fn upstream(kind: ErrorKind, message: &str) -> GatewayError {
        GatewayError::new(kind, message)
    }

    async fn next_fragment(rx: &mut broadcast::Receiver<RunEvent>) -> String {
        loop {
            if let RunEvent::Fragment { text, .. } = rx.recv().await.unwrap() {
                return text;
            }
        }
    }

    #[tokio::test]
    async fn test_all_personas_stream_concurrently_and_settle() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push(Provider::OpenAi, Script::Fragments(vec!["## 1. Overall assessment\n", "Strong ", "fit."]));
        gateway.push(Provider::Google, Script::Fragments(vec!["## 1. Overall assessment\n", "Good."]));
        let keys = keys(&[Provider::OpenAi, Provider::Google]).await;

        let run = orchestrator(
            vec![persona("a", Provider::OpenAi), persona("b", Provider::Google)],
            &gateway,
            &keys,
        );
        run.start();
        let settlement = run.wait_settled().await.unwrap();

        assert_eq!(settlement.epoch, 1);
        assert_eq!(settlement.outcome, SettlementOutcome::Success);
        assert!(run.is_settled());

        let results = run.snapshot();
        assert_eq!(results[0].persona_id, "a");
        assert_eq!(results[0].status, ResultStatus::Done);
        assert_eq!(results[0].stream_text, "## 1. Overall assessment\nStrong fit.");
        assert_eq!(results[0].summary, "Strong fit.");
        assert_eq!(results[1].stream_text, "## 1. Overall assessment\nGood.");
        assert_eq!(settlement.result.interviewer_results, results);
    }

    #[tokio::test]
    async fn test_partial_failure_is_still_success() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push(Provider::OpenAi, Script::Fragments(vec!["fine"]));
        gateway.push(
            Provider::Anthropic,
            Script::FailBefore(upstream(ErrorKind::Unauthorized, "invalid x-api-key")),
        );
        let keys = keys(&[Provider::OpenAi, Provider::Anthropic]).await;

        let run = orchestrator(
            vec![persona("a", Provider::OpenAi), persona("b", Provider::Anthropic)],
            &gateway,
            &keys,
        );
        run.start();
        let settlement = run.wait_settled().await.unwrap();

        assert!(settlement.outcome.is_success());
        let failed = &run.snapshot()[1];
        assert_eq!(failed.status, ResultStatus::Error);
        assert_eq!(failed.error.as_ref().unwrap().kind, ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_quota_failure_among_three_is_still_success() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push(Provider::OpenAi, Script::Fragments(vec!["## 1. Overall assessment\n", "Hire."]));
        gateway.push(Provider::Anthropic, Script::Fragments(vec!["## 1. Overall assessment\n", "Maybe."]));
        gateway.push(
            Provider::Google,
            Script::FailBefore(upstream(ErrorKind::QuotaExceeded, "quota exhausted")),
        );
        let keys = keys(&[Provider::OpenAi, Provider::Anthropic, Provider::Google]).await;

        let run = orchestrator(
            vec![
                persona("a", Provider::OpenAi),
                persona("b", Provider::Anthropic),
                persona("c", Provider::Google),
            ],
            &gateway,
            &keys,
        );
        run.start();
        let settlement = run.wait_settled().await.unwrap();

        assert_eq!(settlement.outcome, SettlementOutcome::Success);
        let results = run.snapshot();
        assert_eq!(results[0].status, ResultStatus::Done);
        assert_eq!(results[1].status, ResultStatus::Done);
        assert_eq!(results[2].status, ResultStatus::Error);
        assert_eq!(results[2].error.as_ref().unwrap().kind, ErrorKind::QuotaExceeded);
        assert!(results[2].stream_text.is_empty());
    }

    #[tokio::test]
    async fn test_all_failed_outcome_keeps_partial_text() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push(
            Provider::OpenAi,
            Script::FailAfter(vec!["half an ans"], upstream(ErrorKind::NetworkError, "connection reset")),
        );
        gateway.push(
            Provider::Google,
            Script::FailBefore(upstream(ErrorKind::QuotaExceeded, "quota")),
        );
        let keys = keys(&[Provider::OpenAi, Provider::Google]).await;

        let run = orchestrator(
            vec![persona("a", Provider::OpenAi), persona("b", Provider::Google)],
            &gateway,
            &keys,
        );
        run.start();
        let settlement = run.wait_settled().await.unwrap();

        assert_eq!(settlement.outcome, SettlementOutcome::AllFailed);
        let results = run.snapshot();
        assert_eq!(results[0].stream_text, "half an ans");
        assert_eq!(results[0].error.as_ref().unwrap().kind, ErrorKind::NetworkError);
        assert!(settlement.result.exportable_results().next().is_none());
    }

    #[tokio::test]
    async fn test_zero_personas_settle_without_success() {
        let gateway = Arc::new(ScriptedGateway::default());
        let keys = keys(&[]).await;
        let run = orchestrator(vec![], &gateway, &keys);

        assert!(!run.is_settled());
        run.start();

        assert!(run.is_settled());
        let settlement = run.settlement().unwrap();
        assert_eq!(settlement.outcome, SettlementOutcome::NoPersonas);
        assert!(!settlement.outcome.is_success());
        assert_eq!(gateway.total.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_credential_never_streams() {
        let gateway = Arc::new(ScriptedGateway::default());
        let keys = keys(&[Provider::OpenAi]).await;
        let run = orchestrator(
            vec![persona("a", Provider::OpenAi), persona("b", Provider::Google)],
            &gateway,
            &keys,
        );
        let mut rx = run.subscribe();
        run.start();
        run.wait_settled().await.unwrap();

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RunEvent::Status { persona_id, status, .. } = event {
                if persona_id == "b" {
                    statuses.push(status);
                }
            }
        }
        assert_eq!(statuses, vec![ResultStatus::Pending, ResultStatus::Error]);

        let b = &run.snapshot()[1];
        assert_eq!(b.error.as_ref().unwrap().kind, ErrorKind::MissingCredential);
        assert_eq!(gateway.calls(Provider::Google), 0);
    }

    #[tokio::test]
    async fn test_stream_text_only_grows() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (tx, rx) = mpsc::unbounded_channel();
        gateway.push(Provider::OpenAi, Script::Channel(rx));
        let keys = keys(&[Provider::OpenAi]).await;

        let run = orchestrator(vec![persona("a", Provider::OpenAi)], &gateway, &keys);
        let mut events = run.subscribe();
        run.start();
        assert_eq!(run.snapshot()[0].status, ResultStatus::Streaming);

        let mut seen = 0;
        for part in ["Hel", "lo ", "there"] {
            tx.send(Ok(part.to_string())).unwrap();
            assert_eq!(next_fragment(&mut events).await, part);
            let text = run.snapshot()[0].stream_text.clone();
            assert!(text.len() > seen);
            seen = text.len();
        }
        drop(tx);

        let settlement = run.wait_settled().await.unwrap();
        assert_eq!(settlement.result.interviewer_results[0].stream_text, "Hello there");
        assert_eq!(settlement.result.interviewer_results[0].status, ResultStatus::Done);
    }

    #[tokio::test]
    async fn test_retry_touches_only_its_own_entry() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push(
            Provider::OpenAi,
            Script::FailBefore(upstream(ErrorKind::UpstreamError, "overloaded")),
        );
        gateway.push(Provider::OpenAi, Script::Fragments(vec!["second try"]));
        gateway.push(Provider::Google, Script::Fragments(vec!["steady"]));
        let keys = keys(&[Provider::OpenAi, Provider::Google]).await;

        let run = orchestrator(
            vec![persona("a", Provider::OpenAi), persona("b", Provider::Google)],
            &gateway,
            &keys,
        );
        run.start();
        let first = run.wait_settled().await.unwrap();
        assert_eq!(first.epoch, 1);
        let untouched = run.snapshot()[1].clone();

        run.retry("a").unwrap();
        assert_eq!(run.snapshot()[1], untouched);
        assert!(run.settlement().is_none());

        let second = run.wait_settled().await.unwrap();
        assert_eq!(second.epoch, 2);
        assert_eq!(second.outcome, SettlementOutcome::Success);

        let results = run.snapshot();
        assert_eq!(results[0].stream_text, "second try");
        assert!(results[0].error.is_none());
        assert_eq!(results[1], untouched);
        assert_eq!(gateway.calls(Provider::OpenAi), 2);
        assert_eq!(gateway.calls(Provider::Google), 1);
    }

    #[tokio::test]
    async fn test_retry_rejected_while_streaming() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push(Provider::OpenAi, Script::Hang);
        let keys = keys(&[Provider::OpenAi]).await;

        let run = orchestrator(vec![persona("a", Provider::OpenAi)], &gateway, &keys);
        run.start();

        assert_eq!(
            run.retry("a"),
            Err(RetryError::NotTerminal {
                persona_id: "a".into(),
                status: ResultStatus::Streaming,
            })
        );
        assert_eq!(run.retry("zzz"), Err(RetryError::UnknownPersona("zzz".into())));

        // Let the spawned task reach the gateway before counting calls.
        for _ in 0..10 {
            if gateway.calls(Provider::OpenAi) > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(gateway.calls(Provider::OpenAi), 1);
    }

    #[tokio::test]
    async fn test_second_retry_before_finish_is_rejected() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push(Provider::OpenAi, Script::FailBefore(upstream(ErrorKind::UpstreamError, "boom")));
        gateway.push(Provider::OpenAi, Script::Hang);
        let keys = keys(&[Provider::OpenAi]).await;

        let run = orchestrator(vec![persona("a", Provider::OpenAi)], &gateway, &keys);
        run.start();
        run.wait_settled().await.unwrap();

        run.retry("a").unwrap();
        assert!(matches!(run.retry("a"), Err(RetryError::NotTerminal { .. })));
    }

    #[tokio::test]
    async fn test_retry_requires_credential() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push(Provider::OpenAi, Script::FailBefore(upstream(ErrorKind::Unauthorized, "bad key")));
        let keys = keys(&[Provider::OpenAi]).await;

        let run = orchestrator(vec![persona("a", Provider::OpenAi)], &gateway, &keys);
        run.start();
        run.wait_settled().await.unwrap();

        keys.remove(Provider::OpenAi).await.unwrap();
        assert_eq!(run.retry("a"), Err(RetryError::MissingCredential(Provider::OpenAi)));
        assert_eq!(run.snapshot()[0].status, ResultStatus::Error);
        assert!(run.settlement().is_some());
    }

    #[tokio::test]
    async fn test_cancel_stops_mutations_without_transition() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (tx, rx) = mpsc::unbounded_channel();
        gateway.push(Provider::OpenAi, Script::Channel(rx));
        let keys = keys(&[Provider::OpenAi]).await;

        let run = orchestrator(vec![persona("a", Provider::OpenAi)], &gateway, &keys);
        let mut events = run.subscribe();
        run.start();

        tx.send(Ok("first".to_string())).unwrap();
        next_fragment(&mut events).await;

        assert!(run.cancel("a"));
        assert!(!run.cancel("a"));
        let _ = tx.send(Ok(" late".to_string()));
        drop(tx);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let result = &run.snapshot()[0];
        assert_eq!(result.stream_text, "first");
        assert_eq!(result.status, ResultStatus::Streaming);
        assert!(!run.is_settled());
        assert!(run.settlement().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_times_out() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push(Provider::Anthropic, Script::Hang);
        let keys = keys(&[Provider::Anthropic]).await;

        let config = OrchestratorConfig {
            stream_timeout: Duration::from_secs(5),
            ..OrchestratorConfig::default()
        };
        let run = orchestrator_with(vec![persona("a", Provider::Anthropic)], &gateway, &keys, config);
        run.start();
        let settlement = run.wait_settled().await.unwrap();

        assert_eq!(settlement.outcome, SettlementOutcome::AllFailed);
        let error = run.snapshot()[0].error.clone().unwrap();
        assert_eq!(error.kind, ErrorKind::NetworkError);
        assert_eq!(error.message, "request timed out after 5s");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_every_task() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push(Provider::OpenAi, Script::Hang);
        gateway.push(Provider::Google, Script::Hang);
        let keys = keys(&[Provider::OpenAi, Provider::Google]).await;

        let run = orchestrator(
            vec![persona("a", Provider::OpenAi), persona("b", Provider::Google)],
            &gateway,
            &keys,
        );
        run.start();
        tokio::task::yield_now().await;
        run.shutdown();

        assert!(run
            .snapshot()
            .iter()
            .all(|r| r.status == ResultStatus::Streaming));
        assert!(!run.cancel("a"));
        assert_eq!(run.retry("a"), Err(RetryError::ShutDown));
    }

    #[tokio::test]
    async fn test_settlement_fires_once_per_epoch() {
        let gateway = Arc::new(ScriptedGateway::default());
        let keys = keys(&[Provider::OpenAi, Provider::Anthropic, Provider::Google]).await;
        let run = orchestrator(
            vec![
                persona("a", Provider::OpenAi),
                persona("b", Provider::Anthropic),
                persona("c", Provider::Google),
            ],
            &gateway,
            &keys,
        );
        let mut rx = run.subscribe();
        run.start();
        run.wait_settled().await.unwrap();
        run.start();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let mut settled = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, RunEvent::Settled { .. }) {
                settled += 1;
            }
        }
        assert_eq!(settled, 1);
        assert_eq!(gateway.total.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_duplicate_persona_ids_run_once() {
        let gateway = Arc::new(ScriptedGateway::default());
        let keys = keys(&[Provider::OpenAi]).await;
        let run = orchestrator(
            vec![persona("a", Provider::OpenAi), persona("a", Provider::OpenAi)],
            &gateway,
            &keys,
        );
        run.start();
        run.wait_settled().await.unwrap();

        assert_eq!(run.snapshot().len(), 1);
        assert_eq!(gateway.calls(Provider::OpenAi), 1);
    }

    #[test]
    fn test_run_event_wire_shape() {
        let event = RunEvent::Status {
            persona_id: "a".into(),
            status: ResultStatus::Streaming,
            error: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["personaId"], "a");
        assert_eq!(json["status"], "streaming");
        assert!(json.get("error").is_none());
    }
}
