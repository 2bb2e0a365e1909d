//! The journey state machine.
//!
//! One spawned task owns all mutable state and drains a single command
//! queue, so event processing is serialized in FIFO order. Bindings are
//! dispatched as independent tasks and never block the queue. Progress is
//! reported through a channel of tagged [`EngineSignal`]s; outbound page
//! traffic goes through a write-only emit callable, which is how the
//! bridge/engine cycle stays broken.

use crate::guard::{self, GuardContext};
use crate::path::lookup_path;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use wayfarer_api::ApiClient;
use wayfarer_core::{Binding, ErrorCode, Step};
use wayfarer_session::SessionManager;

/// Write-only sink for events addressed to the hosted page.
pub type PageEmit = Arc<dyn Fn(String, Value) + Send + Sync>;

/// Tagged progress signals consumed by the orchestrator.
#[derive(Debug, Clone)]
pub enum EngineSignal {
    /// A step was entered (fires for the start step too).
    StepEntered { step_id: String },
    /// A terminal step was entered; the machine has halted.
    Terminal { step_id: String, step: Step },
    /// A binding's API call failed.
    Error {
        code: ErrorCode,
        recoverable: bool,
        message: String,
    },
}

/// Everything the machine needs at construction.
pub struct EngineParams {
    pub journey_id: String,
    pub steps: HashMap<String, Step>,
    pub start_step: String,
    pub api: Arc<ApiClient>,
    pub session: Arc<SessionManager>,
    /// Steps that write snapshots; `None` snapshots every step.
    pub snapshot_on: Option<Vec<String>>,
    pub emit_to_page: PageEmit,
}

enum Command {
    Event { name: String, payload: Value },
}

/// Non-blocking handle feeding events into the machine's queue.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    /// Enqueue an event. Returns immediately; processing is serialized on
    /// the machine's queue. Events after the terminal step are dropped.
    pub fn handle_event(&self, name: impl Into<String>, payload: Value) {
        let _ = self.tx.send(Command::Event {
            name: name.into(),
            payload,
        });
    }
}

/// Spawn the machine task. The returned receiver yields progress signals;
/// it closes once the machine halts.
pub fn spawn(params: EngineParams) -> (EngineHandle, mpsc::UnboundedReceiver<EngineSignal>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();

    let machine = Machine {
        journey_id: params.journey_id,
        steps: params.steps,
        current: params.start_step.clone(),
        api: params.api,
        session: params.session,
        snapshot_on: params.snapshot_on,
        emit_to_page: params.emit_to_page,
        signals: signal_tx,
        // Timers hold only a weak sender so an abandoned machine can
        // still drain and exit.
        self_tx: tx.downgrade(),
        timer: None,
        halted: false,
    };
    let start = params.start_step;
    tokio::spawn(machine.run(start, rx));

    (EngineHandle { tx }, signal_rx)
}

struct Machine {
    journey_id: String,
    steps: HashMap<String, Step>,
    current: String,
    api: Arc<ApiClient>,
    session: Arc<SessionManager>,
    snapshot_on: Option<Vec<String>>,
    emit_to_page: PageEmit,
    signals: mpsc::UnboundedSender<EngineSignal>,
    self_tx: mpsc::WeakUnboundedSender<Command>,
    timer: Option<JoinHandle<()>>,
    halted: bool,
}

impl Machine {
    async fn run(mut self, start: String, mut rx: mpsc::UnboundedReceiver<Command>) {
        self.enter(&start);

        while !self.halted {
            match rx.recv().await {
                Some(Command::Event { name, payload }) => self.handle_event(&name, payload),
                None => break,
            }
        }

        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Enter a step: cancel the pending timer, announce the entry, write a
    /// snapshot, absorb on terminal, otherwise arm the step timer.
    fn enter(&mut self, step_id: &str) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let Some(step) = self.steps.get(step_id).cloned() else {
            tracing::warn!(step_id, "ignoring entry into unknown step");
            return;
        };
        self.current = step_id.to_string();
        tracing::debug!(journey_id = %self.journey_id, step_id, "entering step");

        (self.emit_to_page)("step_enter".to_string(), json!({ "step": step_id }));
        if self.should_snapshot(step_id) {
            if let Err(error) = self.session.save_snapshot(&self.journey_id, step_id) {
                tracing::warn!(%error, step_id, "snapshot write failed");
            }
        }
        let _ = self.signals.send(EngineSignal::StepEntered {
            step_id: step_id.to_string(),
        });

        if step.is_terminal() {
            let _ = self.signals.send(EngineSignal::Terminal {
                step_id: step_id.to_string(),
                step,
            });
            self.halted = true;
            return;
        }

        if let Some(timeout_ms) = step.timeout_ms {
            let weak = self.self_tx.clone();
            self.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
                if let Some(tx) = weak.upgrade() {
                    let _ = tx.send(Command::Event {
                        name: "timeout".to_string(),
                        payload: json!({}),
                    });
                }
            }));
        }
    }

    fn handle_event(&mut self, name: &str, payload: Value) {
        let Some(step) = self.steps.get(&self.current).cloned() else {
            return;
        };

        // Bindings and the transition evaluate from the same event; the
        // dispatched calls do not block the transition.
        for binding in step.bindings.iter().filter(|b| b.on_event == name) {
            self.dispatch_binding(binding, step.idempotency_key.as_deref(), &payload);
        }

        let Some(transition) = step.on.get(name) else {
            return;
        };

        if let Some(expr) = &transition.guard_expr {
            let ctx = GuardContext::new(
                payload.clone(),
                self.session.resume_token(),
                self.session.idempotency_key(),
            );
            if !guard::eval(expr, &ctx) {
                tracing::debug!(step = %self.current, event = name, "transition dropped by guard");
                return;
            }
        }

        if let Some(emit) = &transition.emit {
            (self.emit_to_page)(emit.clone(), json!({}));
        }

        if let Some(target) = transition.to.clone() {
            let previous = self.current.clone();
            (self.emit_to_page)("step_exit".to_string(), json!({ "step": previous }));
            self.enter(&target);
        }
    }

    fn dispatch_binding(&self, binding: &Binding, step_key: Option<&str>, payload: &Value) {
        let body = binding
            .call
            .args_from
            .as_deref()
            .and_then(|path| lookup_path(payload, path))
            .cloned();

        let api = self.api.clone();
        let emit = self.emit_to_page.clone();
        let signals = self.signals.clone();
        let session = self.session.clone();
        let journey_id = self.journey_id.clone();
        let step_id = self.current.clone();
        let snapshot = self.should_snapshot(&self.current);
        let binding = binding.clone();
        let idempotency_key = step_key.map(str::to_string);

        tokio::spawn(async move {
            let result = api
                .call(
                    &binding.call.operation_id,
                    body.as_ref(),
                    &binding.call.headers,
                    idempotency_key.as_deref(),
                )
                .await;

            match result {
                Ok(response) => {
                    tracing::debug!(
                        operation_id = %binding.call.operation_id,
                        status = response.status,
                        "binding call succeeded"
                    );
                    if let Some(event) = &binding.on_success_emit {
                        emit(event.clone(), json!({ "status": response.status }));
                    }
                    if snapshot {
                        if let Err(error) = session.save_snapshot(&journey_id, &step_id) {
                            tracing::warn!(%error, "snapshot write failed after binding success");
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        operation_id = %binding.call.operation_id,
                        %error,
                        "binding call failed"
                    );
                    if let Some(event) = &binding.on_error_emit {
                        emit(event.clone(), json!({ "error": error.to_string() }));
                    }
                    let code = error.mapped_code();
                    let _ = signals.send(EngineSignal::Error {
                        code,
                        recoverable: code.recoverable(),
                        message: error.to_string(),
                    });
                }
            }
        });
    }

    fn should_snapshot(&self, step_id: &str) -> bool {
        self.snapshot_on
            .as_ref()
            .map_or(true, |steps| steps.iter().any(|s| s == step_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::time::timeout;
    use wayfarer_api::{OpenApiResolver, ScriptedTransport};
    use wayfarer_session::{MemorySnapshotStore, SessionManager};

    const TICK: Duration = Duration::from_millis(500);

    fn steps(document: Value) -> HashMap<String, Step> {
        serde_json::from_value(document).unwrap()
    }

    fn api(transport: Arc<ScriptedTransport>) -> Arc<ApiClient> {
        let resolver = Arc::new(
            OpenApiResolver::from_json(&json!({
                "paths": { "/widgets": { "post": { "operationId": "createWidget" } } }
            }))
            .unwrap(),
        );
        Arc::new(ApiClient::new(
            transport,
            resolver,
            "https://api.example.com",
            HashMap::new(),
            false,
        ))
    }

    fn session() -> Arc<SessionManager> {
        let session = SessionManager::new(Arc::new(MemorySnapshotStore::new()));
        session.start_session("ctx", None);
        Arc::new(session)
    }

    struct Harness {
        handle: EngineHandle,
        signals: mpsc::UnboundedReceiver<EngineSignal>,
        page: mpsc::UnboundedReceiver<(String, Value)>,
        session: Arc<SessionManager>,
        transport: Arc<ScriptedTransport>,
    }

    fn start(document: Value, start_step: &str) -> Harness {
        let transport = Arc::new(ScriptedTransport::new());
        let session = session();
        let (page_tx, page_rx) = mpsc::unbounded_channel();
        let emit: PageEmit = Arc::new(move |name, payload| {
            let _ = page_tx.send((name, payload));
        });

        let (handle, signals) = spawn(EngineParams {
            journey_id: "journey-1".to_string(),
            steps: steps(document),
            start_step: start_step.to_string(),
            api: api(transport.clone()),
            session: session.clone(),
            snapshot_on: None,
            emit_to_page: emit,
        });

        Harness {
            handle,
            signals,
            page: page_rx,
            session,
            transport,
        }
    }

    async fn next_signal(harness: &mut Harness) -> Option<EngineSignal> {
        timeout(TICK, harness.signals.recv()).await.ok().flatten()
    }

    async fn expect_entered(harness: &mut Harness, step: &str) {
        match next_signal(harness).await {
            Some(EngineSignal::StepEntered { step_id }) if step_id == step => {}
            other => panic!("expected StepEntered({step}), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn enters_the_start_step_and_announces_it() {
        let mut harness = start(
            json!({ "a": { "type": "web" } }),
            "a",
        );
        expect_entered(&mut harness, "a").await;

        let (name, payload) = harness.page.recv().await.unwrap();
        assert_eq!(name, "step_enter");
        assert_eq!(payload, json!({ "step": "a" }));
        assert_eq!(harness.session.step_pointer().as_deref(), Some("a"));
    }

    // A guard blocks the transition until the payload satisfies it.
    #[tokio::test]
    async fn guard_blocks_then_allows() {
        let mut harness = start(
            json!({
                "g": { "type": "web", "on": { "go": { "to": "dest", "guardExpr": "payload.value == 2" } } },
                "dest": { "type": "web" }
            }),
            "g",
        );
        expect_entered(&mut harness, "g").await;

        harness.handle.handle_event("go", json!({ "value": 1 }));
        harness.handle.handle_event("go", json!({ "value": 2 }));

        // The first event is dropped silently; only the second moves us.
        expect_entered(&mut harness, "dest").await;
        assert_eq!(harness.session.step_pointer().as_deref(), Some("dest"));
    }

    // timeoutMs synthesizes a "timeout" event after step entry.
    #[tokio::test(start_paused = true)]
    async fn timeout_fires_a_synthetic_event() {
        let mut harness = start(
            json!({
                "step2": { "type": "web", "timeoutMs": 50, "on": { "timeout": { "to": "step3" } } },
                "step3": { "type": "web" }
            }),
            "step2",
        );
        expect_entered(&mut harness, "step2").await;
        expect_entered(&mut harness, "step3").await;
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_a_step_cancels_its_timer() {
        let mut harness = start(
            json!({
                "a": { "type": "web", "timeoutMs": 5000, "on": { "go": { "to": "b" }, "timeout": { "to": "c" } } },
                "b": { "type": "web" },
                "c": { "type": "web" }
            }),
            "a",
        );
        expect_entered(&mut harness, "a").await;

        harness.handle.handle_event("go", json!({}));
        expect_entered(&mut harness, "b").await;

        // The armed 5s timer must not fire a late transition to "c".
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(timeout(Duration::from_millis(10), harness.signals.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn terminal_step_halts_the_machine() {
        let mut harness = start(
            json!({
                "a": { "type": "web", "on": { "finish": { "to": "end" } } },
                "end": { "type": "terminal", "result": { "status": "ok" } }
            }),
            "a",
        );
        expect_entered(&mut harness, "a").await;

        harness.handle.handle_event("finish", json!({}));
        expect_entered(&mut harness, "end").await;

        match next_signal(&mut harness).await {
            Some(EngineSignal::Terminal { step_id, step }) => {
                assert_eq!(step_id, "end");
                assert_eq!(step.result, Some(json!({ "status": "ok" })));
            }
            other => panic!("expected Terminal, got {other:?}"),
        }

        // The machine halted: later events produce nothing and the signal
        // channel closes.
        harness.handle.handle_event("finish", json!({}));
        assert!(next_signal(&mut harness).await.is_none());
    }

    #[tokio::test]
    async fn transition_emit_reaches_the_page() {
        let mut harness = start(
            json!({
                "a": { "type": "web", "on": { "ping": { "emit": "pong" } } }
            }),
            "a",
        );
        expect_entered(&mut harness, "a").await;
        let _ = harness.page.recv().await; // step_enter

        harness.handle.handle_event("ping", json!({}));
        let (name, payload) = harness.page.recv().await.unwrap();
        assert_eq!(name, "pong");
        assert_eq!(payload, json!({}));
        // No step change.
        assert_eq!(harness.session.step_pointer().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn step_exit_precedes_the_next_step_enter() {
        let mut harness = start(
            json!({
                "a": { "type": "web", "on": { "go": { "to": "b" } } },
                "b": { "type": "web" }
            }),
            "a",
        );
        expect_entered(&mut harness, "a").await;
        harness.handle.handle_event("go", json!({}));
        expect_entered(&mut harness, "b").await;

        let mut names = Vec::new();
        while let Ok(Some((name, _))) = timeout(TICK, harness.page.recv()).await {
            names.push(name);
            if names.len() == 3 {
                break;
            }
        }
        assert_eq!(names, ["step_enter", "step_exit", "step_enter"]);
    }

    #[tokio::test]
    async fn binding_success_emits_status_and_snapshots() {
        let mut harness = start(
            json!({
                "a": {
                    "type": "web",
                    "idempotencyKey": "step-key",
                    "bindings": [{
                        "onEvent": "submit",
                        "call": { "operationId": "createWidget", "argsFrom": "form.body" },
                        "onSuccessEmit": "created"
                    }]
                }
            }),
            "a",
        );
        harness.transport.push_response(200, &[], b"{}");
        expect_entered(&mut harness, "a").await;
        let _ = harness.page.recv().await; // step_enter

        harness
            .handle
            .handle_event("submit", json!({ "form": { "body": { "amount": 5 } } }));

        let (name, payload) = timeout(TICK, harness.page.recv()).await.unwrap().unwrap();
        assert_eq!(name, "created");
        assert_eq!(payload, json!({ "status": 200 }));

        let requests = harness.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header("X-Idempotency-Key"), Some("step-key"));
        assert_eq!(
            requests[0].body.as_deref(),
            Some(br#"{"amount":5}"# as &[u8])
        );
    }

    #[tokio::test]
    async fn binding_failure_emits_error_and_signals() {
        let mut harness = start(
            json!({
                "a": {
                    "type": "web",
                    "bindings": [{
                        "onEvent": "submit",
                        "call": { "operationId": "createWidget" },
                        "onErrorEmit": "failed"
                    }]
                }
            }),
            "a",
        );
        harness.transport.push_response(429, &[("Retry-After", "0")], b"");
        harness.transport.push_response(429, &[("Retry-After", "0")], b"");
        harness.transport.push_response(429, &[("Retry-After", "0")], b"");
        expect_entered(&mut harness, "a").await;
        let _ = harness.page.recv().await; // step_enter

        harness.handle.handle_event("submit", json!({}));

        let (name, payload) = timeout(TICK, harness.page.recv()).await.unwrap().unwrap();
        assert_eq!(name, "failed");
        assert!(payload["error"].as_str().unwrap().contains("Retry limit"));

        match next_signal(&mut harness).await {
            Some(EngineSignal::Error {
                code, recoverable, ..
            }) => {
                assert_eq!(code, ErrorCode::RateLimited);
                assert!(recoverable);
            }
            other => panic!("expected Error signal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_args_from_path_sends_no_body() {
        let mut harness = start(
            json!({
                "a": {
                    "type": "web",
                    "bindings": [{
                        "onEvent": "submit",
                        "call": { "operationId": "createWidget", "argsFrom": "not.there" }
                    }]
                }
            }),
            "a",
        );
        harness.transport.push_response(200, &[], b"{}");
        expect_entered(&mut harness, "a").await;

        harness.handle.handle_event("submit", json!({ "other": 1 }));

        // Wait for the dispatched call to land.
        let deadline = tokio::time::Instant::now() + TICK;
        while harness.transport.requests().is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "binding never ran");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(harness.transport.requests()[0].body.is_none());
    }

    #[tokio::test]
    async fn events_with_no_binding_or_transition_are_ignored() {
        let mut harness = start(json!({ "a": { "type": "web" } }), "a");
        expect_entered(&mut harness, "a").await;

        harness.handle.handle_event("unknown", json!({}));
        assert!(next_signal(&mut harness).await.is_none());
        assert_eq!(harness.session.step_pointer().as_deref(), Some("a"));
    }
}
