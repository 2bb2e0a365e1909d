//! The journey orchestrator.

use crate::collaborators::{
    EventSink, NullEventSink, ScriptPageSink, SignInProvider, TracingEventSink, WebViewHost,
};
use crate::events::EventEmitter;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use wayfarer_api::{ApiClient, HttpTransport, OpenApiResolver, ReqwestTransport};
use wayfarer_bridge::{Bridge, BridgeParams, PluginRegistry};
use wayfarer_core::{
    ApiClientError, ErrorCode, JourneyResult, ManifestError, RuntimeConfig, Step, StepType,
    WayfarerResult,
};
use wayfarer_engine::{EngineHandle, EngineParams, EngineSignal, PageEmit};
use wayfarer_manifest::ManifestLoader;
use wayfarer_session::{KeyringSnapshotStore, SessionManager};
use wayfarer_signing::{EnvelopeSigner, TrustStore};

#[derive(Default)]
struct CancelFlag {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.flag.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

/// The runtime a partner application constructs once and drives
/// journeys through.
///
/// All services are explicitly constructed and passed through
/// composition; there is no global mutable state in the core.
pub struct JourneyRuntime {
    config: RuntimeConfig,
    trust: Arc<TrustStore>,
    session: Arc<SessionManager>,
    plugins: Arc<PluginRegistry>,
    host: Arc<dyn WebViewHost>,
    sign_in: Option<Arc<dyn SignInProvider>>,
    emitter: Arc<EventEmitter>,
    signer: Option<Arc<EnvelopeSigner>>,
    transport: Arc<dyn HttpTransport>,
    cancel: CancelFlag,
}

impl JourneyRuntime {
    /// Construct a runtime with production defaults: platform secure
    /// store, reqwest transport, an ephemeral envelope signer and a
    /// telemetry sink honoring the caller's opt-in.
    pub fn new(config: RuntimeConfig, host: Arc<dyn WebViewHost>) -> WayfarerResult<Self> {
        config.validate()?;

        let sink: Arc<dyn EventSink> = if config.telemetry_opt_in {
            Arc::new(TracingEventSink)
        } else {
            Arc::new(NullEventSink)
        };
        let transport = ReqwestTransport::new().map_err(|e| {
            wayfarer_core::WayfarerError::Api(ApiClientError::Transport {
                reason: e.to_string(),
            })
        })?;
        let signer = Arc::new(EnvelopeSigner::ephemeral()?);

        Ok(Self {
            config,
            trust: Arc::new(TrustStore::new()),
            session: Arc::new(SessionManager::new(Arc::new(KeyringSnapshotStore::new()))),
            plugins: Arc::new(PluginRegistry::new()),
            host,
            sign_in: None,
            emitter: Arc::new(EventEmitter::new(sink)),
            signer: Some(signer),
            transport: Arc::new(transport),
            cancel: CancelFlag::default(),
        })
    }

    pub fn with_trust_store(mut self, trust: Arc<TrustStore>) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_session(mut self, session: Arc<SessionManager>) -> Self {
        self.session = session;
        self
    }

    pub fn with_plugins(mut self, plugins: Arc<PluginRegistry>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_sign_in(mut self, provider: Arc<dyn SignInProvider>) -> Self {
        self.sign_in = Some(provider);
        self
    }

    pub fn with_event_sink(self, sink: Arc<dyn EventSink>) -> Self {
        self.emitter.set_sink(sink);
        self
    }

    pub fn with_signer(mut self, signer: Option<Arc<EnvelopeSigner>>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    /// Cancel the running journey. Terminal delivery wins if it is
    /// already in flight; otherwise the journey resolves to `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run one journey to its single result.
    pub async fn start_journey(&self, journey_id: &str, context_token: &str) -> JourneyResult {
        self.session.start_session(context_token, None);
        let correlation = self.session.correlation_id();
        self.emitter
            .emit(correlation, "journey_start", json!({ "journeyId": journey_id }));

        let result = self.run_journey(journey_id, context_token).await;

        let status = match &result {
            JourneyResult::Completed { .. } => "completed",
            JourneyResult::Pending { .. } => "pending",
            JourneyResult::Cancelled => "cancelled",
            JourneyResult::Failed { .. } => "failed",
        };
        self.emitter.emit(
            correlation,
            "journey_end",
            json!({ "journeyId": journey_id, "status": status }),
        );
        result
    }

    async fn run_journey(&self, journey_id: &str, context_token: &str) -> JourneyResult {
        let correlation = self.session.correlation_id();

        // Manifest: fetch, verify, validate. Failures here are fatal.
        let loader = match ManifestLoader::new(self.config.clone(), self.trust.clone()) {
            Ok(loader) => loader,
            Err(error) => return JourneyResult::failed(ErrorCode::Unknown, error.to_string()),
        };
        let manifest = match loader.load(journey_id, context_token).await {
            Ok(manifest) => manifest,
            Err(error @ ManifestError::ValidationFailed { .. }) => {
                return JourneyResult::failed(ErrorCode::ValidationFail, error.to_string());
            }
            Err(error) => return JourneyResult::failed(ErrorCode::Unknown, error.to_string()),
        };
        self.emitter.emit(
            correlation,
            "manifest_loaded",
            json!({ "journeyId": manifest.journey_id, "startStep": manifest.start_step }),
        );

        // OpenAPI bundle and client.
        let bundle = match loader.load_openapi_bundle(&manifest, context_token).await {
            Ok(bundle) => bundle,
            Err(error) => return JourneyResult::failed(ErrorCode::Unknown, error.to_string()),
        };
        let resolver = match OpenApiResolver::from_json(&bundle) {
            Ok(resolver) => Arc::new(resolver),
            Err(error) => return JourneyResult::failed(ErrorCode::ValidationFail, error.to_string()),
        };
        if let Err(error) = resolver.validate_operation_ids(&manifest) {
            return JourneyResult::failed(ErrorCode::ValidationFail, error.to_string());
        }
        let Some(base_url) = resolver.server_url().map(str::to_string) else {
            return JourneyResult::failed(
                ErrorCode::ValidationFail,
                "OpenAPI bundle declares no server URL",
            );
        };
        let api = Arc::new(ApiClient::new(
            self.transport.clone(),
            resolver,
            base_url,
            manifest.headers.clone(),
            manifest.security.pinning,
        ));

        // Interactive sign-in, only when the manifest demands a handshake.
        if manifest.security.require_handshake {
            if let Some(provider) = &self.sign_in {
                let auth_url = manifest
                    .step(&manifest.start_step)
                    .and_then(|step| step.url.clone())
                    .unwrap_or_default();
                match provider
                    .sign_in_if_needed(&auth_url, &self.config.redirect_scheme)
                    .await
                {
                    Ok(callback) => tracing::debug!(%callback, "sign-in completed"),
                    Err(error) => {
                        return JourneyResult::failed(ErrorCode::AuthExpired, error.to_string());
                    }
                }
            }
        }

        // Engine. Its page-bound traffic drains through a channel into the
        // bridge, so neither side owns the other.
        let (page_tx, mut page_rx) = mpsc::unbounded_channel::<(String, Value)>();
        let emit_to_page: PageEmit = Arc::new(move |name, payload| {
            let _ = page_tx.send((name, payload));
        });
        let (engine, mut signals) = wayfarer_engine::spawn(EngineParams {
            journey_id: manifest.journey_id.clone(),
            steps: manifest.steps.clone(),
            start_step: manifest.start_step.clone(),
            api: api.clone(),
            session: self.session.clone(),
            snapshot_on: manifest
                .resume_policy
                .as_ref()
                .map(|policy| policy.snapshot_on.clone()),
            emit_to_page,
        });

        // Bridge. A blocked handshake is fatal and reported through its
        // own channel.
        let (blocked_tx, mut blocked_rx) = mpsc::unbounded_channel::<String>();
        let allow_file_origins = self.config.feature_flags.allow_file_origins;
        let initial_methods = manifest
            .step(&manifest.start_step)
            .map(|step| step.bridge_allow.clone())
            .unwrap_or_default();
        let bridge = Arc::new(Bridge::new(BridgeParams {
            allowed_origins: manifest.security.allowed_origins.clone(),
            allow_file_origins,
            allowed_methods: initial_methods,
            signer: self.signer.clone(),
            plugins: self.plugins.clone(),
            sink: Arc::new(ScriptPageSink::new(self.host.clone())),
            forward: {
                let engine = engine.clone();
                Arc::new(move |name, payload| engine.handle_event(name, payload))
            },
            correlation_id: correlation,
            on_origin_blocked: Some(Arc::new(move |origin| {
                let _ = blocked_tx.send(origin);
            })),
        }));

        let pump = tokio::spawn({
            let bridge = bridge.clone();
            async move {
                while let Some((name, payload)) = page_rx.recv().await {
                    bridge.emit_event(&name, payload).await;
                }
            }
        });

        // Pump signals until the single journey outcome is known.
        let result = loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(EngineSignal::StepEntered { step_id }) => {
                        self.emitter
                            .emit(correlation, "step_enter", json!({ "step": step_id }));
                        let Some(step) = manifest.step(&step_id) else { continue };
                        bridge.update_allowed_methods(&step.bridge_allow);
                        match step.step_type {
                            StepType::Web => {
                                if let Some(url) = &step.url {
                                    self.host
                                        .present(
                                            url,
                                            bridge.clone(),
                                            &manifest.security.allowed_origins,
                                            allow_file_origins,
                                        )
                                        .await;
                                }
                            }
                            StepType::Native => self.run_native_step(&engine, step),
                            StepType::Server | StepType::Terminal => {}
                        }
                        if self.config.feature_flags.demo_auto_complete {
                            if let Some(event) = step
                                .params
                                .as_ref()
                                .and_then(|params| params.get("demoEvent"))
                                .and_then(Value::as_str)
                            {
                                engine.handle_event(event, json!({}));
                            }
                        }
                    }
                    Some(EngineSignal::Terminal { step_id, step }) => {
                        self.emitter
                            .emit(correlation, "journey_complete", json!({ "step": step_id }));
                        break JourneyResult::from_terminal_payload(step.result);
                    }
                    Some(EngineSignal::Error { code, recoverable, message }) => {
                        // API errors are reported to the page and to
                        // telemetry; only terminal delivery or a blocked
                        // origin ends the journey.
                        self.emitter.emit(
                            correlation,
                            "journey_error",
                            json!({ "code": code.as_str(), "recoverable": recoverable }),
                        );
                        tracing::warn!(code = %code, recoverable, %message, "journey error");
                    }
                    None => {
                        break JourneyResult::failed(
                            ErrorCode::Unknown,
                            "engine stopped before a terminal step",
                        );
                    }
                },
                origin = blocked_rx.recv() => {
                    let origin = origin.unwrap_or_default();
                    break JourneyResult::failed(
                        ErrorCode::OriginBlocked,
                        format!("origin '{origin}' is not allowed"),
                    );
                }
                _ = self.cancel.cancelled() => break JourneyResult::Cancelled,
            }
        };

        api.cancel();
        pump.abort();
        result
    }

    /// Native steps invoke their plugin with the step params; the outcome
    /// re-enters the machine as a `plugin_success` or `plugin_error`
    /// event, which the manifest routes like any other event.
    fn run_native_step(&self, engine: &EngineHandle, step: &Step) {
        let Some(method) = step.plugin.clone() else {
            tracing::warn!("native step declares no plugin method");
            return;
        };
        let params = step.params.clone().unwrap_or(Value::Null);
        let Some(plugin) = self.plugins.resolve(&method) else {
            engine.handle_event(
                "plugin_error",
                json!({ "error": format!("no plugin handles '{method}'") }),
            );
            return;
        };
        let engine = engine.clone();
        tokio::spawn(async move {
            match plugin.handle(&method, params).await {
                Ok(result) => engine.handle_event("plugin_success", json!({ "result": result })),
                Err(error) => {
                    engine.handle_event("plugin_error", json!({ "error": error.to_string() }))
                }
            }
        });
    }
}
