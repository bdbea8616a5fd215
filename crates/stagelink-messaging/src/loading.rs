//! Document loading: open requests, loading-state queries and the settled
//! notification sent once streaming goes quiet.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use stagelink_core::messages::{LoadingState, OpenStagePayload};
use stagelink_core::{InboundMessage, OutboundMessage, SceneEvent};
use tracing::{debug, error, info, instrument, warn};

use crate::context::CoordinatorContext;
use crate::coordinator::Coordinator;
use crate::locator;

/// Sent as the locator in the settle notification when the host opened a
/// document that no client asked for.
pub const REDACTED_URL: &str = "[obfuscated]";

const OUTGOING: &[&str] = &[
    OutboundMessage::OPENED_STAGE_RESULT,
    OutboundMessage::UPDATE_PROGRESS_AMOUNT,
    OutboundMessage::UPDATE_PROGRESS_ACTIVITY,
    OutboundMessage::LOADING_STATE_RESPONSE,
];

const INCOMING: &[&str] = &[
    InboundMessage::OPEN_STAGE_REQUEST,
    InboundMessage::LOADING_STATE_QUERY,
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadPhase {
    #[default]
    Idle,
    /// The host announced a document is opening.
    Opening,
    /// Assets are in; waiting for streaming to settle.
    AssetsLoading,
    Ready,
}

#[derive(Debug, Default)]
struct LoadSession {
    requested_url: String,
    opened_url: String,
    phase: LoadPhase,
    persisted: bool,
    streaming_busy: bool,
    /// Set by the first client request; never cleared.
    armed: bool,
    evaluating: bool,
    /// Bumped on every new cycle so stale settle tasks can tell.
    generation: u64,
}

/// Owns the document-loading half of the protocol.
#[derive(Clone)]
pub struct LoadingCoordinator {
    ctx: CoordinatorContext,
    session: Arc<Mutex<LoadSession>>,
}

impl LoadingCoordinator {
    pub fn new(ctx: CoordinatorContext) -> Self {
        let opened_url = ctx.scene.current_document().unwrap_or_default();
        Self {
            ctx,
            session: Arc::new(Mutex::new(LoadSession {
                opened_url,
                ..LoadSession::default()
            })),
        }
    }

    pub fn phase(&self) -> LoadPhase {
        self.session.lock().phase
    }

    pub fn is_armed(&self) -> bool {
        self.session.lock().armed
    }

    /// Open `url` at startup, after the configured delay.
    ///
    /// Runs without a client, so nothing is armed and no reply is sent.
    pub fn auto_load(&self, url: &str) {
        let loading = &self.ctx.settings.loading;
        let parsed = locator::strip_storage_token(&locator::resolve_tokens(url, &loading.app_root));
        let delay = loading.auto_load_delay_ticks;
        let this = self.clone();
        info!(url = %parsed.url, delay, "scheduling startup load");
        self.ctx.spawn(async move {
            this.ctx.clock.ticks(delay).await;
            this.apply_credentials(&parsed);
            info!(url = %parsed.url, "opening startup document");
            if let Err(e) = this.ctx.scene.open_document(&parsed.url).await {
                error!(url = %parsed.url, error = %e, "startup load failed");
                this.reset();
            }
        });
    }

    /// Hand a stripped storage token to the credential sink.
    fn apply_credentials(&self, parsed: &locator::ParsedLocator) {
        if let Some(creds) = &parsed.credentials {
            info!(host = %creds.host, container = %creds.container, "applying storage token");
            self.ctx
                .credentials
                .set_storage_token(&creds.host, &creds.container, &creds.token);
        }
    }

    #[instrument(skip_all)]
    fn handle_open_request(&self, payload: &OpenStagePayload) {
        self.session.lock().armed = true;
        let Some(raw) = payload.url.as_deref() else {
            error!("open request without a \"url\" field, ignoring");
            return;
        };

        let parsed = locator::strip_storage_token(raw);
        self.apply_credentials(&parsed);
        let resolved = locator::resolve_relative(&parsed.url, &self.ctx.settings.loading.app_root);
        info!(url = %parsed.url, "received request to open stage");
        {
            let mut session = self.session.lock();
            session.requested_url = parsed.url.clone();
            session.evaluating = false;
            session.generation += 1;
        }

        let current = self.ctx.scene.current_document().unwrap_or_default();
        if !resolved.is_empty() && locator::urls_equal(&resolved, &current) {
            info!(url = %parsed.url, "requested stage is already open");
            let _ = self
                .ctx
                .bus
                .dispatch(OutboundMessage::opened_stage(parsed.url, Ok(())));
            self.reset();
            return;
        }

        let this = self.clone();
        self.ctx.spawn(async move { this.open(parsed.url, resolved).await });
    }

    async fn open(&self, requested: String, resolved: String) {
        let result = if resolved.is_empty() {
            info!("opening blank stage");
            self.ctx.scene.new_document().await
        } else {
            info!(url = %resolved, "opening stage");
            self.ctx.scene.open_document(&resolved).await
        };
        match result {
            Ok(()) => {
                let _ = self
                    .ctx
                    .bus
                    .dispatch(OutboundMessage::opened_stage(requested, Ok(())));
            }
            Err(e) => {
                warn!(url = %resolved, error = %e, "failed to open stage");
                let _ = self
                    .ctx
                    .bus
                    .dispatch(OutboundMessage::opened_stage(requested, Err(e.to_string())));
                self.reset();
            }
        }
    }

    fn handle_loading_state_query(&self) {
        let reply = {
            let mut session = self.session.lock();
            session.armed = true;
            let url = if session.requested_url.is_empty() {
                session.opened_url.clone()
            } else {
                session.requested_url.clone()
            };
            let loading_state = if session.phase == LoadPhase::Opening {
                LoadingState::Busy
            } else {
                LoadingState::Idle
            };
            OutboundMessage::LoadingStateResponse { loading_state, url }
        };
        debug!(?reply, "answering loading state query");
        let _ = self.ctx.bus.dispatch(reply);
    }

    fn on_opening(&self, url: Option<&str>) {
        let mut session = self.session.lock();
        session.opened_url = url.unwrap_or_default().to_string();
        session.persisted = !session.opened_url.is_empty();
        session.phase = LoadPhase::Opening;
        session.evaluating = false;
        session.generation += 1;
        debug!(url = %session.opened_url, persisted = session.persisted, "stage opening");
    }

    fn on_assets_loaded(&self) {
        {
            let mut session = self.session.lock();
            if session.phase != LoadPhase::Opening {
                debug!(phase = ?session.phase, "assets loaded outside an open cycle, ignoring");
                return;
            }
            session.phase = LoadPhase::AssetsLoading;
        }
        let this = self.clone();
        self.ctx.spawn(async move { this.evaluate_load_status().await });
    }

    fn on_streaming_status(&self, busy: bool) {
        self.session.lock().streaming_busy = busy;
        if busy {
            debug!("streaming busy");
        }
    }

    fn forward_progress(&self, message: OutboundMessage) {
        if !self.ctx.settings.loading.forward_progress {
            return;
        }
        let forward = {
            let session = self.session.lock();
            session.persisted && session.armed
        };
        if forward {
            let _ = self.ctx.bus.dispatch(message);
        }
    }

    /// Wait for streaming to go quiet, debounce, then tell the client the
    /// stage is ready. Only one evaluation runs at a time.
    async fn evaluate_load_status(&self) {
        let generation = {
            let mut session = self.session.lock();
            if !session.persisted {
                debug!("blank stage loaded, no settle notification");
                return;
            }
            if session.evaluating {
                debug!("load status already being evaluated");
                return;
            }
            session.evaluating = true;
            session.generation
        };

        let timeout = self.ctx.settings.loading.settle_timeout_ticks;
        let mut waited: u64 = 0;
        loop {
            {
                let mut session = self.session.lock();
                if session.generation != generation {
                    debug!("load cycle superseded, abandoning evaluation");
                    return;
                }
                if !session.streaming_busy && session.phase == LoadPhase::AssetsLoading {
                    session.phase = LoadPhase::Ready;
                    break;
                }
            }
            if timeout.is_some_and(|limit| waited >= limit) {
                self.settle_timed_out(generation, waited);
                return;
            }
            self.ctx.clock.next_tick().await;
            waited += 1;
        }

        self.ctx.clock.ticks(self.ctx.settings.loading.settle_ticks).await;

        let url = {
            let mut session = self.session.lock();
            if session.generation != generation {
                debug!("load cycle superseded during debounce");
                return;
            }
            session.evaluating = false;
            if !session.armed {
                debug!("no client has spoken yet, not reporting load");
                return;
            }
            if session.requested_url.is_empty() {
                REDACTED_URL.to_string()
            } else {
                session.requested_url.clone()
            }
        };
        info!(url = %url, "stage finished loading");
        let _ = self.ctx.bus.dispatch(OutboundMessage::opened_stage(url, Ok(())));
        self.reset();
    }

    fn settle_timed_out(&self, generation: u64, waited: u64) {
        let report = {
            let mut session = self.session.lock();
            if session.generation != generation {
                return;
            }
            session.evaluating = false;
            session.armed.then(|| {
                if session.requested_url.is_empty() {
                    REDACTED_URL.to_string()
                } else {
                    session.requested_url.clone()
                }
            })
        };
        warn!(ticks = waited, "streaming did not settle in time");
        if let Some(url) = report {
            let _ = self.ctx.bus.dispatch(OutboundMessage::opened_stage(
                url,
                Err(format!("streaming did not settle within {waited} frames")),
            ));
        }
        self.reset();
    }

    /// Back to idle with the host's current document as the opened locator.
    fn reset(&self) {
        let opened = self.ctx.scene.current_document().unwrap_or_default();
        let mut session = self.session.lock();
        session.requested_url.clear();
        session.opened_url = opened;
        session.phase = LoadPhase::Idle;
        session.streaming_busy = false;
        session.persisted = false;
        session.evaluating = false;
        session.generation += 1;
    }
}

impl Coordinator for LoadingCoordinator {
    fn name(&self) -> &'static str {
        "loading"
    }

    fn outgoing(&self) -> &'static [&'static str] {
        OUTGOING
    }

    fn incoming(&self) -> &'static [&'static str] {
        INCOMING
    }

    fn on_message(&self, message: &InboundMessage) {
        match message {
            InboundMessage::OpenStageRequest(payload) => self.handle_open_request(payload),
            InboundMessage::LoadingStateQuery => self.handle_loading_state_query(),
            other => debug!(event_type = other.name(), "not a loading message"),
        }
    }

    fn on_scene_event(&self, event: &SceneEvent) {
        match event {
            SceneEvent::Opening { url } => self.on_opening(url.as_deref()),
            SceneEvent::AssetsLoaded => self.on_assets_loaded(),
            SceneEvent::StreamingStatus { busy } => self.on_streaming_status(*busy),
            SceneEvent::Progress { payload } => {
                self.forward_progress(OutboundMessage::UpdateProgressAmount(payload.clone()));
            }
            SceneEvent::Activity { payload } => {
                self.forward_progress(OutboundMessage::UpdateProgressActivity(activity_text(payload)));
            }
            SceneEvent::Opened | SceneEvent::SelectionChanged | SceneEvent::Closed => {}
        }
    }

    fn shutdown(&self) {
        self.ctx.cancel();
        let mut session = self.session.lock();
        *session = LoadSession::default();
    }
}

/// Activity payloads are forwarded as given; bare strings are wrapped so the
/// client always sees an object.
fn activity_text(payload: &Value) -> Value {
    match payload {
        Value::String(text) => serde_json::json!({ "text": text }),
        other => other.clone(),
    }
}
