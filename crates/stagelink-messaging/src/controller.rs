//! Routing between the client bus, the scene host and the coordinators.

use std::collections::HashMap;
use std::sync::Arc;

use stagelink_core::{
    CredentialSink, FrameClock, InboundMessage, MessageBus, SceneEvent, SceneHost,
};
use stagelink_settings::StageLinkSettings;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::CoordinatorContext;
use crate::coordinator::Coordinator;
use crate::loading::LoadingCoordinator;
use crate::selection::SelectionCoordinator;
use crate::status::StatusCoordinator;

/// Upper bound on scene events handled by one [`MessagingController::pump`].
/// Selection rewrites feed back into the event stream; the bound keeps a
/// misbehaving host from spinning the loop.
pub const MAX_EVENTS_PER_PUMP: usize = 256;

enum Next {
    Message(Option<InboundMessage>),
    Event(Result<SceneEvent, RecvError>),
    Shutdown,
}

/// Owns the three coordinators and feeds them.
pub struct MessagingController {
    ctx: CoordinatorContext,
    loading: LoadingCoordinator,
    selection: SelectionCoordinator,
    status: StatusCoordinator,
    coordinators: Vec<Arc<dyn Coordinator>>,
    routes: HashMap<&'static str, Vec<usize>>,
    events: broadcast::Receiver<SceneEvent>,
}

impl MessagingController {
    /// Build the coordinators, register their outgoing message names and
    /// subscribe to scene events.
    pub fn new(
        scene: Arc<dyn SceneHost>,
        credentials: Arc<dyn CredentialSink>,
        bus: MessageBus,
        clock: FrameClock,
        settings: Arc<StageLinkSettings>,
    ) -> Self {
        let events = scene.subscribe();
        let ctx = CoordinatorContext::new(scene, credentials, bus, clock, settings);
        let loading = LoadingCoordinator::new(ctx.child());
        let selection = SelectionCoordinator::new(ctx.child());
        let status = StatusCoordinator::new(ctx.child());

        let coordinators: Vec<Arc<dyn Coordinator>> = vec![
            Arc::new(loading.clone()),
            Arc::new(selection.clone()),
            Arc::new(status.clone()),
        ];

        let mut routes: HashMap<&'static str, Vec<usize>> = HashMap::new();
        for (index, coordinator) in coordinators.iter().enumerate() {
            for &name in coordinator.outgoing() {
                ctx.bus.register_outgoing(name);
            }
            for &name in coordinator.incoming() {
                routes.entry(name).or_default().push(index);
            }
            debug!(
                coordinator = coordinator.name(),
                incoming = coordinator.incoming().len(),
                outgoing = coordinator.outgoing().len(),
                "coordinator registered"
            );
        }

        Self {
            ctx,
            loading,
            selection,
            status,
            coordinators,
            routes,
            events,
        }
    }

    pub fn loading(&self) -> &LoadingCoordinator {
        &self.loading
    }

    pub fn selection(&self) -> &SelectionCoordinator {
        &self.selection
    }

    pub fn status(&self) -> &StatusCoordinator {
        &self.status
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.ctx.token()
    }

    /// Kick off startup work, currently just the configured auto-load.
    pub fn startup(&self) {
        match self.ctx.settings.loading.auto_load_url.as_deref() {
            Some(url) if !url.is_empty() => self.loading.auto_load(url),
            _ => debug!("no startup document configured"),
        }
    }

    /// Deliver `message` to every coordinator subscribed to its name.
    pub fn handle_message(&self, message: &InboundMessage) {
        let name = message.name();
        let Some(targets) = self.routes.get(name) else {
            warn!(event_type = name, "no coordinator handles this message");
            return;
        };
        debug!(event_type = name, "routing inbound message");
        for &index in targets {
            self.coordinators[index].on_message(message);
        }
    }

    /// Fan a scene event out to every coordinator.
    pub fn handle_scene_event(&self, event: &SceneEvent) {
        debug!(event = event.event_type(), "scene event");
        for coordinator in &self.coordinators {
            coordinator.on_scene_event(event);
        }
    }

    /// Handle every scene event already queued, including those raised while
    /// handling earlier ones. Returns the number handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while handled < MAX_EVENTS_PER_PUMP {
            match self.events.try_recv() {
                Ok(event) => {
                    self.handle_scene_event(&event);
                    handled += 1;
                }
                Err(TryRecvError::Lagged(n)) => {
                    warn!(skipped = n, "scene event stream lagged, dropped events");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        if handled == MAX_EVENTS_PER_PUMP {
            warn!(handled, "scene event pump hit its bound, deferring the rest");
        }
        handled
    }

    /// Serve inbound messages and scene events until the inbound channel
    /// closes, the scene goes away, or the shutdown token fires.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<InboundMessage>) {
        let cancel = self.ctx.token();
        self.startup();
        info!("messaging controller running");
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => Next::Shutdown,
                message = inbound.recv() => Next::Message(message),
                event = self.events.recv() => Next::Event(event),
            };
            match next {
                Next::Message(Some(message)) => {
                    self.handle_message(&message);
                    let _ = self.pump();
                }
                Next::Message(None) => {
                    info!("inbound channel closed");
                    break;
                }
                Next::Event(Ok(event)) => {
                    self.handle_scene_event(&event);
                    let _ = self.pump();
                }
                Next::Event(Err(RecvError::Lagged(n))) => {
                    warn!(skipped = n, "scene event stream lagged, dropped events");
                }
                Next::Event(Err(RecvError::Closed)) => {
                    info!("scene event stream closed");
                    break;
                }
                Next::Shutdown => break,
            }
        }
        self.shutdown();
    }

    /// Cancel suspended work in every coordinator and drop their state.
    pub fn shutdown(&self) {
        for coordinator in &self.coordinators {
            coordinator.shutdown();
        }
        self.ctx.cancel();
        info!("messaging controller stopped");
    }
}
