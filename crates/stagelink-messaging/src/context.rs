//! Shared handles every coordinator works with.

use std::future::Future;
use std::sync::Arc;

use stagelink_core::{CredentialSink, FrameClock, MessageBus, SceneHost};
use stagelink_settings::StageLinkSettings;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Scene, bus, clock and settings, plus the cancellation scope for any
/// suspended work a coordinator starts.
#[derive(Clone)]
pub struct CoordinatorContext {
    pub scene: Arc<dyn SceneHost>,
    pub credentials: Arc<dyn CredentialSink>,
    pub bus: MessageBus,
    pub clock: FrameClock,
    pub settings: Arc<StageLinkSettings>,
    cancel: CancellationToken,
}

impl CoordinatorContext {
    pub fn new(
        scene: Arc<dyn SceneHost>,
        credentials: Arc<dyn CredentialSink>,
        bus: MessageBus,
        clock: FrameClock,
        settings: Arc<StageLinkSettings>,
    ) -> Self {
        Self {
            scene,
            credentials,
            bus,
            clock,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Same handles, with a cancellation scope nested in this one.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    /// Run `task` until it finishes or this scope is cancelled.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = task => {}
            }
        })
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
