//! Test harness: a controller over a [`MemoryScene`] driven frame by frame.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use stagelink_core::{
    FrameClock, InboundMessage, MemoryScene, MessageBus, ObjectPath, OutboundMessage, PrimKind,
    StageDocument,
};
use stagelink_settings::StageLinkSettings;
use tokio::sync::broadcast;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::controller::MessagingController;

pub(crate) const PLANT_URL: &str = "/data/plant.json";
pub(crate) const SITE_URL: &str = "/data/site.json";

pub(crate) fn path(s: &str) -> ObjectPath {
    ObjectPath::parse(s).unwrap()
}

pub(crate) fn test_settings() -> StageLinkSettings {
    let mut settings = StageLinkSettings::default();
    settings.loading.app_root = "/opt/viewer/apps".into();
    settings
}

/// Two tagged assets with untagged geometry below them, plus loose geometry.
pub(crate) fn plant() -> StageDocument {
    StageDocument::default()
        .with_prim("/World", PrimKind::Xform, &[])
        .with_prim("/World/Pump", PrimKind::Xform, &[("asset_id", json!("pump-1"))])
        .with_prim("/World/Pump/Body", PrimKind::Mesh, &[])
        .with_prim("/World/Pump/Body/Bolt", PrimKind::Mesh, &[])
        .with_prim("/World/Valve", PrimKind::Xform, &[("asset_id", json!("valve-7"))])
        .with_prim("/World/Valve/Handle", PrimKind::Mesh, &[])
        .with_prim("/World/Pipe", PrimKind::Mesh, &[])
}

/// Deep hierarchy for depth limits: a tagged crane three levels below
/// `/World` with a seven-level chain under it, tagged objects six and
/// seven levels down, and a tagged object of a kind the geometry walk skips.
pub(crate) fn site() -> StageDocument {
    StageDocument::default()
        .with_prim("/World", PrimKind::Xform, &[])
        .with_prim("/World/Site", PrimKind::Xform, &[])
        .with_prim("/World/Site/Bay", PrimKind::Xform, &[])
        .with_prim("/World/Site/Bay/Crane", PrimKind::Xform, &[("asset_id", json!("crane-3"))])
        .with_prim("/World/Site/Bay/Crane/A/B/C/D/E/F/G", PrimKind::Mesh, &[])
        .with_prim("/World/Site/Looks", PrimKind::Other, &[("asset_id", json!("looks-1"))])
        .with_prim("/World/Site/Looks/Shade", PrimKind::Mesh, &[])
        .with_prim("/World/Far/F2/F3/F4/F5/Lamp", PrimKind::Xform, &[("asset_id", json!("lamp-5"))])
        .with_prim("/World/Far/F2/F3/F4/F5/F6/Beacon", PrimKind::Xform, &[("asset_id", json!("beacon-9"))])
}

pub(crate) struct Harness {
    pub scene: Arc<MemoryScene>,
    pub clock: FrameClock,
    pub bus: MessageBus,
    pub controller: MessagingController,
    outbound: broadcast::Receiver<OutboundMessage>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: StageLinkSettings) -> Self {
        let scene = Arc::new(MemoryScene::new());
        scene.insert_document(PLANT_URL, plant());
        scene.insert_document(SITE_URL, site());
        let clock = FrameClock::new();
        let bus = MessageBus::new(256);
        let outbound = bus.subscribe();
        let controller = MessagingController::new(
            scene.clone(),
            scene.clone(),
            bus.clone(),
            clock.clone(),
            Arc::new(settings),
        );
        Self {
            scene,
            clock,
            bus,
            controller,
            outbound,
        }
    }

    /// Handle `message` and any scene events it raised synchronously.
    pub fn send(&mut self, message: InboundMessage) {
        self.controller.handle_message(&message);
        let _ = self.controller.pump();
    }

    /// Let spawned tasks run without advancing the clock.
    pub async fn settle(&mut self) {
        for _ in 0..16 {
            tokio::task::yield_now().await;
            let _ = self.controller.pump();
        }
    }

    pub async fn tick(&mut self) {
        self.clock.advance();
        self.settle().await;
    }

    pub async fn ticks(&mut self, count: u32) {
        for _ in 0..count {
            self.tick().await;
        }
    }

    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            out.push(message);
        }
        out
    }

    /// Drain everything, keeping only messages named `name`.
    pub fn drain_named(&mut self, name: &str) -> Vec<OutboundMessage> {
        self.drain().into_iter().filter(|m| m.name() == name).collect()
    }

    /// Settle until a message named `name` shows up, for work that completes
    /// off the runtime thread.
    pub async fn wait_for(&mut self, name: &str) -> Vec<OutboundMessage> {
        for _ in 0..200 {
            self.settle().await;
            let found = self.drain_named(name);
            if !found.is_empty() {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Vec::new()
    }

    /// Open `url` through the client protocol, wait out the settle window,
    /// and discard everything sent along the way.
    pub async fn open(&mut self, url: &str) {
        self.send(InboundMessage::OpenStageRequest(
            stagelink_core::messages::OpenStagePayload {
                url: Some(url.to_string()),
            },
        ));
        self.settle().await;
        self.ticks(2).await;
        let _ = self.drain();
    }
}

/// Formatted log output collected in memory.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Capture everything logged on this thread until the guard drops.
///
/// `#[tokio::test]` runs spawned tasks on the test thread, so their output
/// lands here too.
pub(crate) fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(LevelFilter::TRACE)
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
