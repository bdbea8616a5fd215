//! Asset status to selection-group mapping.
//!
//! Status changes and selection changes only mark the registry dirty; a
//! single recompute runs on the following frame no matter how many triggers
//! arrived in between.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use stagelink_core::messages::SetStatusPayload;
use stagelink_core::{InboundMessage, ObjectPath, Rgba, SceneEvent, SelectionGroupId};
use tracing::{debug, info, warn};

use crate::context::CoordinatorContext;
use crate::coordinator::Coordinator;
use crate::hierarchy::{self, KindFilter};

const INCOMING: &[&str] = &[InboundMessage::SET_STATUS_REQUEST];

const DEFAULT_OUTLINE: Rgba = Rgba([0.0, 0.635, 0.929, 1.0]);
const DEFAULT_SHADE: Rgba = Rgba([0.0, 0.0, 0.0, 0.0]);
const ALERT_OUTLINE: Rgba = Rgba([0.929, 0.110, 0.141, 1.0]);
const WARNING_SHADE: Rgba = Rgba([1.0, 0.31, 0.0, 0.7]);
const FAULT_SHADE: Rgba = Rgba([0.5, 0.0, 0.0, 0.7]);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AssetStatus {
    #[default]
    Normal,
    Warning,
    Fault,
}

impl AssetStatus {
    /// Anything other than `warning` or `fault` is normal.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "warning" => Self::Warning,
            "fault" => Self::Fault,
            _ => Self::Normal,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionGroups {
    pub default: SelectionGroupId,
    pub warning: SelectionGroupId,
    pub fault: SelectionGroupId,
}

#[derive(Debug, Default)]
struct StatusRegistry {
    statuses: BTreeMap<ObjectPath, AssetStatus>,
    dirty: bool,
    groups: Option<SelectionGroups>,
    passes: u64,
}

#[derive(Clone)]
pub struct StatusCoordinator {
    ctx: CoordinatorContext,
    registry: Arc<Mutex<StatusRegistry>>,
}

impl StatusCoordinator {
    pub fn new(ctx: CoordinatorContext) -> Self {
        Self {
            ctx,
            registry: Arc::new(Mutex::new(StatusRegistry::default())),
        }
    }

    pub fn status_of(&self, path: &ObjectPath) -> Option<AssetStatus> {
        self.registry.lock().statuses.get(path).copied()
    }

    pub fn groups(&self) -> Option<SelectionGroups> {
        self.registry.lock().groups
    }

    /// Number of recompute passes run so far.
    pub fn recompute_passes(&self) -> u64 {
        self.registry.lock().passes
    }

    fn handle_set_status(&self, payload: &SetStatusPayload) {
        let asset_id = payload.asset_id.as_deref().unwrap_or_default();
        if asset_id.is_empty() {
            warn!("status request with an empty asset_id, ignoring");
            return;
        }
        let Some(raw_status) = payload.asset_status.as_deref() else {
            warn!(asset_id, "status request without an \"asset_status\" field, ignoring");
            return;
        };
        let Some(path) = self
            .ctx
            .scene
            .find_tagged(&self.ctx.settings.tag_attribute, asset_id)
        else {
            warn!(asset_id, "no object carries this asset id");
            return;
        };

        let status = AssetStatus::parse(raw_status);
        debug!(asset_id, path = %path, ?status, "status recorded");
        let _ = self.registry.lock().statuses.insert(path, status);
        self.schedule_recompute();
    }

    /// Forget every status and drop any recompute still pending for the
    /// previous document.
    fn on_stage_opening(&self) {
        {
            let mut registry = self.registry.lock();
            registry.statuses.clear();
            registry.dirty = false;
        }
        let _ = self.ensure_groups();
    }

    /// Register the three groups once for the life of the coordinator.
    fn ensure_groups(&self) -> SelectionGroups {
        if let Some(groups) = self.registry.lock().groups {
            return groups;
        }
        let scene = self.ctx.scene.as_ref();
        let register = |outline: Rgba, shade: Rgba| {
            let id = scene.register_selection_group();
            scene.set_selection_group_outline_color(id, outline);
            scene.set_selection_group_shade_color(id, shade);
            id
        };
        let groups = SelectionGroups {
            default: register(DEFAULT_OUTLINE, DEFAULT_SHADE),
            warning: register(ALERT_OUTLINE, WARNING_SHADE),
            fault: register(ALERT_OUTLINE, FAULT_SHADE),
        };
        scene.set_selection_group_outline_color(SelectionGroupId::FALLBACK, DEFAULT_OUTLINE);
        scene.set_selection_group_shade_color(SelectionGroupId::FALLBACK, DEFAULT_SHADE);
        info!(?groups, "selection groups registered");
        self.registry.lock().groups = Some(groups);
        groups
    }

    fn schedule_recompute(&self) {
        {
            let mut registry = self.registry.lock();
            if registry.dirty {
                return;
            }
            registry.dirty = true;
        }
        let this = self.clone();
        let tick = self.ctx.clock.next_tick();
        self.ctx.spawn(async move {
            tick.await;
            this.recompute();
        });
    }

    fn recompute(&self) {
        let groups = self.ensure_groups();
        let entries: Vec<(ObjectPath, AssetStatus)> = {
            let mut registry = self.registry.lock();
            if !registry.dirty {
                return;
            }
            registry.dirty = false;
            registry.passes += 1;
            registry.statuses.iter().map(|(p, s)| (p.clone(), *s)).collect()
        };

        let scene = self.ctx.scene.as_ref();
        let selected = scene.selection();
        let filter = KindFilter::geometry();
        let depth = self.ctx.settings.status.descendant_depth;
        for (path, status) in entries {
            let group = match status {
                AssetStatus::Warning => groups.warning,
                AssetStatus::Fault => groups.fault,
                AssetStatus::Normal if selected.contains(&path) => groups.default,
                AssetStatus::Normal => SelectionGroupId::UNSET,
            };
            debug!(path = %path, group = group.0, "assigning selection group");
            scene.set_selection_group(group, &path);
            for child in hierarchy::descendants(scene, &path, &filter, depth) {
                scene.set_selection_group(group, &child);
            }
        }
    }
}

impl Coordinator for StatusCoordinator {
    fn name(&self) -> &'static str {
        "status"
    }

    fn outgoing(&self) -> &'static [&'static str] {
        &[]
    }

    fn incoming(&self) -> &'static [&'static str] {
        INCOMING
    }

    fn on_message(&self, message: &InboundMessage) {
        match message {
            InboundMessage::SetStatusRequest(payload) => self.handle_set_status(payload),
            other => debug!(event_type = other.name(), "not a status message"),
        }
    }

    fn on_scene_event(&self, event: &SceneEvent) {
        match event {
            SceneEvent::Opening { .. } => self.on_stage_opening(),
            SceneEvent::SelectionChanged => self.schedule_recompute(),
            _ => {}
        }
    }

    fn shutdown(&self) {
        self.ctx.cancel();
        let mut registry = self.registry.lock();
        registry.statuses.clear();
        registry.dirty = false;
    }
}
