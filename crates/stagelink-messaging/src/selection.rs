//! Selection sync between the viewport and the client, hierarchy queries,
//! pickability and camera reset.
//!
//! The viewport only ever reports tagged objects: a click on untagged
//! geometry is rewritten to its nearest tagged ancestor before the client
//! hears about it. While the anchor is enabled a synthetic, non-pickable
//! object stays selected so the host keeps drawing selection groups.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use stagelink_core::messages::{ChildEntry, GetChildrenPayload, PathsPayload};
use stagelink_core::{
    AssetId, EditTarget, InboundMessage, ObjectPath, OutboundMessage, SceneError, SceneEvent,
};
use tracing::{debug, info, instrument, warn};

use crate::context::CoordinatorContext;
use crate::coordinator::Coordinator;
use crate::hierarchy::{self, KindFilter};

/// Consecutive selection rewrites tolerated before reporting as-is.
pub const MAX_RECONCILE_PASSES: u32 = 2;

const OUTGOING: &[&str] = &[
    OutboundMessage::STAGE_SELECTION_CHANGED,
    OutboundMessage::GET_CHILDREN_RESPONSE,
    OutboundMessage::MAKE_PRIMS_PICKABLE_RESPONSE,
    OutboundMessage::RESET_STAGE_RESPONSE,
];

const INCOMING: &[&str] = &[
    InboundMessage::GET_CHILDREN_REQUEST,
    InboundMessage::SELECT_PRIMS_REQUEST,
    InboundMessage::MAKE_PRIMS_PICKABLE,
    InboundMessage::RESET_STAGE,
];

#[derive(Debug, Default)]
struct SelectionState {
    anchor: Option<ObjectPath>,
    /// Selection writes made to keep the anchor selected, cleared one frame
    /// after each write.
    anchor_writes_pending: u32,
    /// The next selection change is the echo of a client request.
    suppress_next_echo: bool,
    reconcile_passes: u32,
    selected: Vec<AssetId>,
    camera_attributes: Vec<(String, Value)>,
}

#[derive(Clone)]
pub struct SelectionCoordinator {
    ctx: CoordinatorContext,
    anchor_path: Option<ObjectPath>,
    state: Arc<Mutex<SelectionState>>,
}

impl SelectionCoordinator {
    pub fn new(ctx: CoordinatorContext) -> Self {
        let selection = &ctx.settings.selection;
        let anchor_path = if selection.anchor_enabled {
            match ObjectPath::parse(&selection.anchor_path) {
                Ok(path) if !path.is_root() => Some(path),
                _ => {
                    warn!(path = %selection.anchor_path, "invalid anchor path, anchor disabled");
                    None
                }
            }
        } else {
            None
        };
        Self {
            ctx,
            anchor_path,
            state: Arc::new(Mutex::new(SelectionState::default())),
        }
    }

    fn tag_attribute(&self) -> &str {
        &self.ctx.settings.tag_attribute
    }

    pub fn anchor_enabled(&self) -> bool {
        self.anchor_path.is_some()
    }

    /// Identifiers last reported to (or requested by) the client.
    pub fn selected_asset_ids(&self) -> Vec<AssetId> {
        self.state.lock().selected.clone()
    }

    /// Camera attributes captured when the current document opened.
    pub fn captured_camera(&self) -> Vec<(String, Value)> {
        self.state.lock().camera_attributes.clone()
    }

    fn handle_get_children(&self, payload: &GetChildrenPayload) {
        let Some(prim_path) = payload.prim_path.as_deref() else {
            warn!("children request without a \"prim_path\" field, ignoring");
            return;
        };
        let filter = KindFilter::new(payload.filters.as_deref());
        let children = match ObjectPath::parse(prim_path) {
            Ok(path) => hierarchy::list_children(self.ctx.scene.as_ref(), &path, &filter, 0),
            Err(e) => {
                debug!(error = %e, "children requested for an invalid path");
                Vec::new()
            }
        };
        let _ = self.ctx.bus.dispatch(OutboundMessage::GetChildrenResponse {
            prim_path: prim_path.to_string(),
            children,
        });
    }

    #[instrument(skip_all)]
    fn handle_select_prims(&self, payload: &PathsPayload) {
        let requested = payload.paths.clone().unwrap_or_else(|| {
            warn!("select request without a \"paths\" field, clearing selection");
            Vec::new()
        });
        let scene = self.ctx.scene.as_ref();
        let attr = self.tag_attribute();

        let mut remaining = requested;
        let mut paths = Vec::new();
        let mut ids = Vec::new();
        if !remaining.is_empty() {
            for path in scene.traverse() {
                let Some(tag) = scene.tag(&path, attr) else {
                    continue;
                };
                if let Some(pos) = remaining.iter().position(|id| *id == tag) {
                    let _ = remaining.remove(pos);
                    ids.push(AssetId::from_raw(tag));
                    paths.push(path);
                    if remaining.is_empty() {
                        break;
                    }
                }
            }
        }
        if !remaining.is_empty() {
            debug!(unmatched = ?remaining, "some requested identifiers have no object");
        }

        if let Some(anchor) = self.ensure_anchor() {
            if !paths.contains(&anchor) {
                paths.push(anchor);
            }
        }
        info!(count = ids.len(), "selecting objects for client");
        {
            let mut state = self.state.lock();
            state.suppress_next_echo = true;
            state.reconcile_passes = 0;
            state.selected = ids;
        }
        scene.set_selection(paths);
    }

    fn handle_make_pickable(&self, payload: &PathsPayload) {
        let paths = payload.paths.as_deref().unwrap_or_default();
        let outcome = self.make_pickable(paths).map_err(|e| {
            warn!(error = %e, "failed to update pickability");
            e.to_string()
        });
        let _ = self
            .ctx
            .bus
            .dispatch(OutboundMessage::make_pickable_response(outcome));
    }

    fn make_pickable(&self, paths: &[String]) -> Result<(), SceneError> {
        let scene = self.ctx.scene.as_ref();
        scene.set_pickable(&ObjectPath::root(), false)?;
        for raw in paths {
            let path = ObjectPath::parse(raw)?;
            scene.set_pickable(&path, true)?;
        }
        debug!(count = paths.len(), "pickable set replaced");
        Ok(())
    }

    fn handle_reset_stage(&self) {
        let outcome = self.restore_camera().map_err(|e| {
            warn!(error = %e, "failed to reset camera");
            e.to_string()
        });
        let _ = self
            .ctx
            .bus
            .dispatch(OutboundMessage::reset_stage_response(outcome));
    }

    fn restore_camera(&self) -> Result<(), SceneError> {
        let scene = self.ctx.scene.as_ref();
        let camera = scene.active_camera().ok_or(SceneError::NoCamera)?;
        let attributes = self.state.lock().camera_attributes.clone();
        scene.with_edit_target(EditTarget::Session, &mut || {
            for (name, value) in &attributes {
                scene.set_attribute(&camera, name, value.clone())?;
            }
            Ok(())
        })?;
        info!(camera = %camera, count = attributes.len(), "camera restored");
        Ok(())
    }

    fn on_stage_opened(&self) {
        {
            let mut state = self.state.lock();
            state.anchor = None;
            state.reconcile_passes = 0;
        }
        let scene = self.ctx.scene.as_ref();
        if scene.current_document().unwrap_or_default().is_empty() {
            return;
        }
        if let Err(e) = scene.set_pickable(&ObjectPath::root(), false) {
            warn!(error = %e, "failed to clear pickability");
        }
        let camera_attributes = scene
            .active_camera()
            .map(|camera| scene.attributes(&camera))
            .unwrap_or_default();
        debug!(count = camera_attributes.len(), "captured camera state");
        self.state.lock().camera_attributes = camera_attributes;
    }

    fn on_assets_loaded(&self) {
        let settings = &self.ctx.settings.selection;
        let scene = self.ctx.scene.as_ref();
        if let Err(e) = scene.set_pickable(&ObjectPath::root(), false) {
            warn!(error = %e, "failed to clear pickability");
        }
        match ObjectPath::parse(&settings.world_root) {
            Ok(world) => {
                let tree = hierarchy::list_children(
                    scene,
                    &world,
                    &KindFilter::geometry(),
                    settings.pickable_depth,
                );
                for entry in &tree {
                    self.apply_pickable(entry, false);
                }
            }
            Err(e) => warn!(error = %e, "invalid world root, nothing made pickable"),
        }
        self.select_anchor();
    }

    /// Tagged objects and everything below them become pickable.
    fn apply_pickable(&self, entry: &ChildEntry, inherited: bool) {
        let Ok(path) = ObjectPath::parse(&entry.path) else {
            return;
        };
        let scene = self.ctx.scene.as_ref();
        let tagged = inherited || scene.has_attribute(&path, self.tag_attribute());
        if tagged {
            if let Err(e) = scene.set_pickable(&path, true) {
                warn!(path = %path, error = %e, "failed to make object pickable");
            }
        }
        for child in entry.children.iter().flatten() {
            self.apply_pickable(child, tagged);
        }
    }

    fn on_selection_changed(&self) {
        {
            let mut state = self.state.lock();
            if self.anchor_enabled() && state.anchor_writes_pending > 0 {
                debug!("selection change from anchor write, ignoring");
                return;
            }
            if state.suppress_next_echo {
                state.suppress_next_echo = false;
                debug!("selection change requested by client, ignoring");
                return;
            }
        }

        let scene = self.ctx.scene.as_ref();
        let selection: Vec<ObjectPath> = scene
            .selection()
            .into_iter()
            .filter(|p| Some(p) != self.anchor_path.as_ref())
            .collect();
        let tagged = self.tagged_ancestors(&selection);

        if self.anchor_enabled() && selection.is_empty() {
            info!("nothing selected, notifying client");
            self.notify(Vec::new());
            self.select_anchor();
            return;
        }

        if selection != tagged {
            let passes = {
                let mut state = self.state.lock();
                state.reconcile_passes += 1;
                state.reconcile_passes
            };
            if passes <= MAX_RECONCILE_PASSES {
                debug!(pass = passes, "rewriting selection to tagged ancestors");
                scene.set_selection(tagged);
                return;
            }
            warn!("selection did not converge, reporting tagged objects as-is");
        }

        let attr = self.tag_attribute();
        let ids: Vec<AssetId> = tagged
            .iter()
            .filter_map(|path| scene.tag(path, attr))
            .map(AssetId::from_raw)
            .collect();
        self.notify(ids);
        self.select_anchor();
    }

    fn notify(&self, ids: Vec<AssetId>) {
        {
            let mut state = self.state.lock();
            state.reconcile_passes = 0;
            state.selected = ids.clone();
        }
        debug!(?ids, "reporting selection");
        let _ = self
            .ctx
            .bus
            .dispatch(OutboundMessage::StageSelectionChanged { prims: ids });
    }

    /// Nearest ancestor-or-self of each path carrying the tag attribute,
    /// deduplicated in first-seen order.
    fn tagged_ancestors(&self, paths: &[ObjectPath]) -> Vec<ObjectPath> {
        let scene = self.ctx.scene.as_ref();
        let attr = self.tag_attribute();
        let mut out: Vec<ObjectPath> = Vec::new();
        for path in paths {
            if let Some(tagged) = path.ancestors().find(|p| scene.has_attribute(p, attr)) {
                if !out.contains(&tagged) {
                    out.push(tagged);
                }
            }
        }
        out
    }

    /// Create the anchor on the session layer if it does not exist yet.
    fn ensure_anchor(&self) -> Option<ObjectPath> {
        let path = self.anchor_path.as_ref()?;
        let scene = self.ctx.scene.as_ref();
        if self.state.lock().anchor.is_some() && scene.exists(path) {
            return Some(path.clone());
        }
        let created = scene.with_edit_target(EditTarget::Session, &mut || {
            let _ = scene.define_scope(path)?;
            scene.set_pickable(path, false)
        });
        match created {
            Ok(()) => {
                debug!(path = %path, "anchor created");
                self.state.lock().anchor = Some(path.clone());
                Some(path.clone())
            }
            Err(e) => {
                warn!(path = %path, error = %e, "failed to create anchor");
                None
            }
        }
    }

    /// Add the anchor to the live selection if it is missing. The change
    /// event this causes is ignored for one frame.
    fn select_anchor(&self) {
        let Some(anchor) = self.ensure_anchor() else {
            return;
        };
        let scene = self.ctx.scene.as_ref();
        let mut selection = scene.selection();
        if selection.contains(&anchor) {
            return;
        }
        self.state.lock().anchor_writes_pending += 1;
        selection.push(anchor);
        scene.set_selection(selection);

        let this = self.clone();
        let tick = self.ctx.clock.next_tick();
        self.ctx.spawn(async move {
            tick.await;
            let mut state = this.state.lock();
            state.anchor_writes_pending = state.anchor_writes_pending.saturating_sub(1);
        });
    }
}

impl Coordinator for SelectionCoordinator {
    fn name(&self) -> &'static str {
        "selection"
    }

    fn outgoing(&self) -> &'static [&'static str] {
        OUTGOING
    }

    fn incoming(&self) -> &'static [&'static str] {
        INCOMING
    }

    fn on_message(&self, message: &InboundMessage) {
        match message {
            InboundMessage::GetChildrenRequest(payload) => self.handle_get_children(payload),
            InboundMessage::SelectPrimsRequest(payload) => self.handle_select_prims(payload),
            InboundMessage::MakePrimsPickable(payload) => self.handle_make_pickable(payload),
            InboundMessage::ResetStage => self.handle_reset_stage(),
            other => debug!(event_type = other.name(), "not a selection message"),
        }
    }

    fn on_scene_event(&self, event: &SceneEvent) {
        match event {
            SceneEvent::Opened => self.on_stage_opened(),
            SceneEvent::AssetsLoaded => self.on_assets_loaded(),
            SceneEvent::SelectionChanged => self.on_selection_changed(),
            _ => {}
        }
    }

    fn shutdown(&self) {
        self.ctx.cancel();
        *self.state.lock() = SelectionState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, PLANT_URL, SITE_URL, path, plant, test_settings};
    use serde_json::json;
    use stagelink_core::messages::OpResult;
    use stagelink_core::{FrameClock, MemoryScene, MessageBus, SceneHost};

    fn selection_changed(ids: &[&str]) -> OutboundMessage {
        OutboundMessage::StageSelectionChanged {
            prims: ids.iter().map(|id| AssetId::from_raw(*id)).collect(),
        }
    }

    async fn opened_plant() -> Harness {
        let mut h = Harness::new();
        h.open(PLANT_URL).await;
        h
    }

    #[tokio::test]
    async fn assets_loaded_makes_tagged_subtrees_pickable() {
        let h = opened_plant().await;
        assert!(h.scene.is_pickable(&path("/World/Pump")));
        assert!(h.scene.is_pickable(&path("/World/Pump/Body")));
        assert!(h.scene.is_pickable(&path("/World/Valve/Handle")));
        assert!(!h.scene.is_pickable(&path("/World/Pipe")));
        assert!(!h.scene.is_pickable(&path("/World")));
        assert!(!h.scene.is_pickable(&path("/dummy")));
    }

    #[tokio::test]
    async fn anchor_is_selected_after_load() {
        let h = opened_plant().await;
        assert_eq!(h.scene.selection(), vec![path("/dummy")]);
    }

    #[tokio::test]
    async fn clicking_untagged_child_reports_tagged_ancestor() {
        let mut h = opened_plant().await;
        h.scene.set_selection(vec![path("/World/Pump/Body/Bolt")]);
        h.settle().await;

        assert_eq!(h.drain(), vec![selection_changed(&["pump-1"])]);
        assert_eq!(h.scene.selection(), vec![path("/World/Pump"), path("/dummy")]);
        assert_eq!(h.controller.selection().selected_asset_ids(), vec![AssetId::from_raw("pump-1")]);
    }

    #[tokio::test]
    async fn several_clicks_under_one_object_report_it_once() {
        let mut h = opened_plant().await;
        h.scene.set_selection(vec![
            path("/World/Pump/Body"),
            path("/World/Pump/Body/Bolt"),
            path("/World/Valve/Handle"),
        ]);
        h.settle().await;
        assert_eq!(h.drain(), vec![selection_changed(&["pump-1", "valve-7"])]);
    }

    #[tokio::test]
    async fn clearing_selection_reports_empty_and_reselects_anchor() {
        let mut h = opened_plant().await;
        h.scene.set_selection(vec![]);
        h.settle().await;
        assert_eq!(h.drain(), vec![selection_changed(&[])]);
        assert_eq!(h.scene.selection(), vec![path("/dummy")]);
    }

    #[tokio::test]
    async fn untagged_selection_collapses_to_empty() {
        let mut h = opened_plant().await;
        h.scene.set_selection(vec![path("/World/Pipe")]);
        h.settle().await;
        assert_eq!(h.drain(), vec![selection_changed(&[])]);
        assert_eq!(h.scene.selection(), vec![path("/dummy")]);
    }

    #[tokio::test]
    async fn client_selection_is_applied_without_echo() {
        let mut h = opened_plant().await;
        h.send(InboundMessage::SelectPrimsRequest(PathsPayload {
            paths: Some(vec!["valve-7".into(), "unknown".into()]),
        }));
        h.settle().await;
        assert!(h.drain().is_empty());
        assert_eq!(h.scene.selection(), vec![path("/World/Valve"), path("/dummy")]);
        assert_eq!(h.controller.selection().selected_asset_ids(), vec![AssetId::from_raw("valve-7")]);

        // The next user click is reported normally.
        h.scene.set_selection(vec![path("/World/Pump")]);
        h.settle().await;
        assert_eq!(h.drain(), vec![selection_changed(&["pump-1"])]);
    }

    #[tokio::test]
    async fn anchor_write_is_not_reported_for_one_frame() {
        let mut h = opened_plant().await;
        h.scene.set_selection(vec![path("/World/Pump")]);
        h.settle().await;
        let _ = h.drain();
        // Anchor re-selection is still pending: a change now is ignored.
        h.scene.set_selection(vec![path("/World/Valve")]);
        h.settle().await;
        assert!(h.drain().is_empty());

        h.tick().await;
        h.scene.set_selection(vec![path("/World/Valve")]);
        h.settle().await;
        assert_eq!(h.drain(), vec![selection_changed(&["valve-7"])]);
    }

    #[tokio::test]
    async fn without_anchor_empty_selection_is_reported_plainly() {
        let mut settings = test_settings();
        settings.selection.anchor_enabled = false;
        let mut h = Harness::with_settings(settings);
        h.open(PLANT_URL).await;
        assert!(h.scene.selection().is_empty());
        assert!(!h.scene.exists(&path("/dummy")));

        h.scene.set_selection(vec![path("/World/Pump/Body")]);
        h.settle().await;
        assert_eq!(h.drain(), vec![selection_changed(&["pump-1"])]);
        assert_eq!(h.scene.selection(), vec![path("/World/Pump")]);

        h.scene.set_selection(vec![]);
        h.settle().await;
        assert_eq!(h.drain(), vec![selection_changed(&[])]);
    }

    #[tokio::test]
    async fn get_children_lists_one_level() {
        let mut h = opened_plant().await;
        h.send(InboundMessage::GetChildrenRequest(GetChildrenPayload {
            prim_path: Some("/".into()),
            filters: None,
        }));
        let replies = h.drain();
        let OutboundMessage::GetChildrenResponse { prim_path, children } = &replies[0] else {
            panic!("unexpected {replies:?}");
        };
        assert_eq!(prim_path, "/");
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["World", "dummy"]);
        assert_eq!(children[0].children, Some(vec![]));
    }

    #[tokio::test]
    async fn get_children_applies_filters() {
        let mut h = opened_plant().await;
        h.send(InboundMessage::GetChildrenRequest(GetChildrenPayload {
            prim_path: Some("/World/Pump".into()),
            filters: Some(vec!["USDGeom".into()]),
        }));
        assert_eq!(
            h.drain(),
            vec![OutboundMessage::GetChildrenResponse {
                prim_path: "/World/Pump".into(),
                children: vec![ChildEntry {
                    name: "Body".into(),
                    path: "/World/Pump/Body".into(),
                    children: Some(vec![]),
                }],
            }]
        );
    }

    #[tokio::test]
    async fn get_children_for_unknown_path_is_empty() {
        let mut h = opened_plant().await;
        h.send(InboundMessage::GetChildrenRequest(GetChildrenPayload {
            prim_path: Some("not a path".into()),
            filters: None,
        }));
        assert_eq!(
            h.drain(),
            vec![OutboundMessage::GetChildrenResponse {
                prim_path: "not a path".into(),
                children: vec![],
            }]
        );

        h.send(InboundMessage::GetChildrenRequest(GetChildrenPayload::default()));
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn make_pickable_replaces_the_pickable_set() {
        let mut h = opened_plant().await;
        h.send(InboundMessage::MakePrimsPickable(PathsPayload {
            paths: Some(vec!["/World/Pipe".into()]),
        }));
        assert_eq!(h.drain(), vec![OutboundMessage::make_pickable_response(Ok(()))]);
        assert!(h.scene.is_pickable(&path("/World/Pipe")));
        assert!(!h.scene.is_pickable(&path("/World/Pump")));
    }

    #[tokio::test]
    async fn make_pickable_reports_bad_paths() {
        let mut h = opened_plant().await;
        h.send(InboundMessage::MakePrimsPickable(PathsPayload {
            paths: Some(vec!["/World/Nowhere".into()]),
        }));
        let replies = h.drain();
        assert!(matches!(
            &replies[0],
            OutboundMessage::MakePrimsPickableResponse { result: OpResult::Error, error } if !error.is_empty()
        ));
    }

    #[tokio::test]
    async fn reset_stage_restores_captured_camera() {
        let mut h = opened_plant().await;
        let camera = h.scene.active_camera().unwrap();
        h.scene
            .with_edit_target(EditTarget::Session, &mut || {
                h.scene.set_attribute(&camera, "focalLength", json!(85.0))
            })
            .unwrap();

        h.send(InboundMessage::ResetStage);
        assert_eq!(h.drain(), vec![OutboundMessage::reset_stage_response(Ok(()))]);
        assert_eq!(h.scene.attribute(&camera, "focalLength"), Some(json!(18.147)));
        assert!(!h.controller.selection().captured_camera().is_empty());
    }

    #[tokio::test]
    async fn new_document_recreates_anchor() {
        let mut h = opened_plant().await;
        h.scene.insert_document("/data/other.json", crate::testing::plant());
        h.open("/data/other.json").await;
        assert!(h.scene.exists(&path("/dummy")));
        assert_eq!(h.scene.selection(), vec![path("/dummy")]);
    }

    #[tokio::test]
    async fn unknown_identifier_leaves_only_the_anchor_selected() {
        let mut h = opened_plant().await;
        h.scene.set_selection(vec![path("/World/Pump")]);
        h.settle().await;
        h.tick().await;
        let _ = h.drain();

        h.send(InboundMessage::SelectPrimsRequest(PathsPayload {
            paths: Some(vec!["asset-42".into()]),
        }));
        h.settle().await;
        assert!(h.drain().is_empty());
        assert_eq!(h.scene.selection(), vec![path("/dummy")]);
        assert!(h.controller.selection().selected_asset_ids().is_empty());
    }

    #[tokio::test]
    async fn get_children_is_stable_across_requests() {
        let mut h = Harness::new();
        h.open(SITE_URL).await;
        let request = || {
            InboundMessage::GetChildrenRequest(GetChildrenPayload {
                prim_path: Some("/World/Site".into()),
                filters: None,
            })
        };
        h.send(request());
        let first = h.drain();
        h.send(request());
        let second = h.drain();

        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
        let OutboundMessage::GetChildrenResponse { children, .. } = &first[0] else {
            panic!("unexpected {first:?}");
        };
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bay", "Looks"]);
    }

    #[tokio::test]
    async fn pickability_reaches_tagged_objects_deep_in_the_world() {
        let mut h = Harness::new();
        h.open(SITE_URL).await;

        // Three levels down, and everything below it however deep.
        assert!(h.scene.is_pickable(&path("/World/Site/Bay/Crane")));
        assert!(h.scene.is_pickable(&path("/World/Site/Bay/Crane/A/B/C/D/E/F/G")));
        // Six levels down is the deepest the walk reaches.
        assert!(h.scene.is_pickable(&path("/World/Far/F2/F3/F4/F5/Lamp")));
        assert!(!h.scene.is_pickable(&path("/World/Far/F2/F3/F4/F5/F6/Beacon")));

        for untagged in ["/World", "/World/Site", "/World/Site/Bay", "/World/Far/F2/F3/F4/F5"] {
            assert!(!h.scene.is_pickable(&path(untagged)), "{untagged}");
        }
        // Tagged, but not a kind the geometry walk visits.
        assert!(!h.scene.is_pickable(&path("/World/Site/Looks")));
        assert!(!h.scene.is_pickable(&path("/World/Site/Looks/Shade")));
    }

    async fn open_without_pump(
        scene: &MemoryScene,
        selection: &SelectionCoordinator,
        clock: &FrameClock,
        url: &str,
    ) {
        scene.open_document(url).await.unwrap();
        selection.on_scene_event(&SceneEvent::Opened);
        selection.on_scene_event(&SceneEvent::AssetsLoaded);
        // Release the anchor write made after assets loaded.
        clock.advance();
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn reconcile_budget_starts_fresh_with_each_document() {
        let scene = Arc::new(MemoryScene::new());
        scene.insert_document(PLANT_URL, plant());
        scene.insert_document("/data/other.json", plant());
        let clock = FrameClock::new();
        let ctx = CoordinatorContext::new(
            scene.clone(),
            scene.clone(),
            MessageBus::new(16),
            clock.clone(),
            Arc::new(test_settings()),
        );
        let selection = SelectionCoordinator::new(ctx);
        open_without_pump(&scene, &selection, &clock, PLANT_URL).await;

        // Two rewrites whose echoes never arrive use up the budget.
        for _ in 0..MAX_RECONCILE_PASSES {
            scene.set_selection(vec![path("/World/Pump/Body/Bolt")]);
            selection.on_scene_event(&SceneEvent::SelectionChanged);
            assert_eq!(scene.selection(), vec![path("/World/Pump")]);
        }

        open_without_pump(&scene, &selection, &clock, "/data/other.json").await;
        scene.set_selection(vec![path("/World/Pump/Body/Bolt")]);
        selection.on_scene_event(&SceneEvent::SelectionChanged);
        assert_eq!(scene.selection(), vec![path("/World/Pump")]);
    }
}
