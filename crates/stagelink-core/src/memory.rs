//! In-memory scene host.
//!
//! Backs the demo binary and every coordinator test. Documents are small JSON
//! files listing objects, their kinds and attributes:
//!
//! ```json
//! { "prims": [ { "path": "/World/Pump", "kind": "xform", "attributes": { "asset_id": "pump-1" } } ] }
//! ```
//!
//! Missing ancestors are created as xforms. A session layer carries the
//! viewport camera and any session-defined objects; its attribute opinions
//! win over the root layer.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Notify};

use crate::errors::SceneError;
use crate::events::SceneEvent;
use crate::ids::ObjectPath;
use crate::scene::{
    CredentialSink, EditFn, EditTarget, PrimKind, Rgba, SceneHost, SelectionGroupId,
};

/// Path of the viewport camera the host creates for every document.
pub const VIEWPORT_CAMERA_PATH: &str = "/OmniverseKit_Persp";

const EVENT_CAPACITY: usize = 1024;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageDocument {
    #[serde(default)]
    pub prims: Vec<PrimSpec>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrimSpec {
    pub path: ObjectPath,
    #[serde(default = "default_kind")]
    pub kind: PrimKind,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

fn default_kind() -> PrimKind {
    PrimKind::Xform
}

impl StageDocument {
    /// Builder used by tests: append an object with an optional tag.
    pub fn with_prim(mut self, path: &str, kind: PrimKind, attributes: &[(&str, serde_json::Value)]) -> Self {
        if let Ok(path) = ObjectPath::parse(path) {
            self.prims.push(PrimSpec {
                path,
                kind,
                attributes: attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            });
        }
        self
    }
}

/// Storage token handed to the credential side channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageToken {
    pub host: String,
    pub container: String,
    pub token: String,
}

#[derive(Clone, Debug)]
struct PrimRecord {
    kind: PrimKind,
    children: Vec<String>,
    attributes: BTreeMap<String, serde_json::Value>,
    session_attributes: BTreeMap<String, serde_json::Value>,
}

impl PrimRecord {
    fn new(kind: PrimKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            session_attributes: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
struct SceneState {
    document: Option<String>,
    prims: BTreeMap<ObjectPath, PrimRecord>,
    edit_target: EditTarget,
    selection: Vec<ObjectPath>,
    pickable: BTreeMap<ObjectPath, bool>,
    next_group: u8,
    outline_colors: BTreeMap<SelectionGroupId, Rgba>,
    shade_colors: BTreeMap<SelectionGroupId, Rgba>,
    group_assignments: BTreeMap<ObjectPath, SelectionGroupId>,
    anonymous_count: u32,
}

impl SceneState {
    fn new() -> Self {
        let mut state = Self {
            document: None,
            prims: BTreeMap::new(),
            edit_target: EditTarget::Root,
            selection: Vec::new(),
            pickable: BTreeMap::new(),
            next_group: 1,
            outline_colors: BTreeMap::new(),
            shade_colors: BTreeMap::new(),
            group_assignments: BTreeMap::new(),
            anonymous_count: 0,
        };
        state.load(None, &StageDocument::default());
        state
    }

    /// Replace the document contents and recreate the session layer.
    fn load(&mut self, url: Option<&str>, doc: &StageDocument) {
        self.document = Some(match url {
            Some(url) => url.to_string(),
            None => {
                let id = format!("anon:{}.usd", self.anonymous_count);
                self.anonymous_count += 1;
                id
            }
        });
        self.prims.clear();
        self.prims.insert(ObjectPath::root(), PrimRecord::new(PrimKind::Other));
        self.selection.clear();
        self.pickable.clear();
        self.group_assignments.clear();
        self.edit_target = EditTarget::Root;

        for spec in &doc.prims {
            let record = self.ensure_prim(&spec.path, spec.kind.clone());
            record.kind = spec.kind.clone();
            record.attributes.extend(spec.attributes.clone());
        }

        if let Ok(camera) = ObjectPath::parse(VIEWPORT_CAMERA_PATH) {
            let record = self.ensure_prim(&camera, PrimKind::Camera);
            record.session_attributes.insert("focalLength".into(), serde_json::json!(18.147));
            record
                .session_attributes
                .insert("xformOp:translate".into(), serde_json::json!([500.0, 500.0, 500.0]));
        }
    }

    fn ensure_prim(&mut self, path: &ObjectPath, kind: PrimKind) -> &mut PrimRecord {
        if !self.prims.contains_key(path) {
            if let Some(parent) = path.parent() {
                if !self.prims.contains_key(&parent) {
                    self.ensure_prim(&parent, PrimKind::Xform);
                }
                if let Some(record) = self.prims.get_mut(&parent) {
                    record.children.push(path.name().to_string());
                }
            }
            self.prims.insert(path.clone(), PrimRecord::new(kind));
        }
        self.prims
            .entry(path.clone())
            .or_insert_with(|| PrimRecord::new(PrimKind::Other))
    }

    fn collect(&self, path: &ObjectPath, out: &mut Vec<ObjectPath>) {
        if let Some(record) = self.prims.get(path) {
            for name in &record.children {
                let child = path.child(name);
                out.push(child.clone());
                self.collect(&child, out);
            }
        }
    }
}

/// Thread-safe in-memory implementation of [`SceneHost`].
pub struct MemoryScene {
    state: Mutex<SceneState>,
    documents: Mutex<HashMap<String, StageDocument>>,
    credentials: Mutex<Vec<StorageToken>>,
    open_gate: Mutex<Option<Arc<Notify>>>,
    events: broadcast::Sender<SceneEvent>,
}

impl MemoryScene {
    /// A host with a blank anonymous document already open.
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(SceneState::new()),
            documents: Mutex::new(HashMap::new()),
            credentials: Mutex::new(Vec::new()),
            open_gate: Mutex::new(None),
            events,
        }
    }

    /// Make `doc` openable under `url` without touching the filesystem.
    pub fn insert_document(&self, url: impl Into<String>, doc: StageDocument) {
        self.documents.lock().insert(url.into(), doc);
    }

    /// Publish a host event, as the streaming manager or status bar would.
    pub fn emit(&self, event: SceneEvent) {
        let _ = self.events.send(event);
    }

    pub fn set_streaming_busy(&self, busy: bool) {
        self.emit(SceneEvent::StreamingStatus { busy });
    }

    /// Hold later opens between `Opening` and the fetch until the returned
    /// handle is notified, once per open.
    pub fn gate_opens(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.open_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn storage_tokens(&self) -> Vec<StorageToken> {
        self.credentials.lock().clone()
    }

    pub fn selection_group_of(&self, path: &ObjectPath) -> SelectionGroupId {
        self.state
            .lock()
            .group_assignments
            .get(path)
            .copied()
            .unwrap_or(SelectionGroupId::UNSET)
    }

    pub fn outline_color(&self, group: SelectionGroupId) -> Option<Rgba> {
        self.state.lock().outline_colors.get(&group).copied()
    }

    pub fn shade_color(&self, group: SelectionGroupId) -> Option<Rgba> {
        self.state.lock().shade_colors.get(&group).copied()
    }

    /// Number of groups handed out by `register_selection_group`.
    pub fn registered_group_count(&self) -> usize {
        usize::from(self.state.lock().next_group - 1)
    }

    async fn fetch_document(&self, url: &str) -> Result<StageDocument, SceneError> {
        let cached = self.documents.lock().get(url).cloned();
        if let Some(doc) = cached {
            return Ok(doc);
        }
        let raw = tokio::fs::read_to_string(url)
            .await
            .map_err(|e| SceneError::OpenFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        serde_json::from_str(&raw).map_err(|e| SceneError::OpenFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    fn finish_open(&self, url: Option<&str>, doc: &StageDocument) {
        self.state.lock().load(url, doc);
        self.emit(SceneEvent::Opened);
        self.emit(SceneEvent::AssetsLoaded);
    }
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SceneHost for MemoryScene {
    fn current_document(&self) -> Option<String> {
        self.state.lock().document.clone()
    }

    async fn open_document(&self, url: &str) -> Result<(), SceneError> {
        self.emit(SceneEvent::Opening {
            url: Some(url.to_string()),
        });
        let gate = self.open_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let doc = self.fetch_document(url).await?;
        self.finish_open(Some(url), &doc);
        Ok(())
    }

    async fn new_document(&self) -> Result<(), SceneError> {
        self.emit(SceneEvent::Opening { url: None });
        self.finish_open(None, &StageDocument::default());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SceneEvent> {
        self.events.subscribe()
    }

    fn exists(&self, path: &ObjectPath) -> bool {
        self.state.lock().prims.contains_key(path)
    }

    fn kind(&self, path: &ObjectPath) -> Option<PrimKind> {
        self.state.lock().prims.get(path).map(|r| r.kind.clone())
    }

    fn children(&self, path: &ObjectPath) -> Vec<ObjectPath> {
        let state = self.state.lock();
        state
            .prims
            .get(path)
            .map(|r| r.children.iter().map(|name| path.child(name)).collect())
            .unwrap_or_default()
    }

    fn traverse(&self) -> Vec<ObjectPath> {
        let state = self.state.lock();
        let mut out = Vec::new();
        state.collect(&ObjectPath::root(), &mut out);
        out
    }

    fn attribute(&self, path: &ObjectPath, name: &str) -> Option<serde_json::Value> {
        let state = self.state.lock();
        let record = state.prims.get(path)?;
        record
            .session_attributes
            .get(name)
            .or_else(|| record.attributes.get(name))
            .cloned()
    }

    fn attributes(&self, path: &ObjectPath) -> Vec<(String, serde_json::Value)> {
        let state = self.state.lock();
        let Some(record) = state.prims.get(path) else {
            return Vec::new();
        };
        let mut merged = record.attributes.clone();
        merged.extend(record.session_attributes.clone());
        merged.into_iter().collect()
    }

    fn set_attribute(
        &self,
        path: &ObjectPath,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), SceneError> {
        let mut state = self.state.lock();
        let target = state.edit_target;
        let record = state
            .prims
            .get_mut(path)
            .ok_or_else(|| SceneError::NotFound(path.to_string()))?;
        match target {
            EditTarget::Root => record.attributes.insert(name.to_string(), value),
            EditTarget::Session => record.session_attributes.insert(name.to_string(), value),
        };
        Ok(())
    }

    fn with_edit_target(&self, target: EditTarget, edit: &mut EditFn<'_>) -> Result<(), SceneError> {
        let previous = std::mem::replace(&mut self.state.lock().edit_target, target);
        let result = edit();
        self.state.lock().edit_target = previous;
        result
    }

    fn define_scope(&self, path: &ObjectPath) -> Result<ObjectPath, SceneError> {
        if path.is_root() {
            return Err(SceneError::InvalidPath(path.to_string()));
        }
        let mut state = self.state.lock();
        state.ensure_prim(path, PrimKind::Scope);
        Ok(path.clone())
    }

    fn set_pickable(&self, path: &ObjectPath, pickable: bool) -> Result<(), SceneError> {
        let mut state = self.state.lock();
        if !state.prims.contains_key(path) {
            return Err(SceneError::NotFound(path.to_string()));
        }
        state.pickable.retain(|p, _| p == path || !p.has_prefix(path));
        state.pickable.insert(path.clone(), pickable);
        Ok(())
    }

    fn is_pickable(&self, path: &ObjectPath) -> bool {
        let state = self.state.lock();
        std::iter::successors(Some(path.clone()), ObjectPath::parent)
            .find_map(|p| state.pickable.get(&p).copied())
            .unwrap_or(true)
    }

    fn selection(&self) -> Vec<ObjectPath> {
        self.state.lock().selection.clone()
    }

    fn set_selection(&self, paths: Vec<ObjectPath>) {
        self.state.lock().selection = paths;
        self.emit(SceneEvent::SelectionChanged);
    }

    fn register_selection_group(&self) -> SelectionGroupId {
        let mut state = self.state.lock();
        let id = SelectionGroupId(state.next_group);
        state.next_group = state.next_group.saturating_add(1);
        id
    }

    fn set_selection_group_outline_color(&self, group: SelectionGroupId, color: Rgba) {
        self.state.lock().outline_colors.insert(group, color);
    }

    fn set_selection_group_shade_color(&self, group: SelectionGroupId, color: Rgba) {
        self.state.lock().shade_colors.insert(group, color);
    }

    fn set_selection_group(&self, group: SelectionGroupId, path: &ObjectPath) {
        self.state.lock().group_assignments.insert(path.clone(), group);
    }

    fn active_camera(&self) -> Option<ObjectPath> {
        let camera = ObjectPath::parse(VIEWPORT_CAMERA_PATH).ok()?;
        self.exists(&camera).then_some(camera)
    }
}

impl CredentialSink for MemoryScene {
    fn set_storage_token(&self, host: &str, container: &str, token: &str) {
        self.credentials.lock().push(StorageToken {
            host: host.to_string(),
            container: container.to_string(),
            token: token.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> ObjectPath {
        ObjectPath::parse(s).unwrap()
    }

    fn plant() -> StageDocument {
        StageDocument::default()
            .with_prim("/World", PrimKind::Xform, &[])
            .with_prim("/World/Pump", PrimKind::Xform, &[("asset_id", json!("pump-1"))])
            .with_prim("/World/Pump/Body", PrimKind::Mesh, &[])
            .with_prim("/World/Valve/Handle", PrimKind::Mesh, &[])
    }

    #[test]
    fn starts_with_anonymous_document() {
        let scene = MemoryScene::new();
        assert_eq!(scene.current_document().as_deref(), Some("anon:0.usd"));
        assert!(scene.active_camera().is_some());
    }

    #[tokio::test]
    async fn open_emits_lifecycle_events() {
        let scene = MemoryScene::new();
        scene.insert_document("plant.json", plant());
        let mut rx = scene.subscribe();

        scene.open_document("plant.json").await.unwrap();

        assert_eq!(rx.try_recv().unwrap(), SceneEvent::Opening { url: Some("plant.json".into()) });
        assert_eq!(rx.try_recv().unwrap(), SceneEvent::Opened);
        assert_eq!(rx.try_recv().unwrap(), SceneEvent::AssetsLoaded);
        assert_eq!(scene.current_document().as_deref(), Some("plant.json"));
    }

    #[tokio::test]
    async fn missing_document_fails_to_open() {
        let scene = MemoryScene::new();
        let mut rx = scene.subscribe();
        let err = scene.open_document("/definitely/not/here.json").await.unwrap_err();
        assert!(matches!(err, SceneError::OpenFailed { .. }));
        assert_eq!(scene.current_document().as_deref(), Some("anon:0.usd"));
        assert_eq!(
            rx.try_recv().unwrap(),
            SceneEvent::Opening { url: Some("/definitely/not/here.json".into()) }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn opening_is_announced_before_the_fetch() {
        let scene = Arc::new(MemoryScene::new());
        scene.insert_document("plant.json", plant());
        let gate = scene.gate_opens();
        let mut rx = scene.subscribe();

        let opener = scene.clone();
        let task = tokio::spawn(async move { opener.open_document("plant.json").await });
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(rx.try_recv().unwrap(), SceneEvent::Opening { url: Some("plant.json".into()) });
        assert!(rx.try_recv().is_err());
        assert_eq!(scene.current_document().as_deref(), Some("anon:0.usd"));

        gate.notify_one();
        task.await.unwrap().unwrap();
        assert_eq!(rx.try_recv().unwrap(), SceneEvent::Opened);
        assert_eq!(rx.try_recv().unwrap(), SceneEvent::AssetsLoaded);
        assert_eq!(scene.current_document().as_deref(), Some("plant.json"));
    }

    #[tokio::test]
    async fn missing_ancestors_are_created() {
        let scene = MemoryScene::new();
        scene.insert_document("plant.json", plant());
        scene.open_document("plant.json").await.unwrap();

        assert_eq!(scene.kind(&path("/World/Valve")), Some(PrimKind::Xform));
        assert_eq!(
            scene.children(&path("/World")),
            vec![path("/World/Pump"), path("/World/Valve")]
        );
        let all: Vec<String> = scene.traverse().into_iter().map(String::from).collect();
        assert_eq!(
            all,
            vec![
                "/World",
                "/World/Pump",
                "/World/Pump/Body",
                "/World/Valve",
                "/World/Valve/Handle",
                "/OmniverseKit_Persp",
            ]
        );
    }

    #[tokio::test]
    async fn find_tagged_scans_traversal() {
        let scene = MemoryScene::new();
        scene.insert_document("plant.json", plant());
        scene.open_document("plant.json").await.unwrap();
        assert_eq!(scene.find_tagged("asset_id", "pump-1"), Some(path("/World/Pump")));
        assert_eq!(scene.find_tagged("asset_id", "nope"), None);
    }

    #[test]
    fn session_opinions_override_root() {
        let scene = MemoryScene::new();
        let camera = scene.active_camera().unwrap();
        scene.set_attribute(&camera, "focalLength", json!(50.0)).unwrap();
        // Root-layer write is shadowed by the session opinion.
        assert_eq!(scene.attribute(&camera, "focalLength"), Some(json!(18.147)));

        scene
            .with_edit_target(EditTarget::Session, &mut || {
                scene.set_attribute(&camera, "focalLength", json!(35.0))
            })
            .unwrap();
        assert_eq!(scene.attribute(&camera, "focalLength"), Some(json!(35.0)));
    }

    #[tokio::test]
    async fn pickability_is_inherited() {
        let scene = MemoryScene::new();
        scene.insert_document("plant.json", plant());
        scene.open_document("plant.json").await.unwrap();

        scene.set_pickable(&ObjectPath::root(), false).unwrap();
        assert!(!scene.is_pickable(&path("/World/Pump/Body")));

        scene.set_pickable(&path("/World/Pump"), true).unwrap();
        assert!(scene.is_pickable(&path("/World/Pump/Body")));
        assert!(!scene.is_pickable(&path("/World/Valve")));

        // Resetting the root clears descendant overrides.
        scene.set_pickable(&ObjectPath::root(), false).unwrap();
        assert!(!scene.is_pickable(&path("/World/Pump")));
        assert!(scene.set_pickable(&path("/Missing"), true).is_err());
    }

    #[test]
    fn selection_writes_emit_events() {
        let scene = MemoryScene::new();
        let mut rx = scene.subscribe();
        let camera = scene.active_camera().unwrap();
        scene.set_selection(vec![camera.clone()]);
        assert_eq!(scene.selection(), vec![camera]);
        assert_eq!(rx.try_recv().unwrap(), SceneEvent::SelectionChanged);
    }

    #[test]
    fn selection_groups_are_numbered_from_one() {
        let scene = MemoryScene::new();
        assert_eq!(scene.register_selection_group(), SelectionGroupId(1));
        assert_eq!(scene.register_selection_group(), SelectionGroupId(2));
        assert_eq!(scene.registered_group_count(), 2);
    }

    #[test]
    fn define_scope_is_idempotent() {
        let scene = MemoryScene::new();
        let anchor = path("/dummy");
        scene.define_scope(&anchor).unwrap();
        scene.define_scope(&anchor).unwrap();
        assert_eq!(scene.children(&ObjectPath::root()).iter().filter(|p| **p == anchor).count(), 1);
        assert_eq!(scene.kind(&anchor), Some(PrimKind::Scope));
    }
}
