//! Capability interface onto the 3D scene host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::SceneError;
use crate::events::SceneEvent;
use crate::ids::ObjectPath;

/// Schema type of a scene object, as far as the coordinators care.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimKind {
    Mesh,
    Xform,
    Scope,
    Camera,
    #[serde(other)]
    Other,
}

impl PrimKind {
    /// Map a client filter name onto a kind. Unknown names match nothing.
    pub fn from_filter(name: &str) -> Option<PrimKind> {
        match name {
            "USDGeom" | "mesh" => Some(PrimKind::Mesh),
            "xform" => Some(PrimKind::Xform),
            "scope" => Some(PrimKind::Scope),
            _ => None,
        }
    }
}

/// Layer that receives attribute writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EditTarget {
    /// The document's persisted root layer.
    #[default]
    Root,
    /// Non-persistent override layer with the strongest opinion.
    Session,
}

/// Identifier of a visual selection group. `0` means "no group".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionGroupId(pub u8);

impl SelectionGroupId {
    pub const UNSET: SelectionGroupId = SelectionGroupId(0);
    /// Group the host falls back to for objects selected without a group.
    pub const FALLBACK: SelectionGroupId = SelectionGroupId(255);
}

/// Linear RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rgba(pub [f32; 4]);

/// Mutating scope closure passed to [`SceneHost::with_edit_target`].
pub type EditFn<'a> = dyn FnMut() -> Result<(), SceneError> + 'a;

/// Everything the coordinators need from the scene host.
///
/// All synchronous calls are expected to be cheap and serialized by the
/// host; only opening a document suspends.
#[async_trait]
pub trait SceneHost: Send + Sync {
    /// Locator of the open document's root layer, if any.
    fn current_document(&self) -> Option<String>;

    /// Emits `Opening` before fetching, then `Opened` and `AssetsLoaded`.
    async fn open_document(&self, url: &str) -> Result<(), SceneError>;

    async fn new_document(&self) -> Result<(), SceneError>;

    fn subscribe(&self) -> broadcast::Receiver<SceneEvent>;

    fn exists(&self, path: &ObjectPath) -> bool;

    fn kind(&self, path: &ObjectPath) -> Option<PrimKind>;

    /// Direct children in authored order. Empty for unknown paths.
    fn children(&self, path: &ObjectPath) -> Vec<ObjectPath>;

    /// Every object below the pseudo-root, depth first.
    fn traverse(&self) -> Vec<ObjectPath>;

    fn attribute(&self, path: &ObjectPath, name: &str) -> Option<serde_json::Value>;

    fn attributes(&self, path: &ObjectPath) -> Vec<(String, serde_json::Value)>;

    /// Write an attribute on the current edit target.
    fn set_attribute(
        &self,
        path: &ObjectPath,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), SceneError>;

    /// Run `edit` with writes routed to `target`, restoring the previous
    /// target afterwards.
    fn with_edit_target(&self, target: EditTarget, edit: &mut EditFn<'_>) -> Result<(), SceneError>;

    /// Define a grouping object on the current edit target. Existing objects
    /// are left untouched.
    fn define_scope(&self, path: &ObjectPath) -> Result<ObjectPath, SceneError>;

    fn set_pickable(&self, path: &ObjectPath, pickable: bool) -> Result<(), SceneError>;

    fn is_pickable(&self, path: &ObjectPath) -> bool;

    fn selection(&self) -> Vec<ObjectPath>;

    /// Replace the live selection and emit `SelectionChanged`.
    fn set_selection(&self, paths: Vec<ObjectPath>);

    fn register_selection_group(&self) -> SelectionGroupId;

    fn set_selection_group_outline_color(&self, group: SelectionGroupId, color: Rgba);

    fn set_selection_group_shade_color(&self, group: SelectionGroupId, color: Rgba);

    fn set_selection_group(&self, group: SelectionGroupId, path: &ObjectPath);

    fn active_camera(&self) -> Option<ObjectPath>;

    fn has_attribute(&self, path: &ObjectPath, name: &str) -> bool {
        self.attribute(path, name).is_some()
    }

    /// String value of the tag attribute on `path`.
    fn tag(&self, path: &ObjectPath, attr: &str) -> Option<String> {
        self.attribute(path, attr)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// First object (in traversal order) whose `attr` equals `value`.
    fn find_tagged(&self, attr: &str, value: &str) -> Option<ObjectPath> {
        self.traverse()
            .into_iter()
            .find(|path| self.tag(path, attr).as_deref() == Some(value))
    }
}

/// Side channel for short-lived storage access tokens.
pub trait CredentialSink: Send + Sync {
    fn set_storage_token(&self, host: &str, container: &str, token: &str);
}
