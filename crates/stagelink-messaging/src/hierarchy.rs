//! Bounded-depth hierarchy listings.

use stagelink_core::messages::ChildEntry;
use stagelink_core::{ObjectPath, PrimKind, SceneHost};

/// Objects whose name starts with this are host-internal cameras.
pub const INTERNAL_PREFIX: &str = "OmniverseKit_";
/// Render settings scope the host keeps directly under the root.
pub const RENDER_SCOPE: &str = "Render";
/// Filters used when walking geometry below a tagged object.
pub const GEOMETRY_FILTERS: [&str; 3] = ["USDGeom", "scope", "xform"];

/// Kind filter built from client filter names.
///
/// `None` accepts everything. A list whose names are all unknown accepts
/// nothing.
#[derive(Clone, Debug, Default)]
pub struct KindFilter(Option<Vec<PrimKind>>);

impl KindFilter {
    pub fn new<S: AsRef<str>>(names: Option<&[S]>) -> Self {
        Self(names.map(|names| {
            names
                .iter()
                .filter_map(|n| PrimKind::from_filter(n.as_ref()))
                .collect()
        }))
    }

    pub fn geometry() -> Self {
        Self::new(Some(&GEOMETRY_FILTERS[..]))
    }

    fn accepts(&self, kind: Option<PrimKind>) -> bool {
        match &self.0 {
            None => true,
            Some(kinds) => kind.is_some_and(|k| kinds.contains(&k)),
        }
    }
}

fn is_hidden(parent: &ObjectPath, child: &ObjectPath) -> bool {
    let name = child.name();
    name.starts_with(INTERNAL_PREFIX) || (parent.is_root() && name == RENDER_SCOPE)
}

fn visible_children<'a>(
    scene: &'a dyn SceneHost,
    path: &'a ObjectPath,
    filter: &'a KindFilter,
) -> impl Iterator<Item = ObjectPath> + 'a {
    scene
        .children(path)
        .into_iter()
        .filter(move |child| filter.accepts(scene.kind(child)) && !is_hidden(path, child))
}

/// Nested listing of the children of `path`, `depth` levels deep.
///
/// Entries that have children of their own get a nested list; once `depth`
/// runs out that list is left empty so the client knows it can expand it.
/// Unknown paths yield an empty listing.
pub fn list_children(
    scene: &dyn SceneHost,
    path: &ObjectPath,
    filter: &KindFilter,
    depth: u32,
) -> Vec<ChildEntry> {
    if !scene.exists(path) {
        return Vec::new();
    }
    visible_children(scene, path, filter)
        .map(|child| {
            let children = if scene.children(&child).is_empty() {
                None
            } else if depth > 0 {
                Some(list_children(scene, &child, filter, depth - 1))
            } else {
                Some(Vec::new())
            };
            ChildEntry {
                name: child.name().to_string(),
                path: child.to_string(),
                children,
            }
        })
        .collect()
}

/// Flat list of filtered descendants of `path`, `depth` levels deep.
pub fn descendants(
    scene: &dyn SceneHost,
    path: &ObjectPath,
    filter: &KindFilter,
    depth: u32,
) -> Vec<ObjectPath> {
    let mut out = Vec::new();
    collect_descendants(scene, path, filter, depth, &mut out);
    out
}

fn collect_descendants(
    scene: &dyn SceneHost,
    path: &ObjectPath,
    filter: &KindFilter,
    depth: u32,
    out: &mut Vec<ObjectPath>,
) {
    for child in visible_children(scene, path, filter) {
        if depth > 0 {
            out.push(child.clone());
            collect_descendants(scene, &child, filter, depth - 1, out);
        } else {
            out.push(child);
        }
    }
}
