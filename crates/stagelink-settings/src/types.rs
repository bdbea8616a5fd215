//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the keys it overrides.

use serde::{Deserialize, Serialize};

/// Root settings for the messaging host.
///
/// ```json
/// {
///   "tagAttribute": "asset_id",
///   "loading": { "autoLoadUrl": "./samples/plant.json" },
///   "selection": { "anchorEnabled": true }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageLinkSettings {
    /// Attribute correlating scene objects with client identifiers.
    pub tag_attribute: String,
    pub loading: LoadingSettings,
    pub selection: SelectionSettings,
    pub status: StatusSettings,
    pub runtime: RuntimeSettings,
}

impl Default for StageLinkSettings {
    fn default() -> Self {
        Self {
            tag_attribute: "asset_id".to_string(),
            loading: LoadingSettings::default(),
            selection: SelectionSettings::default(),
            status: StatusSettings::default(),
            runtime: RuntimeSettings::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadingSettings {
    /// Document opened at startup, before any client connects.
    pub auto_load_url: Option<String>,
    /// Directory substituted for the `${app}` token.
    pub app_root: String,
    /// Frames to wait before the startup auto-load.
    pub auto_load_delay_ticks: u32,
    /// Debounce frames after streaming settles, before notifying the client.
    pub settle_ticks: u32,
    /// Upper bound on frames spent waiting for streaming to settle.
    pub settle_timeout_ticks: Option<u64>,
    /// Forward host progress/activity events to the client.
    pub forward_progress: bool,
}

impl Default for LoadingSettings {
    fn default() -> Self {
        Self {
            auto_load_url: None,
            app_root: default_app_root(),
            auto_load_delay_ticks: 5,
            settle_ticks: 2,
            settle_timeout_ticks: None,
            forward_progress: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectionSettings {
    /// Keep a synthetic object selected so selection groups always render.
    pub anchor_enabled: bool,
    pub anchor_path: String,
    /// Root under which tagged objects are made pickable.
    pub world_root: String,
    pub pickable_depth: u32,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            anchor_enabled: true,
            anchor_path: "/dummy".to_string(),
            world_root: "/World".to_string(),
            pickable_depth: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusSettings {
    /// How deep below a tagged object its status group is propagated.
    pub descendant_depth: u32,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self { descendant_depth: 5 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeSettings {
    /// Interval between host updates driven by the binary.
    pub tick_interval_ms: u64,
    /// Capacity of the scene-event and outbound message channels.
    pub event_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            event_capacity: 1024,
        }
    }
}

/// Directory of the running executable, or `.` when it cannot be determined.
fn default_app_root() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.display().to_string()))
        .unwrap_or_else(|| ".".to_string())
}
