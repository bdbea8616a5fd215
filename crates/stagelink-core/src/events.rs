use serde::{Deserialize, Serialize};

/// Lifecycle and state-change notifications emitted by the scene host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneEvent {
    /// A document started opening. `url` is `None` for a blank document.
    Opening { url: Option<String> },
    Opened,
    /// All assets referenced by the open document finished loading.
    AssetsLoaded,
    SelectionChanged,
    /// Transport streaming manager reported its busy state.
    StreamingStatus { busy: bool },
    Progress { payload: serde_json::Value },
    Activity { payload: serde_json::Value },
    Closed,
}

impl SceneEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Opening { .. } => "opening",
            Self::Opened => "opened",
            Self::AssetsLoaded => "assets_loaded",
            Self::SelectionChanged => "selection_changed",
            Self::StreamingStatus { .. } => "streaming_status",
            Self::Progress { .. } => "progress",
            Self::Activity { .. } => "activity",
            Self::Closed => "closed",
        }
    }
}
