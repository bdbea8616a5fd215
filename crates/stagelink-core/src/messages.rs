//! Named messages exchanged with the streaming client.
//!
//! Every message travels as `{ "event_type": <name>, "payload": {...} }`.
//! Inbound payload fields are optional at the type level: a request missing a
//! required field still parses, and the owning handler decides how to treat it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::MessageError;
use crate::ids::AssetId;

/// Wire shape of every inbound and outbound message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct OpenStagePayload {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct GetChildrenPayload {
    #[serde(default)]
    pub prim_path: Option<String>,
    #[serde(default)]
    pub filters: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct PathsPayload {
    #[serde(default)]
    pub paths: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SetStatusPayload {
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub asset_status: Option<String>,
}

/// Requests the client may send.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    OpenStageRequest(OpenStagePayload),
    LoadingStateQuery,
    GetChildrenRequest(GetChildrenPayload),
    SelectPrimsRequest(PathsPayload),
    MakePrimsPickable(PathsPayload),
    ResetStage,
    SetStatusRequest(SetStatusPayload),
}

impl InboundMessage {
    pub const OPEN_STAGE_REQUEST: &'static str = "openStageRequest";
    pub const LOADING_STATE_QUERY: &'static str = "loadingStateQuery";
    pub const GET_CHILDREN_REQUEST: &'static str = "getChildrenRequest";
    pub const SELECT_PRIMS_REQUEST: &'static str = "selectPrimsRequest";
    pub const MAKE_PRIMS_PICKABLE: &'static str = "makePrimsPickable";
    pub const RESET_STAGE: &'static str = "resetStage";
    pub const SET_STATUS_REQUEST: &'static str = "setStatusRequest";

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenStageRequest(_) => Self::OPEN_STAGE_REQUEST,
            Self::LoadingStateQuery => Self::LOADING_STATE_QUERY,
            Self::GetChildrenRequest(_) => Self::GET_CHILDREN_REQUEST,
            Self::SelectPrimsRequest(_) => Self::SELECT_PRIMS_REQUEST,
            Self::MakePrimsPickable(_) => Self::MAKE_PRIMS_PICKABLE,
            Self::ResetStage => Self::RESET_STAGE,
            Self::SetStatusRequest(_) => Self::SET_STATUS_REQUEST,
        }
    }

    /// Decode one line of wire JSON.
    pub fn from_json(raw: &str) -> Result<Self, MessageError> {
        let envelope: MessageEnvelope = serde_json::from_str(raw)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: MessageEnvelope) -> Result<Self, MessageError> {
        let MessageEnvelope { event_type, payload } = envelope;
        let msg = match event_type.as_str() {
            Self::OPEN_STAGE_REQUEST => Self::OpenStageRequest(payload_as(&event_type, payload)?),
            Self::LOADING_STATE_QUERY => Self::LoadingStateQuery,
            Self::GET_CHILDREN_REQUEST => Self::GetChildrenRequest(payload_as(&event_type, payload)?),
            Self::SELECT_PRIMS_REQUEST => Self::SelectPrimsRequest(payload_as(&event_type, payload)?),
            Self::MAKE_PRIMS_PICKABLE => Self::MakePrimsPickable(payload_as(&event_type, payload)?),
            Self::RESET_STAGE => Self::ResetStage,
            Self::SET_STATUS_REQUEST => Self::SetStatusRequest(payload_as(&event_type, payload)?),
            _ => return Err(MessageError::UnknownEventType(event_type)),
        };
        Ok(msg)
    }
}

/// Null or absent payloads decode as the all-defaults payload.
fn payload_as<T: DeserializeOwned + Default>(
    event_type: &str,
    payload: serde_json::Value,
) -> Result<T, MessageError> {
    if payload.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(payload).map_err(|source| MessageError::InvalidPayload {
        event_type: event_type.to_string(),
        source,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpResult {
    Success,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingState {
    Busy,
    Idle,
}

/// One entry of a `getChildrenResponse` listing.
///
/// `children` is absent for leaves and an empty list for objects that have
/// children which were not expanded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ChildEntry>>,
}

/// Notifications and replies sent to the client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "camelCase")]
pub enum OutboundMessage {
    OpenedStageResult {
        url: String,
        result: OpResult,
        error: String,
    },
    UpdateProgressAmount(serde_json::Value),
    UpdateProgressActivity(serde_json::Value),
    LoadingStateResponse {
        loading_state: LoadingState,
        url: String,
    },
    StageSelectionChanged {
        prims: Vec<AssetId>,
    },
    GetChildrenResponse {
        prim_path: String,
        children: Vec<ChildEntry>,
    },
    MakePrimsPickableResponse {
        result: OpResult,
        error: String,
    },
    ResetStageResponse {
        result: OpResult,
        error: String,
    },
}

impl OutboundMessage {
    pub const OPENED_STAGE_RESULT: &'static str = "openedStageResult";
    pub const UPDATE_PROGRESS_AMOUNT: &'static str = "updateProgressAmount";
    pub const UPDATE_PROGRESS_ACTIVITY: &'static str = "updateProgressActivity";
    pub const LOADING_STATE_RESPONSE: &'static str = "loadingStateResponse";
    pub const STAGE_SELECTION_CHANGED: &'static str = "stageSelectionChanged";
    pub const GET_CHILDREN_RESPONSE: &'static str = "getChildrenResponse";
    pub const MAKE_PRIMS_PICKABLE_RESPONSE: &'static str = "makePrimsPickableResponse";
    pub const RESET_STAGE_RESPONSE: &'static str = "resetStageResponse";

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenedStageResult { .. } => Self::OPENED_STAGE_RESULT,
            Self::UpdateProgressAmount(_) => Self::UPDATE_PROGRESS_AMOUNT,
            Self::UpdateProgressActivity(_) => Self::UPDATE_PROGRESS_ACTIVITY,
            Self::LoadingStateResponse { .. } => Self::LOADING_STATE_RESPONSE,
            Self::StageSelectionChanged { .. } => Self::STAGE_SELECTION_CHANGED,
            Self::GetChildrenResponse { .. } => Self::GET_CHILDREN_RESPONSE,
            Self::MakePrimsPickableResponse { .. } => Self::MAKE_PRIMS_PICKABLE_RESPONSE,
            Self::ResetStageResponse { .. } => Self::RESET_STAGE_RESPONSE,
        }
    }

    /// Success/error reply pair shared by the opened-stage result.
    pub fn opened_stage(url: impl Into<String>, outcome: Result<(), String>) -> Self {
        let (result, error) = split_outcome(outcome);
        Self::OpenedStageResult {
            url: url.into(),
            result,
            error,
        }
    }

    pub fn make_pickable_response(outcome: Result<(), String>) -> Self {
        let (result, error) = split_outcome(outcome);
        Self::MakePrimsPickableResponse { result, error }
    }

    pub fn reset_stage_response(outcome: Result<(), String>) -> Self {
        let (result, error) = split_outcome(outcome);
        Self::ResetStageResponse { result, error }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn split_outcome(outcome: Result<(), String>) -> (OpResult, String) {
    match outcome {
        Ok(()) => (OpResult::Success, String::new()),
        Err(message) => (OpResult::Error, message),
    }
}
