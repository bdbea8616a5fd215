/// Failures reported by a scene host.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("invalid object path: '{0}'")]
    InvalidPath(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("no active camera")]
    NoCamera,

    #[error("failed to open '{url}': {reason}")]
    OpenFailed { url: String, reason: String },
}

/// Failures decoding an inbound message envelope.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("invalid payload for {event_type}: {source}")]
    InvalidPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}
