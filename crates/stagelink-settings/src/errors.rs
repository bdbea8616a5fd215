use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A value parsed but cannot drive the host (zero tick interval, empty
    /// tag attribute, ...).
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;
