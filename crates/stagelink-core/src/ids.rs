use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::SceneError;

/// Absolute path of an object in the scene hierarchy (`/`, `/World/Robot`).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath(String);

impl ObjectPath {
    /// The pseudo-root `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Validate and normalize a path. Trailing slashes are dropped; empty
    /// segments are rejected.
    pub fn parse(s: &str) -> Result<Self, SceneError> {
        if !s.starts_with('/') {
            return Err(SceneError::InvalidPath(s.to_string()));
        }
        let trimmed = s.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        if trimmed[1..].split('/').any(|segment| segment.is_empty()) {
            return Err(SceneError::InvalidPath(s.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Last path segment; empty for the root.
    pub fn name(&self) -> &str {
        if self.is_root() {
            return "";
        }
        self.0.rsplit('/').next().unwrap_or("")
    }

    pub fn parent(&self) -> Option<ObjectPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    pub fn child(&self, name: &str) -> ObjectPath {
        if self.is_root() {
            Self(format!("/{name}"))
        } else {
            Self(format!("{}/{name}", self.0))
        }
    }

    /// This path followed by each ancestor up to (excluding) the root.
    pub fn ancestors(&self) -> impl Iterator<Item = ObjectPath> {
        std::iter::successors(Some(self.clone()), ObjectPath::parent).filter(|p| !p.is_root())
    }

    /// True when `self` is `other` or lies beneath it.
    pub fn has_prefix(&self, other: &ObjectPath) -> bool {
        other.is_root()
            || self.0 == other.0
            || (self.0.starts_with(&other.0) && self.0.as_bytes().get(other.0.len()) == Some(&b'/'))
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectPath {
    type Err = SceneError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = SceneError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ObjectPath> for String {
    fn from(p: ObjectPath) -> Self {
        p.0
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque identifier the client uses for a tagged object.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AssetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
