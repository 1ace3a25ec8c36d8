use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier reserved for the synthetic root element of a resource.
pub const ROOT_ID: &str = "ROOT";

/// Opaque identifier of a model element.
///
/// Ids are immutable once assigned. Two ids are equal iff their string
/// forms are equal, and the string form is what lands in the backend as
/// the node key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Build an id from its string form. Empty strings are rejected.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(TypeError::InvalidId("identifier must not be empty".into()));
        }
        Ok(Self(value))
    }

    /// Fresh, time-ordered unique id (UUID v7).
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// The synthetic root id used by resources and the import handler.
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    /// Create from a raw string without validation. Use `new()` for input.
    pub fn from_raw(value: &str) -> Self {
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Id {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
