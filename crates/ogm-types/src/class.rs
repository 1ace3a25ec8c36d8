use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::Id;

/// Namespace of the synthetic classes owned by OGM itself.
pub const CORE_NS_URI: &str = "ogm:core";

/// Class an element conforms to, identified by name and namespace URI.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub ns_uri: String,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>, ns_uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ns_uri: ns_uri.into(),
        }
    }

    /// Class of the synthetic root element created at import start.
    pub fn root() -> Self {
        Self::new("Root", CORE_NS_URI)
    }

    /// Id of the metaclass node recording this class in the backend.
    ///
    /// The form is `name@nsUri`, so the same class always maps to the same
    /// node and the metaclass index needs no separate lookup table.
    pub fn metaclass_id(&self) -> Id {
        Id::from_raw(&format!("{}@{}", self.name, self.ns_uri))
    }
}

impl fmt::Display for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.ns_uri)
    }
}
