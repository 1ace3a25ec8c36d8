use std::fmt;

use serde::{Deserialize, Serialize};

use crate::feature::Feature;
use crate::id::Id;

/// `(element, feature name)` pair.
///
/// Equality and hashing use both fields. Caches and the map backend key
/// their entries by it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureKey {
    pub id: Id,
    pub feature: String,
}

impl FeatureKey {
    pub fn new(id: Id, feature: impl Into<String>) -> Self {
        Self {
            id,
            feature: feature.into(),
        }
    }

    pub fn of(id: &Id, feature: &Feature) -> Self {
        Self::new(id.clone(), feature.name())
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.id, self.feature)
    }
}
