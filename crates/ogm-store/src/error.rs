use ogm_backend::BackendError;
use ogm_types::{Id, TypeError};

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An index outside `0..size` (or `0..=size` for insertion).
    #[error("index {index} out of range for size {size}")]
    OutOfRange { index: usize, size: usize },

    /// A many-valued read or replace was issued without an index.
    #[error("feature '{0}' is many-valued and needs an index")]
    IndexRequired(String),

    /// A feature that is neither an attribute nor a reference.
    #[error("unknown feature kind: {0}")]
    UnknownFeatureKind(String),

    /// A node has no resolvable class.
    #[error("no class information for element {0}")]
    MissingClassInfo(Id),

    /// The store or its backend is unusable (closed, or wrong backend kind).
    #[error("invalid store: {0}")]
    InvalidStore(String),

    /// Persisted bookkeeping disagrees with the data it describes.
    #[error("structural inconsistency at {id}: {reason}")]
    StructuralInconsistency { id: Id, reason: String },

    /// A value of the wrong shape for the feature.
    #[error("invalid value for feature '{feature}': {reason}")]
    InvalidValue { feature: String, reason: String },

    #[error("element not found: {0}")]
    ElementNotFound(Id),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Backend(BackendError),
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::MissingClassInfo(id) => StoreError::MissingClassInfo(id),
            BackendError::InvalidStore(reason) => StoreError::InvalidStore(reason),
            other => StoreError::Backend(other),
        }
    }
}

impl From<TypeError> for StoreError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::UnknownFeatureKind { kind, .. } => StoreError::UnknownFeatureKind(kind),
            other => StoreError::Backend(BackendError::Type(other)),
        }
    }
}

impl StoreError {
    pub(crate) fn inconsistent(id: &Id, reason: impl Into<String>) -> Self {
        StoreError::StructuralInconsistency {
            id: id.clone(),
            reason: reason.into(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
