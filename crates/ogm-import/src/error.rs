use ogm_backend::BackendError;
use ogm_store::StoreError;
use ogm_types::{Id, TypeError};

/// Errors raised while importing a model.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// An element was declared twice.
    #[error("element {0} is already defined")]
    DuplicateElement(Id),

    /// An event refers to an element that was never declared.
    #[error("unknown element: {0}")]
    UnknownElement(Id),

    #[error("document not started")]
    NotStarted,

    /// A malformed event line.
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ImportResult<T> = Result<T, ImportError>;
