use ogm_types::{Id, TypeError};

/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend was used after close, or its on-disk marker names a
    /// different backend kind.
    #[error("invalid store: {0}")]
    InvalidStore(String),

    /// A node exists but carries no conformance edge to a metaclass.
    #[error("no class information for element {0}")]
    MissingClassInfo(Id),

    /// The requested node does not exist.
    #[error("node not found: {0}")]
    NodeNotFound(Id),

    /// The requested edge does not exist.
    #[error("edge not found: {0}")]
    EdgeNotFound(u64),

    /// A persisted snapshot failed its integrity check.
    #[error("corrupt snapshot {path}: {reason}")]
    CorruptSnapshot { path: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
