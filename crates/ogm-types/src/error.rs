use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("unknown feature kind '{kind}' for feature '{feature}'")]
    UnknownFeatureKind { feature: String, kind: String },

    #[error("invalid feature descriptor '{feature}': {reason}")]
    InvalidDescriptor { feature: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}
