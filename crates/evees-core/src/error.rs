//! Error taxonomy for the versioning engine.
//!
//! Lower-level store errors propagate unchanged through the merge algorithm;
//! nothing is suppressed locally, so a partial merge can never appear to
//! succeed.

use crate::behavior::TypeTag;
use evees_cas::{CasError, Cid};
use thiserror::Error;

/// Errors that can occur in versioning operations.
#[derive(Error, Debug, Clone)]
pub enum EveesError {
    /// Integrity/not-found/serialization failures from the CAS layer.
    #[error(transparent)]
    Cas(#[from] CasError),

    /// A perspective id could not be resolved by any remote or cache.
    #[error("perspective not found: {0}")]
    PerspectiveNotFound(Cid),

    /// A data type has no registered merge behavior. A configuration or
    /// programming error, never retried.
    #[error("no merge behavior registered for type {0}")]
    MergeableNotImplemented(TypeTag),

    /// No registered recognizer matched the object.
    #[error("unrecognized data type for entity {0}")]
    UnrecognizedType(Cid),

    /// The caller is not allowed to update the perspective head.
    #[error("permission denied for perspective {0}")]
    PermissionDenied(Cid),

    /// A mutation named a remote no router knows about.
    #[error("unknown remote: {0}")]
    RemoteNotFound(String),

    /// A flush failed; the staging buffer was left intact for retry.
    #[error("flush failed: {0}")]
    Flush(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EveesError {
    fn from(err: serde_json::Error) -> Self {
        EveesError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EveesError>;
