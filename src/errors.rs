//! Metadata Store Error Hierarchy
//!
//! Defines error types for the distributed metadata store, categorized by
//! the layer that produced them: local store-level validation, the remote
//! coordination service, and value conversion.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local, synchronous failures: argument validation and lifecycle misuse
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Failures reported by (or on the way to) the coordination service
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Value byte-encoding failures
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Caller-visible failures raised before any remote round-trip.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An argument would corrupt the hierarchical path mapping.
    /// Keys must stay direct children of the store root.
    #[error("'{argument}' must not contain {rejected:?}.")]
    InvalidArgument {
        argument: &'static str,
        rejected: char,
    },

    /// Operation attempted outside the started lifecycle window
    #[error("MetadataStore has to be started before using.")]
    NotStarted,
}

/// Outcomes of coordination-service node operations.
///
/// `NodeExists` and `BadVersion` are the service's conditional-write
/// primitives losing a race; the store engine translates them into normal
/// negative results (`put_if_absent` returning the existing value,
/// `replace` returning `false`) rather than surfacing them to callers.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Atomic create refused: the node is already present
    #[error("Node already exists: {path}")]
    NodeExists { path: String },

    /// Read/update/delete addressed a node that is not there
    #[error("No node at: {path}")]
    NoNode { path: String },

    /// A version precondition on a conditional write did not hold
    #[error("Version conflict at {path}: expected {expected}, found {actual}")]
    BadVersion {
        path: String,
        expected: i64,
        actual: i64,
    },

    /// Session to the coordination service lost or not established
    #[error("Coordination session lost: {0}")]
    SessionLost(String),

    /// A bounded retry loop gave up
    #[error("Retry timeout after {0:?}")]
    RetryTimeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Value bytes are not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    pub(crate) fn is_no_node(&self) -> bool {
        matches!(self, Error::Coordination(CoordinationError::NoNode { .. }))
    }

    pub(crate) fn is_node_exists(&self) -> bool {
        matches!(self, Error::Coordination(CoordinationError::NodeExists { .. }))
    }

    pub(crate) fn is_bad_version(&self) -> bool {
        matches!(self, Error::Coordination(CoordinationError::BadVersion { .. }))
    }
}
