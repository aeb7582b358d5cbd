//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

/// Stage names carried by [`EngineError::Transaction`].
pub mod stage {
    pub const BPMN_DEPLOYMENT: &str = "BPMN deployment to Flowable";
    pub const PERMISSION_COPY: &str = "Permission copying";
    pub const VERSION_ACTIVATION: &str = "Version activation";
    pub const COMMIT: &str = "Transaction commit";
    pub const ROLLBACK: &str = "Rollback operation";
}

/// Rejected input.  Always raised before any write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid semantic version '{0}': expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),

    #[error("invalid change type '{0}': expected one of major, minor, patch")]
    InvalidChangeType(String),

    #[error("version already exists: {version} of function unit '{name}'")]
    VersionAlreadyExists { name: String, version: String },

    #[error("version {version} of function unit '{name}' is already active")]
    AlreadyActive { name: String, version: String },

    /// The component a `change` bump would raise is already at its maximum.
    #[error("cannot apply a {change} change to {version}: component overflow")]
    VersionOverflow { version: String, change: String },
}

/// Errors produced by the deployment engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Unknown function unit or version id.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// The operation is not allowed in the resource's current state.
    #[error("invalid state: {0}")]
    State(String),

    /// The workflow engine produced no deployment.
    #[error("workflow engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Transport or API failure talking to the workflow engine.
    #[error("workflow engine client error: {0}")]
    Client(#[from] flowable::ClientError),

    /// A multi-step deployment or rollback failed; the store transaction was
    /// rolled back.
    #[error("{stage} failed: {source}")]
    Transaction {
        stage: &'static str,
        #[source]
        source: Box<EngineError>,
    },

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}

impl EngineError {
    pub(crate) fn version_not_found(id: Uuid) -> Self {
        Self::NotFound { kind: "function unit version", key: id.to_string() }
    }

    pub(crate) fn no_active_version(name: &str) -> Self {
        Self::NotFound { kind: "active version of function unit", key: name.to_owned() }
    }

    /// Stage name when this is a [`EngineError::Transaction`].
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Self::Transaction { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
