//! Error kinds surfaced by the store, lifecycle and gate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::issue::{IssueId, Status};

/// Result alias for governance operations.
pub type Result<T> = std::result::Result<T, GovernanceError>;

/// Every failure the engine reports to its caller.
///
/// None of these are retried automatically except [`GovernanceError::LockTimeout`],
/// which the store retries a bounded number of times before giving up.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// A required field for the requested operation is missing or blank.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transition out of a terminal state, or one the state machine does not define.
    #[error("issue {id} cannot move from {from} to {to}")]
    InvalidTransition { id: IssueId, from: Status, to: Status },

    #[error("issue {0} not found")]
    NotFound(IssueId),

    #[error("issue id {0} already exists in the ledger")]
    DuplicateId(IssueId),

    #[error("could not lock {} within {}ms", path.display(), waited.as_millis())]
    LockTimeout { path: PathBuf, waited: Duration },

    /// A persisted line failed to parse. Never skipped.
    #[error("malformed record at {}:{line}: {source}", path.display())]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("ledger I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl GovernanceError {
    /// Stable kebab-case name printed by the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            GovernanceError::Validation(_) => "validation-error",
            GovernanceError::InvalidTransition { .. } => "invalid-transition",
            GovernanceError::NotFound(_) => "not-found",
            GovernanceError::DuplicateId(_) => "duplicate-id",
            GovernanceError::LockTimeout { .. } => "lock-timeout",
            GovernanceError::MalformedRecord { .. } => "malformed-record",
            GovernanceError::Io(_) => "io-error",
        }
    }

    /// Remediation hint shown under the error message.
    pub fn hint(&self) -> &'static str {
        match self {
            GovernanceError::Validation(_) => {
                "supply the missing field (e.g. --commit, --by, --reason) and retry"
            }
            GovernanceError::InvalidTransition { .. } => {
                "resolved and deferred issues are final; add a note or create a superseding issue"
            }
            GovernanceError::NotFound(_) => "run 'contentgate list' to see known issue ids",
            GovernanceError::DuplicateId(_) => "omit --id to let the ledger assign the next id",
            GovernanceError::LockTimeout { .. } => {
                "another contentgate process holds the ledger; wait for it and retry"
            }
            GovernanceError::MalformedRecord { .. } => {
                "fix or restore the named line from version control; records are never skipped"
            }
            GovernanceError::Io(_) => "check the ledger path and its permissions",
        }
    }

    /// Whether a caller may retry the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GovernanceError::LockTimeout { .. })
    }
}
