//! Error types for the StackSet reconciler

use std::time::Duration;

use thiserror::Error;

/// Remote resource kinds that can be reported as missing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    StackSet,
    Operation,
    StackInstance,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::StackSet => "stack set",
            ResourceKind::Operation => "stack set operation",
            ResourceKind::StackInstance => "stack instance",
        };
        write!(f, "{}", s)
    }
}

/// Conflicting mutations rejected by the remote system
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictKind {
    /// Another creator won the race for the stack set name
    AlreadyExists,
    /// An operation is already running against the stack set
    OperationInProgress,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::AlreadyExists => write!(f, "already exists"),
            ConflictKind::OperationInProgress => write!(f, "operation in progress"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// The stack set, operation or instance does not exist
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    /// The remote system rejected an overlapping mutation
    #[error("conflict on {name}: {kind}")]
    Conflict { kind: ConflictKind, name: String },

    /// Any other error returned by the remote API
    #[error("{operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },

    /// A successful response lacked a field the reconciler depends on
    #[error("{operation} response is missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    /// A wait ran past the reconciliation deadline
    #[error("timed out after {elapsed:?} waiting for {waiting_for}")]
    Timeout {
        waiting_for: String,
        elapsed: Duration,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_conflict(&self, kind: ConflictKind) -> bool {
        matches!(self, Error::Conflict { kind: k, .. } if *k == kind)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_predicate_matches_kind() {
        let err = Error::Conflict {
            kind: ConflictKind::AlreadyExists,
            name: "rules-123".to_string(),
        };
        assert!(err.is_conflict(ConflictKind::AlreadyExists));
        assert!(!err.is_conflict(ConflictKind::OperationInProgress));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::NotFound {
            kind: ResourceKind::StackInstance,
            name: "rules-123/us-east-1".to_string(),
        };
        assert_eq!(err.to_string(), "stack instance not found: rules-123/us-east-1");

        let err = Error::MissingField {
            operation: "CreateStackInstances",
            field: "OperationId",
        };
        assert_eq!(
            err.to_string(),
            "CreateStackInstances response is missing OperationId"
        );
    }
}
