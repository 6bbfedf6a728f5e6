// Copyright 2025 Cowboy AI, LLC.

//! Error types for operation composition
//!
//! Two layers live here. [`RoutineError`] is a hard failure: it escapes the
//! call tree synchronously and indicates either a composition bug (isolation
//! mismatch, invalid argument) or a collected error explicitly surfaced by
//! the caller. [`Halt`] is the control-flow value an operation body returns
//! to leave its invocation early.

use crate::isolation::IsolationLevel;
use std::sync::Arc;
use thiserror::Error;

/// Errors that escape an operation call tree
#[derive(Debug, Clone, Error)]
pub enum RoutineError {
    /// A nested operation needs a stricter isolation than the call tree provides
    #[error(
        "Isolation mismatch: `{operation}` requires {required} but the call tree rooted at \
         `{topmost}` runs at {available}; declare it with `uses` in the running operation"
    )]
    IsolationMismatch {
        /// Key of the operation being linked
        operation: String,
        /// Isolation the linked operation declares
        required: IsolationLevel,
        /// Key of the topmost runner
        topmost: String,
        /// Isolation the topmost runner uses
        available: IsolationLevel,
    },

    /// Misuse of the composition API
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Call tree exceeded the configured nesting depth
    #[error("Maximum nesting depth {max_depth} exceeded while running `{operation}`")]
    DepthExceeded {
        /// Operation that would have exceeded the limit
        operation: String,
        /// Configured limit
        max_depth: usize,
    },

    /// Collected errors surfaced through `raise_if_any`
    #[error("Operation errors: {0}")]
    Accumulated(String),

    /// An external failure re-signaled from an exception error
    #[error("{0}")]
    Exception(Arc<anyhow::Error>),

    /// The transactional resource manager refused a request
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for composition operations
pub type RoutineResult<T> = Result<T, RoutineError>;

impl From<serde_json::Error> for RoutineError {
    fn from(err: serde_json::Error) -> Self {
        RoutineError::SerializationError(err.to_string())
    }
}

impl From<anyhow::Error> for RoutineError {
    fn from(err: anyhow::Error) -> Self {
        RoutineError::Exception(Arc::new(err))
    }
}

impl RoutineError {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        RoutineError::InvalidArgument(msg.into())
    }

    /// Check if this is an isolation mismatch
    pub fn is_isolation_mismatch(&self) -> bool {
        matches!(self, RoutineError::IsolationMismatch { .. })
    }

    /// Check if this is an invalid argument error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, RoutineError::InvalidArgument(_))
    }

    /// The original external failure, when this error re-signals one
    pub fn exception(&self) -> Option<&anyhow::Error> {
        match self {
            RoutineError::Exception(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Errors reported by a [`crate::TransactionManager`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The transaction could not be opened
    #[error("Failed to begin transaction at {isolation}: {reason}")]
    BeginFailed {
        /// Requested isolation
        isolation: IsolationLevel,
        /// Reason reported by the resource manager
        reason: String,
    },

    /// Commit was refused
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// Rollback was refused
    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    /// No transaction is open
    #[error("No active transaction")]
    NoActiveTransaction,
}

/// Early exit from an operation body
///
/// `Fatal` is the short-circuit raised by fatal errors; it ends exactly one
/// invocation and is caught by that invocation's `call`. `Failed` carries a
/// hard failure through every boundary up to the outermost caller.
#[derive(Debug, Clone, Error)]
pub enum Halt {
    /// Fatal errors were collected; stop the current invocation
    #[error("fatal errors encountered")]
    Fatal,

    /// A hard failure that escapes the call tree
    #[error(transparent)]
    Failed(#[from] RoutineError),
}

impl From<anyhow::Error> for Halt {
    fn from(err: anyhow::Error) -> Self {
        Halt::Failed(err.into())
    }
}

impl From<TransactionError> for Halt {
    fn from(err: TransactionError) -> Self {
        Halt::Failed(err.into())
    }
}

impl Halt {
    /// Check if this is the fatal short-circuit
    pub fn is_fatal(&self) -> bool {
        matches!(self, Halt::Fatal)
    }
}

/// Return type of operation bodies and nested runs
pub type Flow<T = ()> = Result<T, Halt>;
