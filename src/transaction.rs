// Copyright 2025 Cowboy AI, LLC.

//! The external transactional resource
//!
//! The engine never stores data itself. It asks a [`TransactionManager`] to
//! open, commit or roll back the single region a call tree runs in.

use crate::errors::TransactionError;
use crate::isolation::IsolationLevel;
use std::sync::{Arc, PoisonError, RwLock};

/// Begin/commit/rollback at a requested isolation level
pub trait TransactionManager: Send + Sync {
    /// Open a transaction at `isolation`
    fn begin(&self, isolation: IsolationLevel) -> Result<(), TransactionError>;

    /// Commit the open transaction
    fn commit(&self) -> Result<(), TransactionError>;

    /// Roll back the open transaction
    fn rollback(&self) -> Result<(), TransactionError>;
}

/// Manager that accepts every request and does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransactions;

impl TransactionManager for NoTransactions {
    fn begin(&self, _isolation: IsolationLevel) -> Result<(), TransactionError> {
        Ok(())
    }

    fn commit(&self) -> Result<(), TransactionError> {
        Ok(())
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        Ok(())
    }
}

/// A request received by a [`RecordingTransactionManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionCall {
    /// `begin` at the given level
    Begin(IsolationLevel),
    /// `commit`
    Commit,
    /// `rollback`
    Rollback,
}

/// Recording transaction manager for testing
///
/// Tracks whether a transaction is open and rejects commit or rollback
/// without one, so misuse shows up as an error.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransactionManager {
    calls: Arc<RwLock<Vec<TransactionCall>>>,
    open: Arc<RwLock<Option<IsolationLevel>>>,
}

impl RecordingTransactionManager {
    /// Create a new recording manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request received, in order
    pub fn calls(&self) -> Vec<TransactionCall> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of transactions begun
    pub fn begin_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, TransactionCall::Begin(_)))
            .count()
    }

    /// Isolation of the open transaction, if one is open
    pub fn open_transaction(&self) -> Option<IsolationLevel> {
        *self.open.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: TransactionCall) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn close(&self) -> Result<IsolationLevel, TransactionError> {
        self.open
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransactionError::NoActiveTransaction)
    }
}

impl TransactionManager for RecordingTransactionManager {
    fn begin(&self, isolation: IsolationLevel) -> Result<(), TransactionError> {
        let mut open = self.open.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = *open {
            return Err(TransactionError::BeginFailed {
                isolation,
                reason: format!("a {current} transaction is already open"),
            });
        }
        *open = Some(isolation);
        drop(open);
        self.record(TransactionCall::Begin(isolation));
        Ok(())
    }

    fn commit(&self) -> Result<(), TransactionError> {
        self.close()?;
        self.record(TransactionCall::Commit);
        Ok(())
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        self.close()?;
        self.record(TransactionCall::Rollback);
        Ok(())
    }
}
