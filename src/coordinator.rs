// Copyright 2025 Cowboy AI, LLC.

//! Isolation coordination
//!
//! A call tree runs inside at most one transaction, opened by its root at
//! the root's widened isolation. Nested operations may only join a tree
//! whose isolation is at least as strict as their own.

use crate::descriptor::OperationDescriptor;
use crate::errors::{RoutineError, RoutineResult, TransactionError};
use crate::outcome::Outcome;
use crate::transaction::TransactionManager;
use tracing::{info, warn};

/// Check that `target` may run below `topmost`
pub(crate) fn ensure_linkable(
    topmost: &OperationDescriptor,
    target: &OperationDescriptor,
) -> RoutineResult<()> {
    if topmost.isolation().weaker_than(target.isolation()) {
        warn!(
            operation = %target.key(),
            required = %target.isolation(),
            topmost = %topmost.key(),
            available = %topmost.isolation(),
            "Isolation mismatch"
        );
        return Err(RoutineError::IsolationMismatch {
            operation: target.key().to_string(),
            required: target.isolation(),
            topmost: topmost.key().to_string(),
            available: topmost.isolation(),
        });
    }
    Ok(())
}

/// An open transaction; rolled back on drop unless settled
struct Region<'m> {
    manager: &'m dyn TransactionManager,
    open: bool,
}

impl Region<'_> {
    fn commit(&mut self) -> Result<(), TransactionError> {
        self.manager.commit()?;
        self.open = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), TransactionError> {
        self.open = false;
        self.manager.rollback()
    }
}

impl Drop for Region<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.manager.rollback() {
                warn!(error = %err, "Rollback of abandoned transaction was refused");
            }
        }
    }
}

/// Run the root invocation `body` inside the region `root` owns
///
/// Roots at [`crate::IsolationLevel::None`] run without a transaction. The
/// region rolls back when the outcome holds errors or the body fails, and
/// commits otherwise.
pub(crate) fn within_region<F>(
    manager: &dyn TransactionManager,
    root: &OperationDescriptor,
    body: F,
) -> RoutineResult<Outcome>
where
    F: FnOnce() -> RoutineResult<Outcome>,
{
    let isolation = root.isolation();
    if !isolation.is_transactional() {
        return body();
    }

    manager.begin(isolation)?;
    info!(operation = %root.key(), %isolation, "Transaction opened");
    let mut region = Region {
        manager,
        open: true,
    };

    match body() {
        Ok(outcome) if outcome.has_errors() => {
            region.rollback()?;
            info!(
                operation = %root.key(),
                errors = outcome.errors().len(),
                "Transaction rolled back"
            );
            Ok(outcome)
        }
        Ok(outcome) => {
            region.commit()?;
            info!(operation = %root.key(), "Transaction committed");
            Ok(outcome)
        }
        Err(err) => {
            warn!(operation = %root.key(), error = %err, "Rolling back after failure");
            drop(region);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::descriptor_of;
    use crate::error_collection::OperationError;
    use crate::errors::Flow;
    use crate::invocation::Invocation;
    use crate::isolation::IsolationLevel;
    use crate::operation::{Args, Operation};
    use crate::transaction::{RecordingTransactionManager, TransactionCall};

    #[derive(Default)]
    struct Snapshot;

    impl Operation for Snapshot {
        fn describe() -> RoutineResult<OperationDescriptor> {
            OperationDescriptor::builder::<Self>()
                .isolation(IsolationLevel::Serializable)
                .build()
        }

        fn exec(&self, _ctx: &mut Invocation<'_>, _args: Args) -> Flow {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Lookup;

    impl Operation for Lookup {
        fn describe() -> RoutineResult<OperationDescriptor> {
            OperationDescriptor::builder::<Self>()
                .isolation(IsolationLevel::None)
                .build()
        }

        fn exec(&self, _ctx: &mut Invocation<'_>, _args: Args) -> Flow {
            Ok(())
        }
    }

    fn failed_outcome() -> Outcome {
        let mut outcome = Outcome::new();
        outcome
            .errors_mut()
            .add(OperationError::new("invalid"), false)
            .unwrap();
        outcome
    }

    #[test]
    fn test_link_rejects_stricter_target() {
        let lookup = descriptor_of::<Lookup>().unwrap();
        let snapshot = descriptor_of::<Snapshot>().unwrap();
        let err = ensure_linkable(lookup, snapshot).unwrap_err();
        assert!(err.is_isolation_mismatch());
        assert!(ensure_linkable(snapshot, lookup).is_ok());
        assert!(ensure_linkable(snapshot, snapshot).is_ok());
    }

    #[test]
    fn test_commits_clean_outcome() {
        let manager = RecordingTransactionManager::new();
        let root = descriptor_of::<Snapshot>().unwrap();
        let outcome = within_region(&manager, root, || Ok(Outcome::new())).unwrap();
        assert!(outcome.is_success());
        assert_eq!(
            manager.calls(),
            vec![
                TransactionCall::Begin(IsolationLevel::Serializable),
                TransactionCall::Commit
            ]
        );
    }

    #[test]
    fn test_rolls_back_outcome_with_errors() {
        let manager = RecordingTransactionManager::new();
        let root = descriptor_of::<Snapshot>().unwrap();
        let outcome = within_region(&manager, root, || Ok(failed_outcome())).unwrap();
        assert!(outcome.has_errors());
        assert_eq!(manager.calls().last(), Some(&TransactionCall::Rollback));
    }

    #[test]
    fn test_rolls_back_on_failure() {
        let manager = RecordingTransactionManager::new();
        let root = descriptor_of::<Snapshot>().unwrap();
        let err = within_region(&manager, root, || {
            Err(RoutineError::invalid_argument("boom"))
        })
        .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(manager.calls().last(), Some(&TransactionCall::Rollback));
        assert_eq!(manager.open_transaction(), None);
    }

    #[test]
    fn test_rolls_back_on_panic() {
        let manager = RecordingTransactionManager::new();
        let root = descriptor_of::<Snapshot>().unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = within_region(&manager, root, || panic!("body panicked"));
        }));
        assert!(result.is_err());
        assert_eq!(manager.calls().last(), Some(&TransactionCall::Rollback));
    }

    #[test]
    fn test_no_transaction_for_none_isolation() {
        let manager = RecordingTransactionManager::new();
        let root = descriptor_of::<Lookup>().unwrap();
        within_region(&manager, root, || Ok(failed_outcome())).unwrap();
        assert!(manager.calls().is_empty());
    }
}
