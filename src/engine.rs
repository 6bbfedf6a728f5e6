// Copyright 2025 Cowboy AI, LLC.

//! Entry point for top-level calls

use crate::config::EngineConfig;
use crate::coordinator;
use crate::errors::{RoutineError, RoutineResult};
use crate::invocation::{self, CallTree};
use crate::operation::{Args, DynOperation, Operation};
use crate::outcome::Outcome;
use crate::transaction::{NoTransactions, TransactionManager};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Runs operations as the root of a call tree
///
/// The engine owns the link to the transactional resource. Every `call`
/// starts a new call tree whose root decides whether a transaction is
/// opened.
#[derive(Clone)]
pub struct Engine {
    transactions: Arc<dyn TransactionManager>,
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Arc::new(NoTransactions))
    }
}

impl Engine {
    /// Create an engine over `transactions` with the default configuration
    pub fn new(transactions: Arc<dyn TransactionManager>) -> Self {
        Self::with_config(transactions, EngineConfig::default())
    }

    /// Create an engine over `transactions`
    pub fn with_config(transactions: Arc<dyn TransactionManager>, config: EngineConfig) -> Self {
        Self {
            transactions,
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Call `operation` as the root of a new call tree
    ///
    /// Collected errors are returned inside the [`Outcome`]; only hard
    /// failures are returned as `Err`.
    pub fn call<O: Operation>(&self, operation: &O, args: Args) -> RoutineResult<Outcome> {
        self.call_dyn(operation, args)
    }

    /// Call an operation trait object as the root of a new call tree
    pub fn call_dyn(&self, operation: &dyn DynOperation, args: Args) -> RoutineResult<Outcome> {
        let descriptor = operation.descriptor()?;
        let tree = CallTree::new(descriptor, self.config.clone());

        let outcome = coordinator::within_region(self.transactions.as_ref(), descriptor, || {
            invocation::execute(
                &tree,
                descriptor,
                None,
                vec![descriptor.key().to_string()],
                operation,
                args,
            )
        })?;

        let hooks = tree.take_hooks();
        if outcome.is_success() {
            for hook in hooks {
                hook();
            }
        } else if !hooks.is_empty() {
            debug!(
                operation = %descriptor.key(),
                discarded = hooks.len(),
                "Discarding after-transaction hooks of failed call"
            );
        }
        Ok(outcome)
    }

    /// Call `operation` and return the output it expresses
    ///
    /// An exception error is re-raised first, then any remaining errors are
    /// raised together. A missing output yields `Value::Null`.
    pub fn express<O: Operation>(&self, operation: &O, args: Args) -> RoutineResult<Value> {
        let descriptor = operation.descriptor()?;
        let name = descriptor.express_output().ok_or_else(|| {
            RoutineError::invalid_argument(format!(
                "`{}` does not declare an express output",
                descriptor.key()
            ))
        })?;

        let outcome = self.call(operation, args)?;
        outcome.errors().reraise_exception()?;
        outcome.errors().raise_if_any()?;
        Ok(outcome.output(name).cloned().unwrap_or(Value::Null))
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
