// Copyright 2025 Cowboy AI, LLC.

//! The invocation protocol
//!
//! Each `call` gets a fresh [`Invocation`]: the body's handle on its own
//! [`Outcome`] and on the call tree it runs in. Nested operations are started
//! through [`Invocation::run`], which links the new invocation to its runner,
//! checks isolation, executes the nested body and folds the nested outcome
//! back through the registered term mappers.
//!
//! ```mermaid
//! graph LR
//!     A[run] --> B[resolve target]
//!     B --> C[link runner / check isolation]
//!     C --> D[execute nested body]
//!     D --> E[transfer errors via input mapper]
//!     E -->|errors and fatal| F[Halt::Fatal]
//!     E --> G[merge outputs via output mapper]
//! ```

use crate::config::EngineConfig;
use crate::coordinator;
use crate::descriptor::{OperationDescriptor, Registration};
use crate::error_collection::{ErrorCollection, IgnoreRule, OperationError};
use crate::errors::{Flow, Halt, RoutineError, RoutineResult};
use crate::isolation::IsolationLevel;
use crate::operation::{Args, DynOperation, Target};
use crate::outcome::Outcome;
use crate::term::Term;
use crate::term_mapper::TermMapper;
use serde_json::Value;
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use tracing::{debug, debug_span, warn};
use uuid::Uuid;

type Hook = Box<dyn FnOnce()>;

/// State shared by every invocation of one call tree
pub(crate) struct CallTree {
    root: &'static OperationDescriptor,
    config: EngineConfig,
    hooks: RefCell<Vec<Hook>>,
}

impl CallTree {
    pub(crate) fn new(root: &'static OperationDescriptor, config: EngineConfig) -> Self {
        Self {
            root,
            config,
            hooks: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn take_hooks(&self) -> Vec<Hook> {
        self.hooks.take()
    }
}

/// Options for a single nested run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// End the caller's invocation when it holds errors after the transfer
    pub errors_are_fatal: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            errors_are_fatal: true,
        }
    }
}

impl RunOptions {
    /// Transfer errors without ending the caller's invocation
    pub fn lenient() -> Self {
        Self {
            errors_are_fatal: false,
        }
    }
}

/// One running operation
pub struct Invocation<'t> {
    tree: &'t CallTree,
    descriptor: &'static OperationDescriptor,
    runner: Option<&'static OperationDescriptor>,
    path: Vec<String>,
    id: Uuid,
    outcome: Outcome,
}

/// Run `operation` as one invocation of `tree`
///
/// A fatal short-circuit ends the body and still yields the outcome; a hard
/// failure is returned as an error.
pub(crate) fn execute(
    tree: &CallTree,
    descriptor: &'static OperationDescriptor,
    runner: Option<&'static OperationDescriptor>,
    path: Vec<String>,
    operation: &dyn DynOperation,
    args: Args,
) -> RoutineResult<Outcome> {
    let mut invocation = Invocation {
        tree,
        descriptor,
        runner,
        path,
        id: Uuid::new_v4(),
        outcome: Outcome::new(),
    };
    let span = debug_span!(
        "operation",
        key = %descriptor.key(),
        depth = invocation.depth(),
        invocation_id = %invocation.id
    );
    let _entered = span.enter();

    match operation.exec_dyn(&mut invocation, args) {
        Ok(()) => {}
        Err(Halt::Fatal) => debug!(
            errors = invocation.outcome.errors().len(),
            "Fatal errors encountered; invocation ended early"
        ),
        Err(Halt::Failed(err)) => return Err(err),
    }
    Ok(invocation.outcome)
}

enum Instance<'a> {
    Borrowed(&'a dyn DynOperation),
    Owned(Box<dyn DynOperation>),
}

impl Instance<'_> {
    fn as_dyn(&self) -> &dyn DynOperation {
        match self {
            Instance::Borrowed(operation) => *operation,
            Instance::Owned(operation) => operation.as_ref(),
        }
    }
}

struct Resolved<'a> {
    key: String,
    descriptor: &'static OperationDescriptor,
    instance: Instance<'a>,
    input_mapper: Cow<'static, TermMapper>,
    output_mapper: Cow<'static, TermMapper>,
    ignored_errors: &'static [IgnoreRule],
}

impl<'a> Resolved<'a> {
    fn registered(registration: &'static Registration, instance: Instance<'a>) -> Self {
        Self {
            key: registration.key().to_string(),
            descriptor: registration.descriptor(),
            instance,
            input_mapper: Cow::Borrowed(registration.input_mapper()),
            output_mapper: Cow::Borrowed(registration.output_mapper()),
            ignored_errors: registration.ignored_errors(),
        }
    }

    fn unregistered(descriptor: &'static OperationDescriptor, instance: Instance<'a>) -> Self {
        let key = descriptor.key().to_string();
        Self {
            input_mapper: Cow::Owned(TermMapper::scoped(key.as_str())),
            output_mapper: Cow::Owned(TermMapper::scoped(key.as_str())),
            key,
            descriptor,
            instance,
            ignored_errors: &[],
        }
    }
}

impl<'t> Invocation<'t> {
    /// Descriptor of the running operation
    pub fn descriptor(&self) -> &'static OperationDescriptor {
        self.descriptor
    }

    /// Registration key of the running operation
    pub fn key(&self) -> &str {
        self.descriptor.key()
    }

    /// Unique id of this invocation
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Descriptor of the invocation that ran this one; `None` at the top
    pub fn runner(&self) -> Option<&'static OperationDescriptor> {
        self.runner
    }

    /// Descriptor of the root of the call tree
    pub fn topmost_runner(&self) -> &'static OperationDescriptor {
        self.tree.root
    }

    /// Whether this invocation is the root of its call tree
    pub fn is_topmost(&self) -> bool {
        self.runner.is_none()
    }

    /// Isolation the call tree runs at
    pub fn isolation(&self) -> IsolationLevel {
        self.tree.root.isolation()
    }

    /// Number of runs between the root and this invocation
    pub fn depth(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Registration keys from the root down to this invocation
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Outputs and errors collected so far
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Errors collected so far
    pub fn errors(&self) -> &ErrorCollection {
        self.outcome.errors()
    }

    /// Errors collected so far, mutably (e.g. to register ignore rules)
    pub fn errors_mut(&mut self) -> &mut ErrorCollection {
        self.outcome.errors_mut()
    }

    /// Add an error; see [`ErrorCollection::add`]
    pub fn add_error(&mut self, error: OperationError, fail: bool) -> Flow {
        self.outcome.errors_mut().add(error, fail)
    }

    /// Record a failed external call as an exception error
    ///
    /// Returns the success value, or `None` after recording the failure.
    pub fn capture<T, E>(&mut self, result: Result<T, E>, fail: bool) -> Flow<Option<T>>
    where
        E: Into<anyhow::Error>,
    {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                self.add_error(OperationError::exception(err.into()), fail)?;
                Ok(None)
            }
        }
    }

    /// A single output
    pub fn output(&self, name: impl Into<Term>) -> Option<&Value> {
        self.outcome.output(name)
    }

    /// Set an output, returning the value it replaced
    pub fn set_output(&mut self, name: impl Into<Term>, value: Value) -> Option<Value> {
        self.outcome.set_output(name, value)
    }

    /// Run `hook` once the outermost invocation completes without errors
    ///
    /// Hooks run after the transaction commits and are discarded when it
    /// rolls back.
    pub fn after_transaction(&self, hook: impl FnOnce() + 'static) {
        self.tree.hooks.borrow_mut().push(Box::new(hook));
    }

    /// Run a nested operation with the engine's default options
    pub fn run<'a>(&mut self, target: impl Into<Target<'a>>, args: Args) -> Flow<Outcome> {
        let options = RunOptions {
            errors_are_fatal: self.tree.config.errors_are_fatal,
        };
        self.run_with(target, args, options)
    }

    /// Run a nested operation
    ///
    /// Returns the nested outcome as produced by the nested body. Its errors
    /// and outputs have already been translated into this invocation.
    pub fn run_with<'a>(
        &mut self,
        target: impl Into<Target<'a>>,
        args: Args,
        options: RunOptions,
    ) -> Flow<Outcome> {
        let resolved = self.resolve(target.into())?;

        let max_depth = self.tree.config.max_depth;
        if self.depth() + 1 > max_depth {
            warn!(operation = %resolved.key, max_depth, "Refusing to nest deeper");
            return Err(RoutineError::DepthExceeded {
                operation: resolved.key,
                max_depth,
            }
            .into());
        }

        coordinator::ensure_linkable(self.tree.root, resolved.descriptor)?;
        debug!(
            runner = %self.key(),
            operation = %resolved.key,
            "Running nested operation"
        );

        let mut path = self.path.clone();
        path.push(resolved.key.clone());
        let nested = execute(
            self.tree,
            resolved.descriptor,
            Some(self.descriptor),
            path,
            resolved.instance.as_dyn(),
            args,
        )?;

        self.absorb(&nested, &resolved, options)?;
        Ok(nested)
    }

    fn resolve<'a>(&self, target: Target<'a>) -> RoutineResult<Resolved<'a>> {
        let descriptor = self.descriptor;
        match target {
            Target::Key(key) => {
                let registration = descriptor.registration(key).ok_or_else(|| {
                    warn!(runner = %descriptor.key(), key, "Unknown operation key");
                    RoutineError::invalid_argument(format!(
                        "operation key `{key}` does not point to an operation used by `{}`",
                        descriptor.key()
                    ))
                })?;
                let instance = Instance::Owned(registration.operation().instantiate());
                Ok(Resolved::registered(registration, instance))
            }
            Target::Type(operation) => match descriptor.registration_for(operation.type_id()) {
                Some(registration) => {
                    let instance = Instance::Owned(registration.operation().instantiate());
                    Ok(Resolved::registered(registration, instance))
                }
                None => {
                    let target = operation.descriptor()?;
                    debug!(
                        runner = %descriptor.key(),
                        operation = %target.key(),
                        "Running unregistered operation type under its derived scope"
                    );
                    Ok(Resolved::unregistered(
                        target,
                        Instance::Owned(operation.instantiate()),
                    ))
                }
            },
            Target::Instance(operation) => {
                match descriptor.registration_for(operation.operation_type()) {
                    Some(registration) => {
                        Ok(Resolved::registered(registration, Instance::Borrowed(operation)))
                    }
                    None => {
                        let target = operation.descriptor()?;
                        debug!(
                            runner = %descriptor.key(),
                            operation = %target.key(),
                            "Running unregistered instance under its derived scope"
                        );
                        Ok(Resolved::unregistered(target, Instance::Borrowed(operation)))
                    }
                }
            }
        }
    }

    fn absorb(&mut self, nested: &Outcome, resolved: &Resolved<'_>, options: RunOptions) -> Flow {
        for error in nested.errors() {
            if resolved.ignored_errors.iter().any(|rule| rule.matches(error)) {
                debug!(
                    operation = %resolved.key,
                    code = %error.code(),
                    "Dropping nested error ignored by registration"
                );
                continue;
            }
            self.outcome
                .errors_mut()
                .collect(error.translated(&resolved.input_mapper));
        }

        if options.errors_are_fatal && self.outcome.has_errors() {
            debug!(
                operation = %resolved.key,
                errors = self.outcome.errors().len(),
                "Errors after nested run are fatal"
            );
            return Err(Halt::Fatal);
        }

        for (name, value) in nested.outputs() {
            self.outcome
                .set_output(resolved.output_mapper.map_term(name), value.clone());
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("key", &self.descriptor.key())
            .field("id", &self.id)
            .field("path", &self.path)
            .field("outcome", &self.outcome)
            .finish()
    }
}
