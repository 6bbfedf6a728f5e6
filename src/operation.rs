// Copyright 2025 Cowboy AI, LLC.

//! The operation capability
//!
//! An operation is any type with a body. Everything else (nesting, error
//! transfer, transactions) is provided by the engine through the
//! [`Invocation`] handed to the body.
//!
//! # Examples
//!
//! ```rust
//! use cim_operation::{Args, Engine, Flow, Invocation, Operation, OperationError};
//! use serde_json::json;
//!
//! #[derive(Default)]
//! struct NormalizeEmail;
//!
//! impl Operation for NormalizeEmail {
//!     fn exec(&self, ctx: &mut Invocation<'_>, args: Args) -> Flow {
//!         let Some(email) = args["email"].as_str() else {
//!             return ctx.add_error(
//!                 OperationError::new("blank").with_offending_inputs("email"),
//!                 true,
//!             );
//!         };
//!         ctx.set_output("email", json!(email.trim().to_lowercase()));
//!         Ok(())
//!     }
//! }
//!
//! let engine = Engine::default();
//! let outcome = engine.call(&NormalizeEmail, json!({"email": " Ann@Example.org "})).unwrap();
//! assert_eq!(outcome.output("email"), Some(&json!("ann@example.org")));
//!
//! let outcome = engine.call(&NormalizeEmail, json!({})).unwrap();
//! assert!(outcome.errors().has_offending_input("email"));
//! ```

use crate::descriptor::{descriptor_of, OperationDescriptor};
use crate::errors::{Flow, RoutineResult};
use crate::invocation::Invocation;
use std::any::TypeId;
use std::fmt;

/// Arguments passed to an operation body
pub type Args = serde_json::Value;

/// A single-purpose unit of business logic
pub trait Operation: Send + Sync + 'static {
    /// Static description of this type; computed once and cached
    ///
    /// The default keys the type by its snake_cased name, requests
    /// [`crate::IsolationLevel::RepeatableRead`] and uses nothing.
    fn describe() -> RoutineResult<OperationDescriptor>
    where
        Self: Sized,
    {
        OperationDescriptor::builder::<Self>().build()
    }

    /// The body, run once per invocation
    fn exec(&self, ctx: &mut Invocation<'_>, args: Args) -> Flow;
}

/// Object-safe view of an [`Operation`]
pub trait DynOperation: Send + Sync {
    /// Cached descriptor of the concrete type
    fn descriptor(&self) -> RoutineResult<&'static OperationDescriptor>;

    /// `TypeId` of the concrete type
    fn operation_type(&self) -> TypeId;

    /// Run the body
    fn exec_dyn(&self, ctx: &mut Invocation<'_>, args: Args) -> Flow;
}

impl<T: Operation> DynOperation for T {
    fn descriptor(&self) -> RoutineResult<&'static OperationDescriptor> {
        descriptor_of::<T>()
    }

    fn operation_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn exec_dyn(&self, ctx: &mut Invocation<'_>, args: Args) -> Flow {
        self.exec(ctx, args)
    }
}

fn instantiate<T: Operation + Default>() -> Box<dyn DynOperation> {
    Box::new(T::default())
}

/// A constructible operation type
#[derive(Clone, Copy)]
pub struct OperationType {
    type_id: TypeId,
    type_name: &'static str,
    descriptor: fn() -> RoutineResult<&'static OperationDescriptor>,
    factory: fn() -> Box<dyn DynOperation>,
}

impl OperationType {
    /// The type `T`, instantiated through `Default`
    pub fn of<T: Operation + Default>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            descriptor: descriptor_of::<T>,
            factory: instantiate::<T>,
        }
    }

    /// `TypeId` of the operation
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name of the operation
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Cached descriptor of the operation
    pub fn descriptor(&self) -> RoutineResult<&'static OperationDescriptor> {
        (self.descriptor)()
    }

    /// A fresh instance
    pub fn instantiate(&self) -> Box<dyn DynOperation> {
        (self.factory)()
    }
}

impl fmt::Debug for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OperationType").field(&self.type_name).finish()
    }
}

/// What a nested `run` should invoke
pub enum Target<'a> {
    /// A registration key declared with `uses`
    Key(&'a str),
    /// An operation type, registered or not
    Type(OperationType),
    /// An already instantiated operation
    Instance(&'a dyn DynOperation),
}

impl<'a> Target<'a> {
    /// Target the operation type `T`
    pub fn of<T: Operation + Default>() -> Self {
        Target::Type(OperationType::of::<T>())
    }

    /// Target an existing instance
    pub fn instance<T: Operation>(operation: &'a T) -> Self {
        Target::Instance(operation)
    }
}

impl<'a> From<&'a str> for Target<'a> {
    fn from(key: &'a str) -> Self {
        Target::Key(key)
    }
}

impl From<OperationType> for Target<'_> {
    fn from(operation: OperationType) -> Self {
        Target::Type(operation)
    }
}

impl<'a> From<&'a dyn DynOperation> for Target<'a> {
    fn from(operation: &'a dyn DynOperation) -> Self {
        Target::Instance(operation)
    }
}

impl fmt::Debug for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Target::Type(operation) => f.debug_tuple("Type").field(operation).finish(),
            Target::Instance(operation) => f
                .debug_tuple("Instance")
                .field(&operation.descriptor().map(OperationDescriptor::key).ok())
                .finish(),
        }
    }
}
