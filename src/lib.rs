// Copyright 2025 Cowboy AI, LLC.

//! # CIM Operation
//!
//! Composable domain operations for the Composable Information Machine.
//!
//! An operation is a single-purpose unit of business logic. Operations
//! declare which other operations they use, run them nested inside their own
//! body, and receive their errors translated into their own vocabulary:
//!
//! - **Term / TermMapper**: names of inputs and outputs, and the translation
//!   of those names between a nested operation and its runner
//! - **ErrorCollection**: structured errors with a fail-fast switch and
//!   ignore rules
//! - **Outcome**: outputs plus errors of one invocation
//! - **Invocation**: the body's handle on the running call tree
//! - **Isolation coordination**: one transaction per call tree, opened by the
//!   root at the strictest isolation any registered operation needs
//!
//! ## Design Principles
//!
//! 1. **Errors are data**: business failures are collected, not thrown
//! 2. **Translation at the boundary**: nested errors always speak the
//!    runner's terms
//! 3. **Static declarations**: what an operation uses is described once per
//!    type and cached
//! 4. **Single transaction owner**: only the root of a call tree touches the
//!    transactional resource

#![warn(missing_docs)]

mod config;
mod coordinator;
mod descriptor;
mod engine;
mod error_collection;
mod errors;
mod invocation;
mod isolation;
mod operation;
mod outcome;
mod term;
mod term_mapper;
mod transaction;

pub use config::EngineConfig;
pub use descriptor::{
    derive_key, descriptor_of, DescriptorBuilder, OperationDescriptor, Registration, Uses,
};
pub use engine::Engine;
pub use error_collection::{ErrorCollection, ErrorKind, IgnoreRule, OperationError, EXCEPTION_CODE};
pub use errors::{Flow, Halt, RoutineError, RoutineResult, TransactionError};
pub use invocation::{Invocation, RunOptions};
pub use isolation::IsolationLevel;
pub use operation::{Args, DynOperation, Operation, OperationType, Target};
pub use outcome::Outcome;
pub use term::{IntoTerms, Term};
pub use term_mapper::TermMapper;
pub use transaction::{
    NoTransactions, RecordingTransactionManager, TransactionCall, TransactionManager,
};
