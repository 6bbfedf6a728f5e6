// Copyright 2025 Cowboy AI, LLC.

//! The result of one operation invocation

use crate::error_collection::ErrorCollection;
use crate::errors::RoutineResult;
use crate::term::Term;
use indexmap::IndexMap;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Outputs and errors produced by exactly one invocation
///
/// Created when an invocation starts and handed back to its caller when it
/// completes, whether or not errors were collected.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    outputs: IndexMap<Term, Value>,
    errors: ErrorCollection,
}

impl Outcome {
    /// An empty outcome
    pub fn new() -> Self {
        Self::default()
    }

    /// All outputs
    pub fn outputs(&self) -> &IndexMap<Term, Value> {
        &self.outputs
    }

    /// A single output
    pub fn output(&self, name: impl Into<Term>) -> Option<&Value> {
        self.outputs.get(&name.into())
    }

    /// Set an output, returning the value it replaced
    pub fn set_output(&mut self, name: impl Into<Term>, value: Value) -> Option<Value> {
        self.outputs.insert(name.into(), value)
    }

    /// Collected errors
    pub fn errors(&self) -> &ErrorCollection {
        &self.errors
    }

    /// Collected errors, mutably
    pub fn errors_mut(&mut self) -> &mut ErrorCollection {
        &mut self.errors
    }

    /// Whether any error was collected
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether the invocation completed without errors
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Split into outputs and errors
    pub fn into_parts(self) -> (IndexMap<Term, Value>, ErrorCollection) {
        (self.outputs, self.errors)
    }

    /// JSON snapshot; outputs become `[segments, value]` pairs in insertion order
    pub fn to_json(&self) -> RoutineResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

struct OutputsView<'a>(&'a IndexMap<Term, Value>);

impl Serialize for OutputsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Outcome", 2)?;
        state.serialize_field("outputs", &OutputsView(&self.outputs))?;
        state.serialize_field("errors", &self.errors)?;
        state.end()
    }
}
