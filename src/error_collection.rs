// Copyright 2025 Cowboy AI, LLC.

//! Collected operation errors
//!
//! Operations report problems as data. Each problem is an
//! [`OperationError`]; one invocation's problems live in an ordered
//! [`ErrorCollection`] that can filter errors out through ignore rules and
//! end the invocation early when an error is added as fatal.

use crate::errors::{Flow, Halt, RoutineError, RoutineResult};
use crate::term::{IntoTerms, Term};
use crate::term_mapper::TermMapper;
use indexmap::IndexSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Code given to errors that wrap an external failure
pub const EXCEPTION_CODE: &str = "exception";

/// What kind of failure an error records
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Validation or business-rule failure
    #[default]
    Domain,
    /// Wraps an externally raised failure
    Exception,
}

/// A single failure record
///
/// Fields are fixed at construction. Translating an error across an
/// invocation boundary produces a new error with rewritten offending inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationError {
    kind: ErrorKind,
    code: String,
    message: String,
    offending_inputs: IndexSet<Term>,
    data: Option<serde_json::Value>,
    #[serde(skip)]
    exception: Option<Arc<anyhow::Error>>,
}

impl OperationError {
    /// A domain error with `code`; the message defaults to the code
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            kind: ErrorKind::Domain,
            message: code.clone(),
            code,
            offending_inputs: IndexSet::new(),
            data: None,
            exception: None,
        }
    }

    /// An exception error preserving `error` for re-signaling
    pub fn exception(error: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Exception,
            code: EXCEPTION_CODE.to_string(),
            message: error.to_string(),
            offending_inputs: IndexSet::new(),
            data: None,
            exception: Some(Arc::new(error)),
        }
    }

    /// Replace the message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add offending inputs
    pub fn with_offending_inputs(mut self, inputs: impl IntoTerms) -> Self {
        self.offending_inputs.extend(inputs.into_terms());
        self
    }

    /// Attach an opaque payload
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Error code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Human readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Inputs responsible for the error
    pub fn offending_inputs(&self) -> &IndexSet<Term> {
        &self.offending_inputs
    }

    /// Opaque payload
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    /// The wrapped external failure, for exception errors
    pub fn exception_payload(&self) -> Option<&Arc<anyhow::Error>> {
        self.exception.as_ref()
    }

    /// Whether `input` is among the offending inputs
    pub fn is_offending(&self, input: &Term) -> bool {
        self.offending_inputs.contains(input)
    }

    /// A copy of this error with offending inputs passed through `mapper`
    pub fn translated(&self, mapper: &TermMapper) -> Self {
        Self {
            offending_inputs: mapper.map(&self.offending_inputs).into_iter().collect(),
            ..self.clone()
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

type IgnorePredicate = dyn Fn(&OperationError) -> bool + Send + Sync;

/// Rule deciding whether an error is dropped instead of collected
#[derive(Clone)]
pub enum IgnoreRule {
    /// Matches errors with this code
    Code(String),
    /// Matches errors the predicate accepts
    Predicate(Arc<IgnorePredicate>),
}

impl IgnoreRule {
    /// Match errors by code
    pub fn code(code: impl Into<String>) -> Self {
        IgnoreRule::Code(code.into())
    }

    /// Match errors accepted by `predicate`
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&OperationError) -> bool + Send + Sync + 'static,
    {
        IgnoreRule::Predicate(Arc::new(predicate))
    }

    /// Whether this rule matches `error`
    pub fn matches(&self, error: &OperationError) -> bool {
        match self {
            IgnoreRule::Code(code) => error.code() == code,
            IgnoreRule::Predicate(predicate) => predicate(error),
        }
    }
}

impl fmt::Debug for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreRule::Code(code) => f.debug_tuple("Code").field(code).finish(),
            IgnoreRule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for IgnoreRule {
    fn from(code: &str) -> Self {
        IgnoreRule::code(code)
    }
}

impl From<String> for IgnoreRule {
    fn from(code: String) -> Self {
        IgnoreRule::Code(code)
    }
}

/// Ordered errors of one invocation
#[derive(Debug, Clone, Default)]
pub struct ErrorCollection {
    errors: Vec<OperationError>,
    ignored: Vec<IgnoreRule>,
}

impl ErrorCollection {
    /// An empty collection with no ignore rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error
    ///
    /// An error matched by an ignore rule is dropped and `fail` has no
    /// effect. Otherwise the error is appended and, when `fail` is set,
    /// `Err(Halt::Fatal)` is returned to end the current invocation.
    pub fn add(&mut self, error: OperationError, fail: bool) -> Flow {
        if self.collect(error) && fail {
            return Err(Halt::Fatal);
        }
        Ok(())
    }

    /// Append unless ignored; returns whether the error was kept
    pub(crate) fn collect(&mut self, error: OperationError) -> bool {
        if self.is_ignored(&error) {
            debug!(code = %error.code(), "Dropping error matched by ignore rule");
            return false;
        }
        self.errors.push(error);
        true
    }

    /// Register an ignore rule; a bare code matches errors with that code
    pub fn ignore(&mut self, rule: impl Into<IgnoreRule>) {
        self.ignored.push(rule.into());
    }

    /// Whether any ignore rule matches `error`
    pub fn is_ignored(&self, error: &OperationError) -> bool {
        self.ignored.iter().any(|rule| rule.matches(error))
    }

    /// Whether any error lists `input` as offending
    pub fn has_offending_input(&self, input: impl Into<Term>) -> bool {
        let input = input.into();
        self.errors.iter().any(|error| error.is_offending(&input))
    }

    /// Fail with all messages joined when the collection is not empty
    pub fn raise_if_any(&self) -> RoutineResult<()> {
        self.raise_if_any_with(RoutineError::Accumulated)
    }

    /// Like [`raise_if_any`](Self::raise_if_any) with a caller-chosen error kind
    pub fn raise_if_any_with<E>(&self, kind: impl FnOnce(String) -> E) -> Result<(), E> {
        if self.errors.is_empty() {
            return Ok(());
        }
        Err(kind(self.full_message()))
    }

    /// Re-signal the payload of the first exception error, if any
    pub fn reraise_exception(&self) -> RoutineResult<()> {
        match self.first_exception().and_then(OperationError::exception_payload) {
            Some(payload) => Err(RoutineError::Exception(Arc::clone(payload))),
            None => Ok(()),
        }
    }

    /// The first exception-kind error
    pub fn first_exception(&self) -> Option<&OperationError> {
        self.errors
            .iter()
            .find(|error| error.kind() == ErrorKind::Exception)
    }

    /// All messages joined with `"; "`
    pub fn full_message(&self) -> String {
        self.errors
            .iter()
            .map(OperationError::message)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Codes in insertion order
    pub fn codes(&self) -> Vec<&str> {
        self.errors.iter().map(OperationError::code).collect()
    }

    /// Number of errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether no error was collected
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, OperationError> {
        self.errors.iter()
    }
}

impl<'a> IntoIterator for &'a ErrorCollection {
    type Item = &'a OperationError;
    type IntoIter = std::slice::Iter<'a, OperationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl Serialize for ErrorCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn invalid_email() -> OperationError {
        OperationError::new("invalid")
            .with_message("Email is invalid")
            .with_offending_inputs("email")
    }

    #[test]
    fn test_new_error_defaults() {
        let error = OperationError::new("blank");
        assert_eq!(error.kind(), ErrorKind::Domain);
        assert_eq!(error.code(), "blank");
        assert_eq!(error.message(), "blank");
        assert!(error.offending_inputs().is_empty());
        assert!(error.data().is_none());
        assert!(error.exception_payload().is_none());
    }

    #[test]
    fn test_add_appends_in_order() {
        let mut errors = ErrorCollection::new();
        errors.add(invalid_email(), false).unwrap();
        errors.add(OperationError::new("taken"), false).unwrap();
        assert_eq!(errors.codes(), vec!["invalid", "taken"]);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_fatal_add_halts() {
        let mut errors = ErrorCollection::new();
        let outcome = errors.add(invalid_email(), true);
        assert!(matches!(outcome, Err(Halt::Fatal)));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_ignored_error_never_halts() {
        let mut errors = ErrorCollection::new();
        errors.ignore("invalid");
        assert!(errors.add(invalid_email(), true).is_ok());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_ignore_predicate() {
        let mut errors = ErrorCollection::new();
        errors.ignore(IgnoreRule::when(|error| {
            error.is_offending(&Term::new("nickname"))
        }));
        errors
            .add(OperationError::new("too_long").with_offending_inputs("nickname"), true)
            .unwrap();
        errors
            .add(OperationError::new("too_long").with_offending_inputs("bio"), false)
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors.has_offending_input("bio"));
        assert!(!errors.has_offending_input("nickname"));
    }

    #[test]
    fn test_raise_if_any_joins_messages() {
        let mut errors = ErrorCollection::new();
        assert!(errors.raise_if_any().is_ok());

        errors.add(invalid_email(), false).unwrap();
        errors
            .add(OperationError::new("taken").with_message("Email is taken"), false)
            .unwrap();
        let err = errors.raise_if_any().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Operation errors: Email is invalid; Email is taken"
        );

        let custom: Result<(), String> = errors.raise_if_any_with(|msg| format!("rejected: {msg}"));
        assert_eq!(
            custom.unwrap_err(),
            "rejected: Email is invalid; Email is taken"
        );
    }

    #[test]
    fn test_reraise_first_exception_only() {
        let mut errors = ErrorCollection::new();
        assert!(errors.reraise_exception().is_ok());

        errors.add(invalid_email(), false).unwrap();
        assert!(errors.reraise_exception().is_ok());

        errors
            .add(OperationError::exception(anyhow::anyhow!("first")), false)
            .unwrap();
        errors
            .add(OperationError::exception(anyhow::anyhow!("second")), false)
            .unwrap();
        let err = errors.reraise_exception().unwrap_err();
        assert_eq!(err.to_string(), "first");
    }

    #[test]
    fn test_translated_rewrites_only_inputs() {
        let error = invalid_email().with_data(json!({"attempt": 2}));
        let mapper = TermMapper::scope_and_map(Some("signup"), [("email", "login")]);
        let translated = error.translated(&mapper);

        assert_eq!(translated.code(), "invalid");
        assert_eq!(translated.message(), "Email is invalid");
        assert_eq!(translated.data(), Some(&json!({"attempt": 2})));
        assert!(translated.is_offending(&Term::path(["signup", "login"])));
        assert!(error.is_offending(&Term::new("email")));
    }

    #[test]
    fn test_serialize_collection() {
        let mut errors = ErrorCollection::new();
        errors.add(invalid_email(), false).unwrap();
        let value = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            value,
            json!([{
                "kind": "domain",
                "code": "invalid",
                "message": "Email is invalid",
                "offending_inputs": [["email"]],
                "data": null
            }])
        );
    }
}
