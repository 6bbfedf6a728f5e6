// Copyright 2025 Cowboy AI, LLC.

//! Translation of terms across an invocation boundary
//!
//! A nested operation names its inputs and outputs in its own vocabulary.
//! When its errors and outputs travel back to the caller, a [`TermMapper`]
//! rewrites those names: first through an optional rename table, then under
//! an optional scope.

use crate::term::{IntoTerms, Term};
use indexmap::IndexMap;

/// Translates callee terms into caller terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermMapper {
    scope: Option<Term>,
    mapping: IndexMap<Term, Term>,
}

impl TermMapper {
    /// Identity translation with no scope
    pub fn verbatim() -> Self {
        Self::default()
    }

    /// Place every term under `scope`, without renaming
    pub fn scoped(scope: impl Into<Term>) -> Self {
        Self {
            scope: Some(scope.into()),
            mapping: IndexMap::new(),
        }
    }

    /// Rename through `mapping`, without scoping
    pub fn mapped<I, K, V>(mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Term>,
        V: Into<Term>,
    {
        Self {
            scope: None,
            mapping: mapping
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .collect(),
        }
    }

    /// Rename through `mapping`, then place under `scope` when one is given
    ///
    /// ```
    /// use cim_operation::{Term, TermMapper};
    ///
    /// let mapper = TermMapper::scope_and_map(Some("reg"), [("bar", "foo")]);
    /// assert_eq!(mapper.map("bar"), vec![Term::path(["reg", "foo"])]);
    /// assert_eq!(mapper.map("baz"), vec![Term::path(["reg", "baz"])]);
    /// ```
    pub fn scope_and_map<S, I, K, V>(scope: Option<S>, mapping: I) -> Self
    where
        S: Into<Term>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<Term>,
        V: Into<Term>,
    {
        Self {
            scope: scope.map(Into::into),
            ..Self::mapped(mapping)
        }
    }

    /// The scope, if any
    pub fn scope(&self) -> Option<&Term> {
        self.scope.as_ref()
    }

    /// Whether this mapper leaves every term untouched
    pub fn is_verbatim(&self) -> bool {
        self.scope.is_none() && self.mapping.is_empty()
    }

    /// Translate one term or a sequence of terms
    ///
    /// Always returns a flat sequence; empty terms are dropped.
    pub fn map(&self, inputs: impl IntoTerms) -> Vec<Term> {
        inputs
            .into_terms()
            .iter()
            .map(|term| self.map_term(term))
            .collect()
    }

    /// Translate a single term
    pub fn map_term(&self, term: &Term) -> Term {
        let renamed = self.mapping.get(term).unwrap_or(term);
        match &self.scope {
            Some(scope) => renamed.scoped(scope),
            None => renamed.clone(),
        }
    }
}
