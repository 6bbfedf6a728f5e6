// Copyright 2025 Cowboy AI, LLC.

//! Terms: the identifiers operations use for inputs and outputs
//!
//! A term is a flat path of segments. A plain identifier such as
//! `first_name` is a one-segment path; scoping it under `register` yields the
//! compound path `register.first_name`. Paths never nest, so scoping an
//! already compound term simply prepends segments.

use indexmap::IndexSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An input or output identifier
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct Term(Vec<String>);

impl Term {
    /// A single-segment term
    pub fn new(segment: impl Into<String>) -> Self {
        Term(vec![segment.into()])
    }

    /// A compound term from its segments
    pub fn path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Term(segments.into_iter().map(Into::into).collect())
    }

    /// The segments of this term, outermost scope first
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether the term carries no segment at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the term has more than one segment
    pub fn is_compound(&self) -> bool {
        self.0.len() > 1
    }

    /// The innermost segment
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// This term placed under `scope`
    pub fn scoped(&self, scope: &Term) -> Term {
        let mut segments = Vec::with_capacity(scope.0.len() + self.0.len());
        segments.extend(scope.0.iter().cloned());
        segments.extend(self.0.iter().cloned());
        Term(segments)
    }

    /// Whether this term starts with every segment of `scope`
    pub fn is_within(&self, scope: &Term) -> bool {
        self.0.starts_with(&scope.0)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<&str> for Term {
    fn from(segment: &str) -> Self {
        Term::new(segment)
    }
}

impl From<String> for Term {
    fn from(segment: String) -> Self {
        Term::new(segment)
    }
}

impl From<&String> for Term {
    fn from(segment: &String) -> Self {
        Term::new(segment.as_str())
    }
}

impl From<&Term> for Term {
    fn from(term: &Term) -> Self {
        term.clone()
    }
}

/// One term or a sequence of terms
///
/// Mirrors the loose "identifier or list of identifiers" arguments accepted
/// by mappers and error builders. Empty terms are discarded on conversion.
pub trait IntoTerms {
    /// Flatten into a list of terms
    fn into_terms(self) -> Vec<Term>;
}

fn compact(terms: impl IntoIterator<Item = Term>) -> Vec<Term> {
    terms.into_iter().filter(|term| !term.is_empty()).collect()
}

impl IntoTerms for Term {
    fn into_terms(self) -> Vec<Term> {
        compact([self])
    }
}

impl IntoTerms for &Term {
    fn into_terms(self) -> Vec<Term> {
        compact([self.clone()])
    }
}

impl IntoTerms for &str {
    fn into_terms(self) -> Vec<Term> {
        compact([Term::new(self)])
    }
}

impl IntoTerms for String {
    fn into_terms(self) -> Vec<Term> {
        compact([Term::new(self)])
    }
}

impl IntoTerms for Option<Term> {
    fn into_terms(self) -> Vec<Term> {
        compact(self)
    }
}

impl IntoTerms for Vec<Term> {
    fn into_terms(self) -> Vec<Term> {
        compact(self)
    }
}

impl IntoTerms for &[Term] {
    fn into_terms(self) -> Vec<Term> {
        compact(self.iter().cloned())
    }
}

impl<const N: usize> IntoTerms for [Term; N] {
    fn into_terms(self) -> Vec<Term> {
        compact(self)
    }
}

impl IntoTerms for Vec<&str> {
    fn into_terms(self) -> Vec<Term> {
        compact(self.into_iter().map(|segment| Term::new(segment)))
    }
}

impl IntoTerms for &[&str] {
    fn into_terms(self) -> Vec<Term> {
        compact(self.iter().copied().map(|segment| Term::new(segment)))
    }
}

impl<const N: usize> IntoTerms for [&str; N] {
    fn into_terms(self) -> Vec<Term> {
        compact(self.into_iter().map(|segment| Term::new(segment)))
    }
}

impl IntoTerms for IndexSet<Term> {
    fn into_terms(self) -> Vec<Term> {
        compact(self)
    }
}

impl IntoTerms for &IndexSet<Term> {
    fn into_terms(self) -> Vec<Term> {
        compact(self.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoping_flattens() {
        let name = Term::new("first_name");
        let scoped = name.scoped(&Term::new("register"));
        assert_eq!(scoped, Term::path(["register", "first_name"]));
        assert!(scoped.is_compound());
        assert_eq!(scoped.name(), Some("first_name"));

        let twice = scoped.scoped(&Term::new("signup"));
        assert_eq!(twice.segments(), ["signup", "register", "first_name"]);
        assert!(twice.is_within(&Term::new("signup")));
        assert!(!twice.is_within(&Term::new("register")));
    }

    #[test]
    fn test_display_joins_segments() {
        assert_eq!(Term::new("email").to_string(), "email");
        assert_eq!(Term::path(["user", "email"]).to_string(), "user.email");
    }

    #[test]
    fn test_into_terms_discards_empty() {
        let terms = vec![Term::new("a"), Term::default(), Term::new("b")].into_terms();
        assert_eq!(terms, vec![Term::new("a"), Term::new("b")]);
        assert!(None::<Term>.into_terms().is_empty());
        assert_eq!(
            ["x", "y"].into_terms(),
            vec![Term::new("x"), Term::new("y")]
        );
    }

    #[test]
    fn test_serde_as_segment_list() {
        let term = Term::path(["register", "email"]);
        let json = serde_json::to_string(&term).unwrap();
        assert_eq!(json, r#"["register","email"]"#);
        let back: Term = serde_json::from_str(&json).unwrap();
        assert_eq!(back, term);
    }
}
