// Copyright 2025 Cowboy AI, LLC.

//! Transaction isolation levels
//!
//! Levels are totally ordered from `None` (no transaction at all) to
//! `Serializable`. An operation type declares the level it needs; a call tree
//! runs at the level of its topmost runner.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strictness requirement for the shared transactional region
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Run without a transaction
    None,
    /// Dirty reads allowed
    ReadUncommitted,
    /// Only committed data is visible
    ReadCommitted,
    /// Rows read stay stable for the whole transaction
    #[default]
    RepeatableRead,
    /// Equivalent to serial execution
    Serializable,
}

impl IsolationLevel {
    /// All levels, weakest first
    pub const ALL: [IsolationLevel; 5] = [
        IsolationLevel::None,
        IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable,
    ];

    /// Stable snake_case name
    pub fn name(&self) -> &'static str {
        match self {
            IsolationLevel::None => "none",
            IsolationLevel::ReadUncommitted => "read_uncommitted",
            IsolationLevel::ReadCommitted => "read_committed",
            IsolationLevel::RepeatableRead => "repeatable_read",
            IsolationLevel::Serializable => "serializable",
        }
    }

    /// Whether this level requires opening a transaction
    pub fn is_transactional(&self) -> bool {
        *self != IsolationLevel::None
    }

    /// Whether `self` is at least as strict as `other`
    pub fn at_least_as_strict_as(&self, other: IsolationLevel) -> bool {
        *self >= other
    }

    /// Whether `self` is strictly weaker than `other`
    pub fn weaker_than(&self, other: IsolationLevel) -> bool {
        *self < other
    }

    /// The stricter of the two levels
    pub fn widen(self, other: IsolationLevel) -> IsolationLevel {
        self.max(other)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IsolationLevel::ALL
            .into_iter()
            .find(|level| level.name() == s)
            .ok_or_else(|| format!("unknown isolation level `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_total_order() {
        for pair in IsolationLevel::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].weaker_than(pair[1]));
            assert!(pair[1].at_least_as_strict_as(pair[0]));
        }
    }

    #[test]
    fn test_default_is_repeatable_read() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::RepeatableRead);
    }

    #[test]
    fn test_widen_keeps_stricter() {
        use IsolationLevel as L;
        assert_eq!(L::ReadCommitted.widen(L::Serializable), L::Serializable);
        assert_eq!(L::Serializable.widen(L::None), L::Serializable);
        assert_eq!(L::None.widen(L::None), L::None);
    }

    #[test]
    fn test_is_transactional() {
        assert!(!IsolationLevel::None.is_transactional());
        assert!(IsolationLevel::ReadUncommitted.is_transactional());
        assert!(IsolationLevel::Serializable.is_transactional());
    }

    #[test_case("none", IsolationLevel::None)]
    #[test_case("read_uncommitted", IsolationLevel::ReadUncommitted)]
    #[test_case("read_committed", IsolationLevel::ReadCommitted)]
    #[test_case("repeatable_read", IsolationLevel::RepeatableRead)]
    #[test_case("serializable", IsolationLevel::Serializable)]
    fn test_parse_and_display(name: &str, level: IsolationLevel) {
        assert_eq!(name.parse::<IsolationLevel>().unwrap(), level);
        assert_eq!(level.to_string(), name);
    }

    #[test]
    fn test_parse_unknown() {
        assert!("snapshot".parse::<IsolationLevel>().is_err());
    }

    #[test]
    fn test_serde() {
        let json = serde_json::to_string(&IsolationLevel::ReadCommitted).unwrap();
        assert_eq!(json, "\"read_committed\"");
        let back: IsolationLevel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, IsolationLevel::ReadCommitted);
    }
}
