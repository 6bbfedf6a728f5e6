// Copyright 2025 Cowboy AI, LLC.

//! Engine configuration

use crate::errors::RoutineResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Configuration for an [`crate::Engine`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether errors transferred from a nested run end the caller's
    /// invocation (overridable per run)
    pub errors_are_fatal: bool,

    /// Deepest allowed nesting of runs below the topmost invocation
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            errors_are_fatal: true,
            max_depth: 64,
        }
    }
}

impl EngineConfig {
    /// Parse from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> RoutineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.errors_are_fatal);
        assert_eq!(config.max_depth, 64);
    }

    #[test]
    fn test_from_partial_json() {
        let config = EngineConfig::from_json(r#"{"errors_are_fatal": false}"#).unwrap();
        assert!(!config.errors_are_fatal);
        assert_eq!(config.max_depth, 64);
    }

    #[test]
    fn test_from_invalid_json() {
        assert!(EngineConfig::from_json("{ nope").is_err());
    }
}
