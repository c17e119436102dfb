//! Analyzer configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::Dialect;

/// Traversal depth no caller can exceed, regardless of configuration.
pub const HARD_MAX_DEPTH: usize = 20;

/// Depth used when a request does not carry a valid one.
pub const DEFAULT_DEPTH: usize = 5;

/// Depth value that requests an unbounded (visited-set guarded) walk.
pub const UNBOUNDED_DEPTH: i64 = -1;

/// Options controlling how the lineage graph is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct LineageConfig {
    /// Schema assumed for unqualified names. Lets `orders` and `public.orders`
    /// resolve to one node when set to `public`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_schema: Option<String>,
    pub dialect: Dialect,
}

/// Options shared by the flow, impact and column analyzers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerConfig {
    /// Depth applied when a request's depth is missing or invalid. Clamped to
    /// [`HARD_MAX_DEPTH`].
    pub default_depth: usize,
    /// Maximum number of names offered when a lookup misses.
    pub suggestion_limit: usize,
    /// Upper bound on paths reported per direction by the column tracker.
    pub max_column_paths: usize,
    pub lineage: LineageConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            default_depth: DEFAULT_DEPTH,
            suggestion_limit: 5,
            max_column_paths: 256,
            lineage: LineageConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Effective default depth, never zero and never above the ceiling.
    pub fn default_depth(&self) -> usize {
        self.default_depth.clamp(1, HARD_MAX_DEPTH)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            AnalyzerConfig::from_json(r#"{"defaultDepth": 3, "lineage": {"defaultSchema": "public"}}"#)
                .unwrap();
        assert_eq!(config.default_depth, 3);
        assert_eq!(config.suggestion_limit, 5);
        assert_eq!(config.lineage.default_schema.as_deref(), Some("public"));
        assert_eq!(config.lineage.dialect, Dialect::Generic);
    }

    #[test]
    fn default_depth_is_clamped() {
        let config = AnalyzerConfig {
            default_depth: 500,
            ..AnalyzerConfig::default()
        };
        assert_eq!(config.default_depth(), HARD_MAX_DEPTH);

        let zero = AnalyzerConfig {
            default_depth: 0,
            ..AnalyzerConfig::default()
        };
        assert_eq!(zero.default_depth(), 1);
    }
}
