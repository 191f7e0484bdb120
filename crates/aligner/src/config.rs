use crate::error::{AlignError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default label syntax: a single letter in parentheses, e.g. `(a)`.
pub const DEFAULT_LABEL_PATTERN: &str = r"(?i)\(([a-z])\)\s*";

/// Configuration for context-window alignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Shortest context signature used for approximate matching.
    /// Units at `position < min_depth` are edge cases matched exactly.
    pub min_depth: usize,

    /// Longest context signature (most specific evidence)
    pub max_depth: usize,

    /// Units per base label loaded into the candidate window up front
    pub window_size: usize,

    /// Units loaded into a window after each successful match
    pub slide_step: usize,

    /// How many labels longer than the response history a candidate signature may be
    pub length_tolerance: usize,

    /// How candidate signatures are searched
    pub strategy: MatchStrategy,

    /// How a winner is picked among several passing candidates
    pub tie_break: TieBreak,

    /// Regex locating label headers; capture group 1 is the base label.
    /// Headers longer than `max_header_len` bytes cannot be reassembled when
    /// split across chunks before the first label
    pub label_pattern: String,

    /// Unlabeled bytes kept while waiting for the first label header
    pub max_header_len: usize,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            min_depth: 3,
            max_depth: 5,
            window_size: 8,
            slide_step: 3,
            length_tolerance: 2,
            strategy: MatchStrategy::Scan,
            tie_break: TieBreak::Proximity,
            label_pattern: DEFAULT_LABEL_PATTERN.to_string(),
            max_header_len: 32,
        }
    }
}

impl AlignerConfig {
    /// Create config tuned for very long sources (direct-lookup matching, wider windows)
    pub fn for_long_sources() -> Self {
        Self {
            window_size: 16,
            slide_step: 4,
            strategy: MatchStrategy::Lookup,
            ..Default::default()
        }
    }

    /// Create config that tolerates no skipped context and prefers the deepest evidence
    pub fn strict() -> Self {
        Self {
            length_tolerance: 0,
            tie_break: TieBreak::DeepestMatch,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.min_depth == 0 {
            return Err(AlignError::invalid_config("min_depth must be > 0"));
        }

        if self.min_depth > self.max_depth {
            return Err(AlignError::invalid_config(format!(
                "min_depth ({}) cannot exceed max_depth ({})",
                self.min_depth, self.max_depth
            )));
        }

        if self.window_size == 0 {
            return Err(AlignError::invalid_config("window_size must be > 0"));
        }

        if self.max_header_len == 0 {
            return Err(AlignError::invalid_config("max_header_len must be > 0"));
        }

        self.compile_label_pattern()?;
        Ok(())
    }

    /// Compile `label_pattern`, requiring at least one capture group
    pub fn compile_label_pattern(&self) -> Result<Regex> {
        let pattern = Regex::new(&self.label_pattern)?;
        if pattern.captures_len() < 2 {
            return Err(AlignError::invalid_config(format!(
                "label_pattern {:?} has no capture group for the base label",
                self.label_pattern
            )));
        }
        Ok(pattern)
    }

    /// Signature depths from most to least specific
    pub fn depths(&self) -> impl Iterator<Item = usize> {
        (self.min_depth..=self.max_depth).rev()
    }
}

/// Strategy for searching candidate signatures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Linear scan with in-order subsequence containment.
    /// Cheap to set up, fine for typical window sizes
    #[default]
    Scan,

    /// Direct lookup keyed by serialized signature combinations.
    /// Pays for enumerating combinations up front, O(1) per depth afterwards
    Lookup,
}

/// Tie-break among candidates that all pass the context test
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Source position closest to the response position, first seen on ties.
    /// Assumes output is globally near-monotonic with the source
    #[default]
    Proximity,

    /// Deepest passing signature, then proximity
    DeepestMatch,

    /// First candidate collected
    FirstSeen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = AlignerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_preset_configs_valid() {
        assert!(AlignerConfig::for_long_sources().validate().is_ok());
        assert!(AlignerConfig::strict().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AlignerConfig::default();

        // Invalid: min > max
        config.min_depth = 6;
        assert!(config.validate().is_err());

        // Invalid: min = 0
        config.min_depth = 0;
        assert!(config.validate().is_err());

        // Invalid: empty window
        config.min_depth = 3;
        config.window_size = 0;
        assert!(config.validate().is_err());

        config.window_size = 4;
        assert!(config.validate().is_ok());

        // Invalid: nowhere to hold a split header
        config.max_header_len = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_label_pattern_needs_capture_group() {
        let config = AlignerConfig {
            label_pattern: r"\([a-z]\)".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AlignError::InvalidConfig(_))
        ));

        let broken = AlignerConfig {
            label_pattern: r"(unclosed".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            broken.validate(),
            Err(AlignError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_depths_run_most_specific_first() {
        let config = AlignerConfig::default();
        assert_eq!(config.depths().collect::<Vec<_>>(), vec![5, 4, 3]);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AlignerConfig = toml::from_str(
            r#"
            window_size = 12
            strategy = "lookup"
            tie_break = "deepest_match"
            "#,
        )
        .unwrap();
        assert_eq!(config.window_size, 12);
        assert_eq!(config.strategy, MatchStrategy::Lookup);
        assert_eq!(config.tie_break, TieBreak::DeepestMatch);
        assert_eq!(config.max_depth, 5);
        assert!(config.validate().is_ok());
    }
}
