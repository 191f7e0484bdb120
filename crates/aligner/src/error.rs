use crate::types::{AlignmentState, BaseLabel, RecordKey, Sequence};
use serde::Serialize;
use thiserror::Error;

/// Result type for setup-time aligner operations
pub type Result<T> = std::result::Result<T, AlignError>;

/// Errors raised while configuring the aligner or indexing a source.
///
/// Nothing on the streaming path returns these: a malformed stream degrades
/// to more orphans, never to an error.
#[derive(Error, Debug)]
pub enum AlignError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Source units are not a well-formed ordered sequence
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// Two source units share the same full marker
    #[error("Duplicate marker in source: {0}")]
    DuplicateMarker(String),

    /// A full marker string could not be parsed
    #[error("Invalid marker: {0}")]
    InvalidMarker(String),

    /// The label pattern failed to compile
    #[error("Invalid label pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl AlignError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid source error
    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Self::InvalidSource(msg.into())
    }

    /// Create an invalid marker error
    pub fn invalid_marker(marker: impl Into<String>) -> Self {
        Self::InvalidMarker(marker.into())
    }
}

/// Why a response token could not be bound to a source unit.
///
/// Both variants are recovered locally: the token becomes an orphan and the
/// failure is aggregated into the end-of-stream diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchFailure {
    /// The label never appeared in the source at all
    #[error("base label ({label}) does not exist in the source")]
    UnknownBaseLabel { label: BaseLabel },

    /// The label exists but no unused candidate's context lines up
    #[error("no unused ({label}) matches context [{}]", join_labels(.history))]
    NoContextMatch {
        label: BaseLabel,
        history: Vec<BaseLabel>,
    },
}

impl MatchFailure {
    /// Stable snake_case name of the failure kind
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnknownBaseLabel { .. } => "unknown_base_label",
            Self::NoContextMatch { .. } => "no_context_match",
        }
    }

    #[must_use]
    pub const fn label(&self) -> &BaseLabel {
        match self {
            Self::UnknownBaseLabel { label } | Self::NoContextMatch { label, .. } => label,
        }
    }
}

/// Why the state machine refused a proposal.
///
/// Rejections are expected under deferred delivery; they are logged for race
/// forensics and counted, never surfaced to presentation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    /// Superseded by an update stamped with a later sequence
    #[error("stale proposal for {key}: sequence {sequence} < last applied {last_applied}")]
    StaleProposal {
        key: RecordKey,
        sequence: Sequence,
        last_applied: Sequence,
    },

    /// Attempt to change a record that already reached a terminal state
    #[error("terminal regression for {key}: {current} -> {attempted}")]
    TerminalRegression {
        key: RecordKey,
        current: AlignmentState,
        attempted: AlignmentState,
    },

    /// Proposal for a record the state machine does not know
    #[error("unknown record {key} (attempted {attempted})")]
    UnknownRecord {
        key: RecordKey,
        attempted: AlignmentState,
    },
}

fn join_labels(labels: &[BaseLabel]) -> String {
    labels
        .iter()
        .map(BaseLabel::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
