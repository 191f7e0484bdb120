use crate::error::{AlignError, MatchFailure};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Short, repeatable label the model echoes for a unit (`a` in `(a)`).
///
/// Labels are normalized to trimmed lowercase so `(A)` and `(a)` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseLabel(String);

impl BaseLabel {
    pub fn new(label: impl AsRef<str>) -> Self {
        Self(label.as_ref().trim().to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BaseLabel {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Full marker: base label plus its 0-based rank among units sharing that label.
///
/// Rendered and parsed as `"{base}-{index}"`, e.g. `a-0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Marker {
    pub base: BaseLabel,
    pub index: usize,
}

impl Marker {
    #[must_use]
    pub const fn new(base: BaseLabel, index: usize) -> Self {
        Self { base, index }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.index)
    }
}

impl FromStr for Marker {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, index) = s
            .rsplit_once('-')
            .ok_or_else(|| AlignError::invalid_marker(s))?;
        if base.trim().is_empty() {
            return Err(AlignError::invalid_marker(s));
        }
        let index = index
            .parse::<usize>()
            .map_err(|_| AlignError::invalid_marker(s))?;
        Ok(Self::new(BaseLabel::new(base), index))
    }
}

impl From<Marker> for String {
    fn from(marker: Marker) -> Self {
        marker.to_string()
    }
}

impl TryFrom<String> for Marker {
    type Error = AlignError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One labeled unit of the source document. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Unique full marker
    pub marker: Marker,

    /// Unit text
    pub text: String,

    /// 0-based rank in the full source sequence
    pub position: usize,
}

impl SourceUnit {
    pub fn new(marker: Marker, text: impl Into<String>, position: usize) -> Self {
        Self {
            marker,
            text: text.into(),
            position,
        }
    }

    #[must_use]
    pub const fn base(&self) -> &BaseLabel {
        &self.marker.base
    }
}

/// How a winning candidate was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Near the document start: short history compared by exact equality
    EdgeExact,

    /// Response history found as an in-order subsequence of the candidate context
    Subsequence,
}

/// A successful resolution of a response token to a source unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchFound {
    pub marker: Marker,
    pub source_position: usize,

    /// Signature depth at which the candidate first passed
    pub match_depth: usize,

    /// Response-history labels compared against the candidate context
    pub history_len: usize,

    pub method: MatchMethod,
}

/// Outcome of matching one response token.
pub type MatchResult = std::result::Result<MatchFound, MatchFailure>;

/// Resolution attached to every extracted response token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Matched(MatchFound),
    Orphaned { failure: MatchFailure },
}

impl From<MatchResult> for Resolution {
    fn from(result: MatchResult) -> Self {
        match result {
            Ok(found) => Self::Matched(found),
            Err(failure) => Self::Orphaned { failure },
        }
    }
}

/// A labeled span extracted from the live stream, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseToken {
    pub base: BaseLabel,
    pub text: String,

    /// Assigned monotonically at extraction, whether or not the token matches
    pub response_position: usize,

    pub resolution: Resolution,
}

impl ResponseToken {
    #[must_use]
    pub const fn marker(&self) -> Option<&Marker> {
        match &self.resolution {
            Resolution::Matched(found) => Some(&found.marker),
            Resolution::Orphaned { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_matched(&self) -> bool {
        matches!(self.resolution, Resolution::Matched(_))
    }

    /// Key of the alignment record this token updates
    #[must_use]
    pub fn record_key(&self) -> RecordKey {
        match &self.resolution {
            Resolution::Matched(found) => RecordKey::Source(found.marker.clone()),
            Resolution::Orphaned { .. } => RecordKey::Orphan {
                base: self.base.clone(),
                response_position: self.response_position,
            },
        }
    }
}

/// Best-effort view of the in-flight (unclosed) label, for live preview only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialToken {
    pub base: BaseLabel,

    /// Where the label would bind if it closed now, if anywhere
    pub marker: Option<Marker>,

    pub text: String,
    pub response_position: usize,
}

/// Per-record alignment state.
///
/// `Matched` and `Orphan` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentState {
    Gap,
    Partial,
    Matched,
    Orphan,
}

impl AlignmentState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Matched | Self::Orphan)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gap => "gap",
            Self::Partial => "partial",
            Self::Matched => "matched",
            Self::Orphan => "orphan",
        }
    }
}

impl fmt::Display for AlignmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an alignment record.
///
/// Source units are keyed by full marker; orphans have no backing unit and are
/// keyed by the response token that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    Source(Marker),
    Orphan {
        base: BaseLabel,
        response_position: usize,
    },
}

impl RecordKey {
    #[must_use]
    pub const fn is_orphan(&self) -> bool {
        matches!(self, Self::Orphan { .. })
    }
}

impl From<Marker> for RecordKey {
    fn from(marker: Marker) -> Self {
        Self::Source(marker)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(marker) => write!(f, "{marker}"),
            Self::Orphan {
                base,
                response_position,
            } => write!(f, "orphan:{base}@{response_position}"),
        }
    }
}

impl Serialize for RecordKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Value of the global sequence counter a proposal was stamped with.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(pub u64);

impl Sequence {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
