//! End-of-stream reporting.
//!
//! Everything here is read-only: building a report never changes match or
//! alignment state.

use crate::error::MatchFailure;
use crate::state::RejectionCounts;
use crate::types::{BaseLabel, Marker, SourceUnit};
use crate::window::WindowStats;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One response token that could not be bound to a source unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipWarning {
    pub response_position: usize,
    pub base: BaseLabel,
    pub failure: MatchFailure,
}

impl fmt::Display for SkipWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({}): {}", self.response_position, self.base, self.failure)
    }
}

/// How much of the source the matcher touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Coverage {
    /// Source units claimed by a response token
    pub used: usize,

    /// Source units ever loaded into a candidate window
    pub loaded: usize,

    pub total: usize,
}

impl Coverage {
    /// Fraction of source units matched, 0.0 for an empty source
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.used as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    /// Before the first matched unit
    Leading,
    Interior,
    /// After the last matched unit
    Trailing,
}

/// Maximal run of consecutive source units left without a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GapRun {
    pub kind: GapKind,
    pub first: Marker,
    pub last: Marker,
    pub start_position: usize,
    pub len: usize,
}

/// Operator-facing summary of one stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub total_tokens: usize,
    pub matched: usize,
    pub skipped: usize,
    pub unknown_labels: usize,
    pub no_context_matches: usize,
    pub reasons: Vec<SkipWarning>,
    pub coverage: Coverage,
    pub windows: BTreeMap<BaseLabel, WindowStats>,
    pub rejections: RejectionCounts,
    pub gap_runs: Vec<GapRun>,
}

impl Diagnostics {
    pub(crate) fn new(
        total_tokens: usize,
        reasons: Vec<SkipWarning>,
        windows: BTreeMap<BaseLabel, WindowStats>,
        rejections: RejectionCounts,
        gap_runs: Vec<GapRun>,
    ) -> Self {
        let unknown_labels = reasons
            .iter()
            .filter(|w| matches!(w.failure, MatchFailure::UnknownBaseLabel { .. }))
            .count();
        let coverage = windows.values().fold(Coverage::default(), |acc, stats| Coverage {
            used: acc.used + stats.used,
            loaded: acc.loaded + stats.loaded,
            total: acc.total + stats.total,
        });

        Self {
            total_tokens,
            matched: total_tokens.saturating_sub(reasons.len()),
            skipped: reasons.len(),
            unknown_labels,
            no_context_matches: reasons.len() - unknown_labels,
            reasons,
            coverage,
            windows,
            rejections,
            gap_runs,
        }
    }

    /// One-line summary for logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} tokens: {} matched, {} skipped ({} unknown label, {} no context); {}/{} source units covered, {} gap runs",
            self.total_tokens,
            self.matched,
            self.skipped,
            self.unknown_labels,
            self.no_context_matches,
            self.coverage.used,
            self.coverage.total,
            self.gap_runs.len()
        )
    }
}

/// Group unmatched source units into maximal runs.
///
/// `units` must be in position order. When nothing matched, the whole source
/// is one leading run.
pub fn find_gap_runs<F>(units: &[SourceUnit], is_matched: F) -> Vec<GapRun>
where
    F: Fn(&Marker) -> bool,
{
    let matched: Vec<bool> = units.iter().map(|unit| is_matched(&unit.marker)).collect();
    let first_match = matched.iter().position(|&m| m);
    let last_match = matched.iter().rposition(|&m| m);

    let mut runs = Vec::new();
    let mut start = None;
    for (i, &is_match) in matched.iter().chain(std::iter::once(&true)).enumerate() {
        match (is_match, start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                let kind = match (first_match, last_match) {
                    (Some(first), _) if s < first => GapKind::Leading,
                    (_, Some(last)) if s > last => GapKind::Trailing,
                    (None, _) => GapKind::Leading,
                    _ => GapKind::Interior,
                };
                runs.push(GapRun {
                    kind,
                    first: units[s].marker.clone(),
                    last: units[i - 1].marker.clone(),
                    start_position: units[s].position,
                    len: i - s,
                });
                start = None;
            }
            _ => {}
        }
    }
    runs
}
