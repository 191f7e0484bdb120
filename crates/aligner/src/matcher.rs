use crate::config::{AlignerConfig, MatchStrategy, TieBreak};
use crate::error::MatchFailure;
use crate::lookup::length_compatible;
use crate::source::SourceIndex;
use crate::types::{BaseLabel, MatchFound, MatchMethod, MatchResult};
use crate::window::{CandidateWindow, WindowStats};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// A candidate that passed the context test during one resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    slot: usize,
    position: usize,
    depth: usize,
    method: MatchMethod,
}

/// Resolves response labels to source units using preceding-label context.
///
/// Owns one [`CandidateWindow`] per base label. Only the matcher flips
/// `used` on window entries, and only for the winner of a resolution.
#[derive(Debug)]
pub struct Matcher {
    index: Arc<SourceIndex>,
    config: AlignerConfig,
    windows: BTreeMap<BaseLabel, CandidateWindow>,
}

impl Matcher {
    /// Create a matcher with freshly initialized windows for every source label
    pub fn new(index: Arc<SourceIndex>, config: AlignerConfig) -> Self {
        let windows: BTreeMap<BaseLabel, CandidateWindow> = index
            .labels()
            .filter_map(|label| {
                CandidateWindow::new(label, &index, config.window_size)
                    .map(|window| (label.clone(), window))
            })
            .collect();

        log::info!(
            "Candidate windows initialized: {}",
            windows
                .iter()
                .map(|(label, window)| {
                    let stats = window.stats();
                    format!("({label}):{}/{}", stats.loaded, stats.total)
                })
                .collect::<Vec<_>>()
                .join(", ")
        );

        Self {
            index,
            config,
            windows,
        }
    }

    /// Find, claim and return the best unused source unit for `label`.
    ///
    /// `history` is the base labels of previously *matched* response tokens in
    /// arrival order; only its last `max_depth` labels are used.
    pub fn resolve(
        &mut self,
        label: &BaseLabel,
        history: &[BaseLabel],
        response_position: usize,
    ) -> MatchResult {
        let Some(window) = self.windows.get_mut(label) else {
            return Err(MatchFailure::UnknownBaseLabel {
                label: label.clone(),
            });
        };

        let recent = tail(history, self.config.max_depth);
        let mut candidates = collect_candidates(window, &self.config, recent);

        if candidates.is_empty() && window.load_all(&self.index) > 0 {
            candidates = collect_candidates(window, &self.config, recent);
        }

        let Some(best) = select(&candidates, response_position, self.config.tie_break) else {
            return Err(MatchFailure::NoContextMatch {
                label: label.clone(),
                history: recent.to_vec(),
            });
        };

        let found = found_from(window, best, recent.len());
        window.mark_used(best.slot);
        window.slide(&self.index, self.config.slide_step);
        Ok(found)
    }

    /// Resolve without claiming anything or growing windows.
    ///
    /// Used for live previews of an unclosed label.
    #[must_use]
    pub fn peek(
        &self,
        label: &BaseLabel,
        history: &[BaseLabel],
        response_position: usize,
    ) -> MatchResult {
        let Some(window) = self.windows.get(label) else {
            return Err(MatchFailure::UnknownBaseLabel {
                label: label.clone(),
            });
        };

        let recent = tail(history, self.config.max_depth);
        let candidates = scan_candidates(window, &self.config, recent);
        select(&candidates, response_position, self.config.tie_break)
            .map(|best| found_from(window, best, recent.len()))
            .ok_or_else(|| MatchFailure::NoContextMatch {
                label: label.clone(),
                history: recent.to_vec(),
            })
    }

    #[must_use]
    pub fn window(&self, label: &BaseLabel) -> Option<&CandidateWindow> {
        self.windows.get(label)
    }

    #[must_use]
    pub fn window_stats(&self) -> BTreeMap<BaseLabel, WindowStats> {
        self.windows
            .iter()
            .map(|(label, window)| (label.clone(), window.stats()))
            .collect()
    }

    #[must_use]
    pub fn index(&self) -> &SourceIndex {
        &self.index
    }

    #[must_use]
    pub const fn config(&self) -> &AlignerConfig {
        &self.config
    }
}

fn tail(history: &[BaseLabel], depth: usize) -> &[BaseLabel] {
    &history[history.len().saturating_sub(depth)..]
}

fn found_from(window: &CandidateWindow, best: Candidate, history_len: usize) -> MatchFound {
    let entry = &window.entries()[best.slot];
    MatchFound {
        marker: entry.marker.clone(),
        source_position: best.position,
        match_depth: best.depth,
        history_len,
        method: best.method,
    }
}

fn is_subsequence(needle: &[BaseLabel], haystack: &[BaseLabel]) -> bool {
    let mut rest = haystack.iter();
    needle.iter().all(|label| rest.any(|candidate| candidate == label))
}

/// Edge entries pass only against a history no longer than their own context,
/// by exact equality with the same-length suffix of that context
fn edge_candidates(window: &CandidateWindow, recent: &[BaseLabel]) -> Vec<Candidate> {
    window
        .unused()
        .filter(|(_, entry)| entry.edge && recent.len() <= entry.position)
        .filter(|(_, entry)| entry.signature.at_depth(recent.len()) == recent)
        .map(|(slot, entry)| Candidate {
            slot,
            position: entry.position,
            depth: recent.len(),
            method: MatchMethod::EdgeExact,
        })
        .collect()
}

fn collect_candidates(
    window: &mut CandidateWindow,
    config: &AlignerConfig,
    recent: &[BaseLabel],
) -> Vec<Candidate> {
    match config.strategy {
        MatchStrategy::Scan => scan_candidates(window, config, recent),
        MatchStrategy::Lookup => lookup_candidates(window, config, recent),
    }
}

/// Every unused entry whose context at some depth holds the whole of
/// `recent` in order and is at most `length_tolerance` labels longer
fn scan_candidates(
    window: &CandidateWindow,
    config: &AlignerConfig,
    recent: &[BaseLabel],
) -> Vec<Candidate> {
    let mut candidates = edge_candidates(window, recent);
    let mut seen: HashSet<usize> = candidates.iter().map(|c| c.slot).collect();

    for depth in config.depths() {
        for (slot, entry) in window.unused() {
            if entry.edge || seen.contains(&slot) {
                continue;
            }
            let context = entry.signature.at_depth(depth);
            if length_compatible(context.len(), recent.len(), config.length_tolerance)
                && is_subsequence(recent, context)
            {
                seen.insert(slot);
                candidates.push(Candidate {
                    slot,
                    position: entry.position,
                    depth,
                    method: MatchMethod::Subsequence,
                });
            }
        }
    }

    candidates
}

/// Same candidate set, in the same order, as [`scan_candidates`]
fn lookup_candidates(
    window: &mut CandidateWindow,
    config: &AlignerConfig,
    recent: &[BaseLabel],
) -> Vec<Candidate> {
    let mut candidates = edge_candidates(window, recent);
    let mut seen: HashSet<usize> = candidates.iter().map(|c| c.slot).collect();

    for depth in config.depths() {
        let slots = window.lookup(config).get(depth, recent).to_vec();
        for slot in slots {
            let Some(entry) = window.entry(slot) else {
                continue;
            };
            if entry.is_used() || !seen.insert(slot) {
                continue;
            }
            candidates.push(Candidate {
                slot,
                position: entry.position,
                depth,
                method: MatchMethod::Subsequence,
            });
        }
    }

    candidates
}

fn select(candidates: &[Candidate], response_position: usize, tie_break: TieBreak) -> Option<Candidate> {
    let distance = |c: &Candidate| c.position.abs_diff(response_position);
    match tie_break {
        TieBreak::Proximity => candidates.iter().min_by_key(|c| distance(c)).copied(),
        TieBreak::DeepestMatch => candidates
            .iter()
            .min_by_key(|c| (std::cmp::Reverse(c.depth), distance(c)))
            .copied(),
        TieBreak::FirstSeen => candidates.first().copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn labels(items: &[&str]) -> Vec<BaseLabel> {
        items.iter().map(|l| BaseLabel::new(l)).collect()
    }

    fn matcher(items: &[&str], config: AlignerConfig) -> Matcher {
        let index = SourceIndex::from_labels(items.iter().map(|l| (*l, "")), &config).unwrap();
        Matcher::new(Arc::new(index), config)
    }

    fn resolve(m: &mut Matcher, label: &str, history: &[&str], pos: usize) -> MatchResult {
        m.resolve(&BaseLabel::new(label), &labels(history), pos)
    }

    #[test]
    fn test_unknown_label() {
        let mut m = matcher(&["a", "b"], AlignerConfig::default());
        assert_eq!(
            resolve(&mut m, "z", &[], 0),
            Err(MatchFailure::UnknownBaseLabel {
                label: BaseLabel::new("z")
            })
        );
    }

    #[test]
    fn test_history_picks_between_same_label_units() {
        let mut m = matcher(&["a", "b", "a"], AlignerConfig::default());

        let b = resolve(&mut m, "b", &[], 0).unwrap();
        assert_eq!(b.marker.to_string(), "b-0");

        let a = resolve(&mut m, "a", &["b"], 1).unwrap();
        assert_eq!(a.marker.to_string(), "a-1");
        assert_eq!(a.method, MatchMethod::EdgeExact);
    }

    #[test]
    fn test_empty_history_prefers_nearest_edge_unit() {
        let mut m = matcher(&["a", "b", "a"], AlignerConfig::default());
        let a = resolve(&mut m, "a", &[], 0).unwrap();
        assert_eq!(a.marker.to_string(), "a-0");
        assert_eq!(a.source_position, 0);
    }

    #[test]
    fn test_full_context_subsequence_match() {
        let mut m = matcher(&["a", "b", "c", "d", "e", "x", "a", "b", "c", "d", "f", "x"], AlignerConfig::default());

        let second = resolve(&mut m, "x", &["a", "b", "c", "d", "f"], 11).unwrap();
        assert_eq!(second.marker.to_string(), "x-1");
        assert_eq!(second.match_depth, 5);
        assert_eq!(second.history_len, 5);
        assert_eq!(second.method, MatchMethod::Subsequence);

        let first = resolve(&mut m, "x", &["a", "b", "c", "d", "e"], 5).unwrap();
        assert_eq!(first.marker.to_string(), "x-0");
    }

    #[test]
    fn test_short_history_tolerates_skipped_source_unit() {
        let mut m = matcher(&["p", "q", "a", "b", "c", "d", "x"], AlignerConfig::default());
        // x-0 context is [q, a, b, c, d]; the model skipped "c"
        let found = resolve(&mut m, "x", &["q", "a", "b", "d"], 5).unwrap();
        assert_eq!(found.marker.to_string(), "x-0");
        assert_eq!(found.match_depth, 5);
        assert_eq!(found.history_len, 4);
    }

    #[test]
    fn test_full_history_with_skip_fails_closed() {
        let mut m = matcher(&["p", "q", "a", "b", "c", "d", "x"], AlignerConfig::default());
        // "p" lies outside every context of x-0 once five labels are compared
        let err = resolve(&mut m, "x", &["p", "q", "a", "b", "d"], 5).unwrap_err();
        assert_eq!(
            err,
            MatchFailure::NoContextMatch {
                label: BaseLabel::new("x"),
                history: labels(&["p", "q", "a", "b", "d"]),
            }
        );
        assert_eq!(m.window_stats()[&BaseLabel::new("x")].used, 0);
    }

    #[test]
    fn test_older_history_must_agree_too() {
        let items = ["a", "b", "c", "x", "y", "z", "a", "b", "c", "t"];
        let mut m = matcher(&items, AlignerConfig::default());
        // t-0 context [y, z, a, b, c] ends like the history but disagrees earlier
        assert!(resolve(&mut m, "t", &["c", "x", "a", "b", "c"], 7).is_err());
        // a-1 context [b, c, x, y, z] holds [b, c, x] but not the leading "a"
        assert!(resolve(&mut m, "a", &["a", "b", "c", "x"], 4).is_err());
        assert!(resolve(&mut m, "t", &["z", "a", "b", "c"], 9).is_ok());
    }

    #[test]
    fn test_no_context_match_fails_closed() {
        let mut m = matcher(&["a", "b", "c", "d", "x"], AlignerConfig::default());
        let err = resolve(&mut m, "x", &["q", "r", "s"], 4).unwrap_err();
        assert_eq!(
            err,
            MatchFailure::NoContextMatch {
                label: BaseLabel::new("x"),
                history: labels(&["q", "r", "s"]),
            }
        );
    }

    #[test]
    fn test_edge_unit_rejects_differing_history() {
        let mut m = matcher(&["a", "b", "c"], AlignerConfig::default());
        // c-0 needs history [a, b]
        assert!(resolve(&mut m, "c", &["b", "b"], 2).is_err());
        assert!(resolve(&mut m, "c", &["a", "c"], 2).is_err());
        assert!(resolve(&mut m, "c", &["a", "b"], 2).is_ok());
    }

    #[test]
    fn test_units_are_claimed_once() {
        let mut m = matcher(&["a", "b", "c", "d", "x"], AlignerConfig::default());
        assert!(resolve(&mut m, "x", &["b", "c", "d"], 4).is_ok());
        assert!(resolve(&mut m, "x", &["b", "c", "d"], 5).is_err());
        assert_eq!(m.window_stats()[&BaseLabel::new("x")].used, 1);
    }

    #[test]
    fn test_full_load_fallback_reaches_units_beyond_window() {
        let config = AlignerConfig {
            window_size: 1,
            slide_step: 0,
            ..Default::default()
        };
        let mut m = matcher(&["a", "b", "c", "x", "d", "e", "f", "x"], config);
        assert_eq!(m.window_stats()[&BaseLabel::new("x")].loaded, 1);

        let found = resolve(&mut m, "x", &["d", "e", "f"], 7).unwrap();
        assert_eq!(found.marker.to_string(), "x-1");
        assert_eq!(m.window(&BaseLabel::new("x")).unwrap().full_loads(), 1);
    }

    #[test]
    fn test_successful_match_slides_window() {
        let config = AlignerConfig {
            window_size: 1,
            slide_step: 2,
            ..Default::default()
        };
        let mut m = matcher(&["x", "x", "x", "x", "x"], config);
        assert!(resolve(&mut m, "x", &[], 0).is_ok());
        assert_eq!(m.window_stats()[&BaseLabel::new("x")].loaded, 3);
    }

    #[test]
    fn test_peek_does_not_claim() {
        let m = matcher(&["a", "b", "a"], AlignerConfig::default());
        let first = m.peek(&BaseLabel::new("a"), &[], 0).unwrap();
        let second = m.peek(&BaseLabel::new("a"), &[], 0).unwrap();
        assert_eq!(first, second);
        assert_eq!(m.window_stats()[&BaseLabel::new("a")].used, 0);
    }

    #[test]
    fn test_tie_break_strategies() {
        // Two x units with identical depth-3 context [a, b, c]
        let items = ["q", "a", "b", "c", "x", "r", "s", "a", "b", "c", "x"];
        let history = ["a", "b", "c"];

        let mut proximity = matcher(&items, AlignerConfig::default());
        assert_eq!(resolve(&mut proximity, "x", &history, 9).unwrap().marker.to_string(), "x-1");

        let first_seen = AlignerConfig {
            tie_break: TieBreak::FirstSeen,
            ..Default::default()
        };
        let mut first = matcher(&items, first_seen);
        assert_eq!(resolve(&mut first, "x", &history, 9).unwrap().marker.to_string(), "x-0");
    }

    #[test]
    fn test_deepest_match_prefers_deeper_context() {
        // x-0 context [a, b, c] passes at depth 5; x-1 context [d, a, b, e, f]
        // is too long for a two-label history and passes only at depth 4
        let items = ["a", "b", "c", "x", "d", "a", "b", "e", "f", "x"];
        let history = ["a", "b"];

        let mut nearest = matcher(&items, AlignerConfig::default());
        let found = resolve(&mut nearest, "x", &history, 9).unwrap();
        assert_eq!(found.marker.to_string(), "x-1");
        assert_eq!(found.match_depth, 4);

        let deepest = AlignerConfig {
            tie_break: TieBreak::DeepestMatch,
            ..Default::default()
        };
        let mut m = matcher(&items, deepest);
        let found = resolve(&mut m, "x", &history, 9).unwrap();
        assert_eq!(found.marker.to_string(), "x-0");
        assert_eq!(found.match_depth, 5);
    }

    #[test]
    fn test_lookup_strategy_agrees_with_scan() {
        let items = [
            "a", "b", "a", "c", "b", "a", "d", "a", "b", "c", "a", "d", "b", "a", "c", "a",
        ];
        let histories: [&[&str]; 5] = [
            &[],
            &["a", "b"],
            &["b", "a", "d"],
            &["a", "c", "b", "a", "d"],
            &["a", "d", "b", "c"],
        ];

        for history in histories {
            for pos in [0, 5, 12] {
                let mut scan = matcher(&items, AlignerConfig::default());
                let mut lookup = matcher(
                    &items,
                    AlignerConfig {
                        strategy: MatchStrategy::Lookup,
                        ..Default::default()
                    },
                );
                assert_eq!(
                    resolve(&mut scan, "a", history, pos),
                    resolve(&mut lookup, "a", history, pos),
                    "history {history:?} at {pos}"
                );
            }
        }
    }

    #[test]
    fn test_is_subsequence() {
        assert!(is_subsequence(&labels(&["a", "c"]), &labels(&["a", "b", "c"])));
        assert!(is_subsequence(&[], &labels(&["a"])));
        assert!(!is_subsequence(&labels(&["c", "a"]), &labels(&["a", "b", "c"])));
        assert!(!is_subsequence(&labels(&["a", "a"]), &labels(&["a", "b"])));
    }
}
