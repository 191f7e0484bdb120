//! Direct-lookup variant of subsequence matching.
//!
//! Instead of scanning every candidate and testing containment, each unused
//! entry's context is expanded once into all order-preserving `k`-label
//! combinations (the "choose k of n" subsets that tolerate skipped context)
//! and filed under a serialized key. Resolving a history is then a single
//! hash lookup per depth.
//!
//! A history `r` is contained in context `c` exactly when `r` equals one of
//! the `|r|`-combinations of `c`. Only lengths within the tolerance are
//! filed, so lookups agree with the scan.

use crate::config::AlignerConfig;
use crate::types::BaseLabel;
use crate::window::CandidateEntry;
use std::collections::HashMap;

const KEY_SEPARATOR: char = '\u{1f}';

/// Serialized form of a label sequence, used as a lookup key
pub(crate) fn signature_key(labels: &[BaseLabel]) -> String {
    let mut key = String::with_capacity(labels.len() * 2);
    for (i, label) in labels.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(label.as_str());
    }
    key
}

/// A history of `history_len` labels may be tested against a context of
/// `context_len` labels only when the context is at most `tolerance` longer
pub(crate) fn length_compatible(context_len: usize, history_len: usize, tolerance: usize) -> bool {
    history_len <= context_len && context_len - history_len <= tolerance
}

/// History lengths a context of `context_len` labels may be tested with, longest first
pub(crate) fn history_lengths(context_len: usize, tolerance: usize) -> impl Iterator<Item = usize> {
    (context_len.saturating_sub(tolerance)..=context_len).rev()
}

/// All order-preserving `k`-label combinations of `labels`
pub(crate) fn combinations(labels: &[BaseLabel], k: usize) -> Vec<Vec<BaseLabel>> {
    let n = labels.len();
    if k > n {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut picks: Vec<usize> = (0..k).collect();
    loop {
        out.push(picks.iter().map(|&i| labels[i].clone()).collect());

        // Advance the rightmost pick that still has room
        let Some(i) = (0..k).rev().find(|&i| picks[i] < n - k + i) else {
            return out;
        };
        picks[i] += 1;
        for j in i + 1..k {
            picks[j] = picks[j - 1] + 1;
        }
    }
}

/// Combination index over the unused, non-edge entries of one window.
///
/// Edge entries are never filed here; they are always compared exactly.
#[derive(Debug, Default)]
pub struct SignatureLookup {
    tables: HashMap<(usize, usize), HashMap<String, Vec<usize>>>,
    keys: usize,
}

impl SignatureLookup {
    pub fn build(entries: &[CandidateEntry], config: &AlignerConfig) -> Self {
        let mut lookup = Self::default();

        for (slot, entry) in entries.iter().enumerate() {
            if entry.is_used() || entry.edge {
                continue;
            }

            for depth in config.depths() {
                let context = entry.signature.at_depth(depth);
                for k in history_lengths(context.len(), config.length_tolerance) {
                    let table = lookup.tables.entry((depth, k)).or_default();
                    for combo in combinations(context, k) {
                        let slots = table.entry(signature_key(&combo)).or_default();
                        // Repeated labels yield duplicate combinations for the same slot
                        if slots.last() != Some(&slot) {
                            slots.push(slot);
                            lookup.keys += 1;
                        }
                    }
                }
            }
        }

        log::trace!(
            "Built signature lookup: {} keys over {} tables",
            lookup.keys,
            lookup.tables.len()
        );
        lookup
    }

    /// Slots whose depth-`depth` context contains all of `history` in order, in load order
    #[must_use]
    pub fn get(&self, depth: usize, history: &[BaseLabel]) -> &[usize] {
        self.tables
            .get(&(depth, history.len()))
            .and_then(|table| table.get(&signature_key(history)))
            .map_or(&[], Vec::as_slice)
    }

    /// Number of (key, slot) pairs filed
    #[must_use]
    pub const fn len(&self) -> usize {
        self.keys
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.keys == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceIndex;
    use crate::window::CandidateWindow;

    fn labels(items: &[&str]) -> Vec<BaseLabel> {
        items.iter().map(|l| BaseLabel::new(l)).collect()
    }

    #[test]
    fn test_combinations_preserve_order() {
        let combos = combinations(&labels(&["a", "b", "c"]), 2);
        assert_eq!(
            combos,
            vec![
                labels(&["a", "b"]),
                labels(&["a", "c"]),
                labels(&["b", "c"]),
            ]
        );
        assert_eq!(combinations(&labels(&["a", "b", "c", "d", "e"]), 3).len(), 10);
        assert_eq!(combinations(&labels(&["a"]), 2), Vec::<Vec<BaseLabel>>::new());
        assert_eq!(combinations(&labels(&["a", "b"]), 0), vec![Vec::new()]);
    }

    #[test]
    fn test_history_lengths() {
        assert_eq!(history_lengths(5, 2).collect::<Vec<_>>(), vec![5, 4, 3]);
        assert_eq!(history_lengths(2, 2).collect::<Vec<_>>(), vec![2, 1, 0]);
        assert_eq!(history_lengths(3, 0).collect::<Vec<_>>(), vec![3]);

        assert!(length_compatible(5, 3, 2));
        assert!(!length_compatible(5, 2, 2));
        assert!(!length_compatible(4, 5, 2));
        assert!(history_lengths(5, 2).all(|k| length_compatible(5, k, 2)));
    }

    #[test]
    fn test_signature_key_is_unambiguous() {
        assert_ne!(
            signature_key(&labels(&["ab", "c"])),
            signature_key(&labels(&["a", "bc"]))
        );
    }

    #[test]
    fn test_lookup_finds_context_with_skipped_label() {
        let config = AlignerConfig::default();
        // x sits at position 6 with context [b, c, d, e, f]
        let index = SourceIndex::from_labels(
            ["a", "b", "c", "d", "e", "f", "x"].iter().map(|l| (*l, "")),
            &config,
        )
        .unwrap();
        let window = CandidateWindow::new(&BaseLabel::new("x"), &index, 8).unwrap();
        let lookup = SignatureLookup::build(window.entries(), &config);

        assert_eq!(lookup.get(5, &labels(&["b", "c", "d", "e", "f"])), &[0]);
        // model skipped "d"
        assert_eq!(lookup.get(5, &labels(&["b", "c", "e", "f"])), &[0]);
        // order matters
        assert!(lookup.get(5, &labels(&["c", "b", "e", "f"])).is_empty());
        // too short a history for a five-label context
        assert!(lookup.get(5, &labels(&["e", "f"])).is_empty());
        // depth 3 context is [d, e, f]
        assert_eq!(lookup.get(3, &labels(&["d", "f"])), &[0]);
        assert!(lookup.get(3, &labels(&["b", "f"])).is_empty());
    }

    #[test]
    fn test_lookup_skips_edge_and_used_entries() {
        let config = AlignerConfig::default();
        let index = SourceIndex::from_labels(
            ["x", "a", "b", "c", "x"].iter().map(|l| (*l, "")),
            &config,
        )
        .unwrap();
        let mut window = CandidateWindow::new(&BaseLabel::new("x"), &index, 8).unwrap();

        let lookup = SignatureLookup::build(window.entries(), &config);
        assert_eq!(lookup.get(3, &labels(&["a", "b", "c"])), &[1]);
        assert!(lookup.get(3, &[]).is_empty());

        window.mark_used(1);
        let lookup = SignatureLookup::build(window.entries(), &config);
        assert!(lookup.is_empty());
    }
}
