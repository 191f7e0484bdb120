use crate::config::AlignerConfig;
use crate::lookup::SignatureLookup;
use crate::source::{ContextSignature, SourceIndex};
use crate::types::{BaseLabel, Marker};
use serde::Serialize;

/// One source unit exposed to the matcher.
#[derive(Debug, Clone)]
pub struct CandidateEntry {
    pub marker: Marker,
    pub position: usize,
    pub signature: ContextSignature,

    /// Built from `position < min_depth`; matched by exact equality only
    pub edge: bool,

    used: bool,
}

impl CandidateEntry {
    /// Whether a response token has already claimed this unit
    #[must_use]
    pub const fn is_used(&self) -> bool {
        self.used
    }
}

/// Window fill and usage counters for one base label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowStats {
    pub loaded: usize,
    pub total: usize,
    pub used: usize,
}

/// Lazily-grown subset of one base label's source units.
///
/// Entries are only ever appended, so a slot index identifies an entry for the
/// lifetime of the window. `used` flips exactly once per entry.
#[derive(Debug)]
pub struct CandidateWindow {
    label: BaseLabel,
    positions: Vec<usize>,
    entries: Vec<CandidateEntry>,
    full_loads: usize,
    lookup: Option<SignatureLookup>,
}

impl CandidateWindow {
    /// Create the window for `label` and load its first `window_size` units.
    ///
    /// Returns `None` when the label does not occur in the source.
    pub fn new(label: &BaseLabel, index: &SourceIndex, window_size: usize) -> Option<Self> {
        let positions = index.positions_for(label)?.to_vec();
        let mut window = Self {
            label: label.clone(),
            positions,
            entries: Vec::new(),
            full_loads: 0,
            lookup: None,
        };
        window.load_next(index, window_size);
        Some(window)
    }

    #[must_use]
    pub const fn label(&self) -> &BaseLabel {
        &self.label
    }

    #[must_use]
    pub fn entries(&self) -> &[CandidateEntry] {
        &self.entries
    }

    #[must_use]
    pub fn entry(&self, slot: usize) -> Option<&CandidateEntry> {
        self.entries.get(slot)
    }

    /// Unused entries with their slot, in load order
    pub fn unused(&self) -> impl Iterator<Item = (usize, &CandidateEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.used)
    }

    #[must_use]
    pub fn is_fully_loaded(&self) -> bool {
        self.entries.len() == self.positions.len()
    }

    /// How many times the on-demand full load actually added entries
    #[must_use]
    pub const fn full_loads(&self) -> usize {
        self.full_loads
    }

    /// Load up to `count` not-yet-loaded units, in marker index order
    pub fn load_next(&mut self, index: &SourceIndex, count: usize) -> usize {
        let start = self.entries.len();
        let end = (start + count).min(self.positions.len());
        for &position in &self.positions[start..end] {
            let Some(unit) = index.unit(position) else {
                log::error!("Window ({}) refers to missing position {position}", self.label);
                continue;
            };
            self.entries.push(CandidateEntry {
                marker: unit.marker.clone(),
                position,
                signature: index.signature(position).cloned().unwrap_or_default(),
                edge: index.is_edge(position),
                used: false,
            });
        }

        let loaded = self.entries.len() - start;
        if loaded > 0 {
            self.lookup = None;
        }
        loaded
    }

    /// Eagerly load the next units after a successful match
    pub fn slide(&mut self, index: &SourceIndex, step: usize) -> usize {
        self.load_next(index, step)
    }

    /// Load every remaining unit. Returns how many were added.
    pub fn load_all(&mut self, index: &SourceIndex) -> usize {
        let remaining = self.positions.len() - self.entries.len();
        let loaded = self.load_next(index, remaining);
        if loaded > 0 {
            self.full_loads += 1;
            log::debug!(
                "Window ({}) fully loaded on demand: +{loaded} -> {}/{}",
                self.label,
                self.entries.len(),
                self.positions.len()
            );
        }
        loaded
    }

    /// Claim an entry for a response token.
    ///
    /// Returns `false` (and changes nothing) if the entry is missing or already used.
    pub fn mark_used(&mut self, slot: usize) -> bool {
        let Some(entry) = self.entries.get_mut(slot) else {
            return false;
        };
        if entry.used {
            log::error!("Refusing to reuse {} (already matched)", entry.marker);
            return false;
        }
        entry.used = true;
        self.lookup = None;
        true
    }

    /// Direct-lookup index over unused entries, rebuilt after any mutation
    pub(crate) fn lookup(&mut self, config: &AlignerConfig) -> &SignatureLookup {
        let entries = &self.entries;
        self.lookup
            .get_or_insert_with(|| SignatureLookup::build(entries, config))
    }

    #[must_use]
    pub fn stats(&self) -> WindowStats {
        WindowStats {
            loaded: self.entries.len(),
            total: self.positions.len(),
            used: self.entries.iter().filter(|entry| entry.used).count(),
        }
    }
}
