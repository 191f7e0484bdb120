use crate::config::AlignerConfig;
use crate::error::{AlignError, Result};
use crate::types::{BaseLabel, Marker, SourceUnit};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```([\s\S]*?)```").expect("fenced block pattern is valid")
});

/// Preceding base labels of a source unit, oldest first.
///
/// Holds up to `max_depth` labels; shorter depths are suffixes of it.
/// Computed once from the source and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSignature {
    labels: Vec<BaseLabel>,
}

impl ContextSignature {
    pub(crate) fn new(labels: Vec<BaseLabel>) -> Self {
        Self { labels }
    }

    /// The last `depth` labels (fewer near the document start)
    #[must_use]
    pub fn at_depth(&self, depth: usize) -> &[BaseLabel] {
        let take = depth.min(self.labels.len());
        &self.labels[self.labels.len() - take..]
    }

    #[must_use]
    pub fn labels(&self) -> &[BaseLabel] {
        &self.labels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Ordered source units grouped per base label, with a context signature per unit.
///
/// Built once per source document; read-only for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct SourceIndex {
    units: Vec<SourceUnit>,
    by_label: BTreeMap<BaseLabel, Vec<usize>>,
    signatures: Vec<ContextSignature>,
    min_depth: usize,
    max_depth: usize,
}

impl SourceIndex {
    /// Index source units, validating marker uniqueness and ordering
    pub fn build(mut units: Vec<SourceUnit>, config: &AlignerConfig) -> Result<Self> {
        config.validate()?;
        units.sort_by_key(|unit| unit.position);

        let mut seen = HashSet::with_capacity(units.len());
        for unit in &units {
            if !seen.insert(&unit.marker) {
                return Err(AlignError::DuplicateMarker(unit.marker.to_string()));
            }
        }

        let mut by_label: BTreeMap<BaseLabel, Vec<usize>> = BTreeMap::new();
        for (expected, unit) in units.iter().enumerate() {
            if unit.position != expected {
                return Err(AlignError::invalid_source(format!(
                    "positions must run 0..{} without gaps, found {} at rank {expected}",
                    units.len(),
                    unit.position
                )));
            }

            let positions = by_label.entry(unit.base().clone()).or_default();
            if unit.marker.index != positions.len() {
                return Err(AlignError::invalid_source(format!(
                    "{} should have index {} (rank among ({}) units)",
                    unit.marker,
                    positions.len(),
                    unit.base()
                )));
            }
            positions.push(unit.position);
        }

        let signatures = (0..units.len())
            .map(|position| preceding_labels(&units, position, config.max_depth))
            .collect();

        if units.is_empty() {
            log::warn!("Indexed an empty source; every response label will be unknown");
        } else {
            log::info!(
                "Indexed {} source units: {}",
                units.len(),
                by_label
                    .iter()
                    .map(|(label, positions)| format!("({label}):{}", positions.len()))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Ok(Self {
            units,
            by_label,
            signatures,
            min_depth: config.min_depth,
            max_depth: config.max_depth,
        })
    }

    /// Index `(label, text)` pairs in document order, assigning markers and positions
    pub fn from_labels<I, L, T>(items: I, config: &AlignerConfig) -> Result<Self>
    where
        I: IntoIterator<Item = (L, T)>,
        L: AsRef<str>,
        T: Into<String>,
    {
        Self::build(assign_markers(items), config)
    }

    #[must_use]
    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    #[must_use]
    pub fn unit(&self, position: usize) -> Option<&SourceUnit> {
        self.units.get(position)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Base labels present in the source, in sorted order
    pub fn labels(&self) -> impl Iterator<Item = &BaseLabel> {
        self.by_label.keys()
    }

    #[must_use]
    pub fn contains_label(&self, label: &BaseLabel) -> bool {
        self.by_label.contains_key(label)
    }

    /// Source positions of a label's units, ordered by marker index
    #[must_use]
    pub fn positions_for(&self, label: &BaseLabel) -> Option<&[usize]> {
        self.by_label.get(label).map(Vec::as_slice)
    }

    #[must_use]
    pub fn signature(&self, position: usize) -> Option<&ContextSignature> {
        self.signatures.get(position)
    }

    /// Whether a unit sits too close to the start for approximate matching
    #[must_use]
    pub const fn is_edge(&self, position: usize) -> bool {
        position < self.min_depth
    }

    #[must_use]
    pub fn find(&self, marker: &Marker) -> Option<&SourceUnit> {
        let position = *self.by_label.get(&marker.base)?.get(marker.index)?;
        self.units.get(position)
    }

    #[must_use]
    pub const fn min_depth(&self) -> usize {
        self.min_depth
    }

    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Index source units
pub fn index_source(units: Vec<SourceUnit>, config: &AlignerConfig) -> Result<SourceIndex> {
    SourceIndex::build(units, config)
}

/// Parse labeled source text (`(a) first (b) second (a) third`) into units.
///
/// Text before the first label is ignored. Each label's per-base index is its
/// rank among earlier occurrences of the same label.
pub fn parse_source_text(text: &str, config: &AlignerConfig) -> Result<Vec<SourceUnit>> {
    let pattern = config.compile_label_pattern()?;
    let headers: Vec<(usize, usize, String)> = pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let label = caps.get(1)?;
            Some((whole.start(), whole.end(), label.as_str().to_string()))
        })
        .collect();

    if let Some((first, _, _)) = headers.first() {
        if !text[..*first].trim().is_empty() {
            log::debug!("Ignoring {} bytes before the first source label", first);
        }
    }

    let spans = headers.iter().enumerate().map(|(i, (_, end, label))| {
        let stop = headers.get(i + 1).map_or(text.len(), |next| next.0);
        (label.as_str(), text[*end..stop].trim().to_string())
    });

    let units = assign_markers(spans);
    log::debug!("Parsed {} source units", units.len());
    Ok(units)
}

/// Extract the mapping content from a full prompt: the third `---` section of
/// the first fenced code block.
#[must_use]
pub fn extract_mapping_block(prompt: &str) -> Option<&str> {
    let block = FENCED_BLOCK.captures(prompt)?.get(1)?.as_str();
    let section = block.split("---").nth(2)?;
    Some(section.trim())
}

fn assign_markers<I, L, T>(items: I) -> Vec<SourceUnit>
where
    I: IntoIterator<Item = (L, T)>,
    L: AsRef<str>,
    T: Into<String>,
{
    let mut counts: HashMap<BaseLabel, usize> = HashMap::new();
    items
        .into_iter()
        .enumerate()
        .map(|(position, (label, text))| {
            let base = BaseLabel::new(label);
            let count = counts.entry(base.clone()).or_insert(0);
            let marker = Marker::new(base, *count);
            *count += 1;
            SourceUnit::new(marker, text, position)
        })
        .collect()
}

fn preceding_labels(units: &[SourceUnit], position: usize, depth: usize) -> ContextSignature {
    let start = position.saturating_sub(depth);
    ContextSignature::new(
        units[start..position]
            .iter()
            .map(|unit| unit.base().clone())
            .collect(),
    )
}
