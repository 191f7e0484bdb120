use segment_aligner::{
    AlignmentRecord, AlignmentState, Diagnostics, RecordKey, SourceIndex, SourceUnit,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Serialize)]
pub struct IndexReport {
    pub units: usize,
    pub labels: BTreeMap<String, usize>,

    /// Units matched only by exact short history
    pub edge_units: Vec<String>,
}

impl IndexReport {
    pub fn new(index: &SourceIndex) -> Self {
        let labels = index
            .labels()
            .map(|label| {
                let count = index.positions_for(label).map_or(0, <[usize]>::len);
                (label.to_string(), count)
            })
            .collect();
        let edge_units = index
            .units()
            .iter()
            .filter(|unit| index.is_edge(unit.position))
            .map(|unit| unit.marker.to_string())
            .collect();

        Self {
            units: index.len(),
            labels,
            edge_units,
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("{} source units\n", self.units);
        for (label, count) in &self.labels {
            let _ = writeln!(out, "  ({label}) x{count}");
        }
        let _ = writeln!(out, "edge units: {}", self.edge_units.join(", "));
        out
    }
}

#[derive(Debug, Serialize)]
pub struct UnitRow {
    pub marker: String,
    pub state: AlignmentState,
    pub source: String,
    pub response: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrphanRow {
    pub key: String,
    pub response: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AlignReport {
    pub cancelled: bool,
    pub chunks: usize,
    pub notifications: usize,
    pub units: Vec<UnitRow>,
    pub orphans: Vec<OrphanRow>,
    pub diagnostics: Diagnostics,
}

impl AlignReport {
    pub fn new<'a>(
        units: &[SourceUnit],
        records: impl Iterator<Item = (&'a RecordKey, &'a AlignmentRecord)>,
        diagnostics: Diagnostics,
    ) -> Self {
        let mut by_marker = BTreeMap::new();
        let mut orphans = Vec::new();
        for (key, record) in records {
            match key {
                RecordKey::Source(marker) => {
                    by_marker.insert(marker.clone(), record);
                }
                RecordKey::Orphan { .. } => orphans.push(OrphanRow {
                    key: key.to_string(),
                    response: record.payload.clone(),
                }),
            }
        }

        let units = units
            .iter()
            .map(|unit| {
                let record = by_marker.get(&unit.marker);
                UnitRow {
                    marker: unit.marker.to_string(),
                    state: record.map_or(AlignmentState::Gap, |r| r.state),
                    source: unit.text.clone(),
                    response: record.and_then(|r| r.payload.clone()),
                }
            })
            .collect();

        Self {
            cancelled: false,
            chunks: 0,
            notifications: 0,
            units,
            orphans,
            diagnostics,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for row in &self.units {
            let _ = writeln!(
                out,
                "{:<8} {:<8} {}",
                row.marker,
                row.state.as_str(),
                row.response.as_deref().unwrap_or("")
            );
        }
        for orphan in &self.orphans {
            let _ = writeln!(
                out,
                "{:<8} {:<8} {}",
                orphan.key,
                AlignmentState::Orphan.as_str(),
                orphan.response.as_deref().unwrap_or("")
            );
        }

        out.push('\n');
        if self.cancelled {
            out.push_str("stream cancelled\n");
        }
        let _ = writeln!(out, "{}", self.diagnostics.summary());
        for reason in &self.diagnostics.reasons {
            let _ = writeln!(out, "  skipped {reason}");
        }
        for run in &self.diagnostics.gap_runs {
            let _ = writeln!(
                out,
                "  {:?} gap {}..{} ({} units)",
                run.kind, run.first, run.last, run.len
            );
        }
        out
    }
}
