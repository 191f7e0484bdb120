//! Race-safe application of alignment results.
//!
//! Every proposal carries the [`Sequence`] it was issued with. The state
//! machine applies a proposal only if its record is not terminal and the
//! proposal is not older than the last one applied to that record, so
//! deferred or reordered delivery can never clobber newer state.

use crate::error::Rejection;
use crate::types::{AlignmentState, Marker, RecordKey, Sequence};
use serde::Serialize;
use std::collections::BTreeMap;

/// Single monotonically increasing counter shared by all records
#[derive(Debug, Default)]
pub struct GlobalSequence {
    current: u64,
}

impl GlobalSequence {
    /// Stamp a new proposal or batch
    pub fn issue(&mut self) -> Sequence {
        self.current += 1;
        Sequence(self.current)
    }

    #[must_use]
    pub const fn current(&self) -> Sequence {
        Sequence(self.current)
    }

    fn reset(&mut self) {
        self.current = 0;
    }
}

/// Per-record state, owned by [`AlignmentStateMachine`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlignmentRecord {
    pub state: AlignmentState,
    pub last_applied: Sequence,

    /// Text carried by the last applied transition
    pub payload: Option<String>,
}

impl AlignmentRecord {
    const fn gap() -> Self {
        Self {
            state: AlignmentState::Gap,
            last_applied: Sequence::ZERO,
            payload: None,
        }
    }
}

/// A requested transition for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proposal {
    pub key: RecordKey,
    pub target: AlignmentState,
    pub payload: Option<String>,
}

impl Proposal {
    pub fn new(key: impl Into<RecordKey>, target: AlignmentState, payload: Option<String>) -> Self {
        Self {
            key: key.into(),
            target,
            payload,
        }
    }
}

/// Proposals issued together, sharing one sequence value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalBatch {
    pub sequence: Sequence,
    pub proposals: Vec<Proposal>,
}

impl ProposalBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalOutcome {
    Applied,
    Rejected(Rejection),
}

impl ProposalOutcome {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// An applied transition, as seen by presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub key: RecordKey,
    pub state: AlignmentState,
    pub payload: Option<String>,
    pub sequence: Sequence,
}

/// Receives every applied transition exactly once.
///
/// Sinks own batching and throttling; they must not call back into the engine.
pub trait PresentationSink {
    fn notify(&mut self, notification: &Notification);
}

/// Discards notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn notify(&mut self, _notification: &Notification) {}
}

/// Logs each applied transition at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl PresentationSink for LogSink {
    fn notify(&mut self, n: &Notification) {
        log::debug!("[seq {}] {} -> {}", n.sequence, n.key, n.state);
    }
}

/// Collects notifications in delivery order
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    notifications: Vec<Notification>,
}

impl RecordingSink {
    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Drain everything recorded so far
    pub fn take(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Latest notified state per record
    #[must_use]
    pub fn latest(&self) -> BTreeMap<&RecordKey, AlignmentState> {
        self.notifications
            .iter()
            .map(|n| (&n.key, n.state))
            .collect()
    }
}

impl PresentationSink for RecordingSink {
    fn notify(&mut self, notification: &Notification) {
        self.notifications.push(notification.clone());
    }
}

impl<S: PresentationSink + ?Sized> PresentationSink for &mut S {
    fn notify(&mut self, notification: &Notification) {
        (**self).notify(notification);
    }
}

/// Rejected proposals by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RejectionCounts {
    pub stale: usize,
    pub terminal_regression: usize,
    pub unknown_record: usize,
}

impl RejectionCounts {
    fn record(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::StaleProposal { .. } => self.stale += 1,
            Rejection::TerminalRegression { .. } => self.terminal_regression += 1,
            Rejection::UnknownRecord { .. } => self.unknown_record += 1,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.stale + self.terminal_regression + self.unknown_record
    }
}

/// Sole owner of alignment records and the global sequence counter.
///
/// `propose` is the only way to mutate a record.
#[derive(Debug)]
pub struct AlignmentStateMachine<S = NullSink> {
    records: BTreeMap<RecordKey, AlignmentRecord>,
    sequence: GlobalSequence,
    rejections: RejectionCounts,
    sink: S,
}

impl AlignmentStateMachine<NullSink> {
    /// State machine for `markers` that notifies nobody
    pub fn for_source<I>(markers: I) -> Self
    where
        I: IntoIterator<Item = Marker>,
    {
        Self::new(markers, NullSink)
    }
}

impl<S: PresentationSink> AlignmentStateMachine<S> {
    /// Create a `gap` record for every source marker
    pub fn new<I>(markers: I, sink: S) -> Self
    where
        I: IntoIterator<Item = Marker>,
    {
        let records = markers
            .into_iter()
            .map(|marker| (RecordKey::Source(marker), AlignmentRecord::gap()))
            .collect();

        Self {
            records,
            sequence: GlobalSequence::default(),
            rejections: RejectionCounts::default(),
            sink,
        }
    }

    /// Draw the next sequence value. Call at issue time, not when buffering.
    pub fn issue_sequence(&mut self) -> Sequence {
        self.sequence.issue()
    }

    #[must_use]
    pub const fn current_sequence(&self) -> Sequence {
        self.sequence.current()
    }

    /// Apply or reject one transition
    pub fn propose(&mut self, proposal: &Proposal, sequence: Sequence) -> ProposalOutcome {
        match self.check(proposal, sequence) {
            Ok(()) => {
                let record = self
                    .records
                    .entry(proposal.key.clone())
                    .or_insert_with(AlignmentRecord::gap);
                record.state = proposal.target;
                record.last_applied = sequence;
                record.payload.clone_from(&proposal.payload);

                log::debug!("[seq {sequence}] applied {} -> {}", proposal.key, proposal.target);
                self.sink.notify(&Notification {
                    key: proposal.key.clone(),
                    state: proposal.target,
                    payload: proposal.payload.clone(),
                    sequence,
                });
                ProposalOutcome::Applied
            }
            Err(rejection) => {
                log::debug!("[seq {sequence}] rejected: {rejection}");
                self.rejections.record(&rejection);
                ProposalOutcome::Rejected(rejection)
            }
        }
    }

    /// Apply every proposal of a batch with the batch's shared sequence
    pub fn apply_batch(&mut self, batch: &ProposalBatch) -> Vec<ProposalOutcome> {
        batch
            .proposals
            .iter()
            .map(|proposal| self.propose(proposal, batch.sequence))
            .collect()
    }

    fn check(&self, proposal: &Proposal, sequence: Sequence) -> Result<(), Rejection> {
        let Some(record) = self.records.get(&proposal.key) else {
            // Orphan records are created fresh; source records must already exist
            if proposal.key.is_orphan() && proposal.target == AlignmentState::Orphan {
                return Ok(());
            }
            return Err(Rejection::UnknownRecord {
                key: proposal.key.clone(),
                attempted: proposal.target,
            });
        };

        if record.state.is_terminal() {
            return Err(Rejection::TerminalRegression {
                key: proposal.key.clone(),
                current: record.state,
                attempted: proposal.target,
            });
        }

        if sequence < record.last_applied {
            return Err(Rejection::StaleProposal {
                key: proposal.key.clone(),
                sequence,
                last_applied: record.last_applied,
            });
        }

        Ok(())
    }

    #[must_use]
    pub fn state_of(&self, key: &RecordKey) -> Option<AlignmentState> {
        self.records.get(key).map(|record| record.state)
    }

    #[must_use]
    pub fn record(&self, key: &RecordKey) -> Option<&AlignmentRecord> {
        self.records.get(key)
    }

    /// All records, source markers first (ordered by marker) then orphans
    pub fn records(&self) -> impl Iterator<Item = (&RecordKey, &AlignmentRecord)> {
        self.records.iter()
    }

    #[must_use]
    pub const fn rejections(&self) -> RejectionCounts {
        self.rejections
    }

    /// Every source record back to `gap`, orphans dropped, counter zeroed
    pub fn reset(&mut self) {
        self.records.retain(|key, _| !key.is_orphan());
        for record in self.records.values_mut() {
            *record = AlignmentRecord::gap();
        }
        self.sequence.reset();
        self.rejections = RejectionCounts::default();
        log::debug!("Alignment state reset ({} source records)", self.records.len());
    }

    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
