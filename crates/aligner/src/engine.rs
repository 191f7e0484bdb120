use crate::config::AlignerConfig;
use crate::error::{AlignError, Result};
use crate::extract::{LabelExtractor, RawSpan};
use crate::matcher::Matcher;
use crate::report::{find_gap_runs, Diagnostics, SkipWarning};
use crate::source::SourceIndex;
use crate::state::{
    AlignmentRecord, AlignmentStateMachine, NullSink, PresentationSink, Proposal, ProposalBatch,
    ProposalOutcome,
};
use crate::types::{AlignmentState, BaseLabel, PartialToken, RecordKey, Resolution, ResponseToken};
use std::collections::VecDeque;
use std::sync::Arc;

/// Streaming alignment session over one indexed source.
///
/// Feed raw text as it arrives; completed labels are matched immediately and
/// their transitions queued as [`ProposalBatch`]es. Batches are applied to the
/// [`AlignmentStateMachine`] only when delivered, which may be deferred and
/// interleaved with previews.
pub struct StreamAligner<S = NullSink> {
    config: AlignerConfig,
    index: Arc<SourceIndex>,
    matcher: Matcher,
    extractor: LabelExtractor,
    state: AlignmentStateMachine<S>,

    /// Base labels of matched tokens, oldest first
    history: Vec<BaseLabel>,

    /// Next response position to assign
    tokens_seen: usize,

    outbox: VecDeque<ProposalBatch>,
    skipped: Vec<SkipWarning>,

    finalized: bool,
    cancelled: bool,
}

impl StreamAligner<NullSink> {
    /// Create a session whose applied transitions notify nobody
    pub fn new(index: SourceIndex, config: AlignerConfig) -> Result<Self> {
        Self::with_sink(index, config, NullSink)
    }
}

impl<S: PresentationSink> StreamAligner<S> {
    /// Create a session notifying `sink` of every applied transition
    pub fn with_sink(index: SourceIndex, config: AlignerConfig, sink: S) -> Result<Self> {
        config.validate()?;
        if index.min_depth() != config.min_depth || index.max_depth() < config.max_depth {
            return Err(AlignError::invalid_config(format!(
                "source was indexed for depths {}..={}, session wants {}..={}",
                index.min_depth(),
                index.max_depth(),
                config.min_depth,
                config.max_depth
            )));
        }

        let index = Arc::new(index);
        let extractor = LabelExtractor::new(&config)?;
        let matcher = Matcher::new(Arc::clone(&index), config.clone());
        let state = AlignmentStateMachine::new(
            index.units().iter().map(|unit| unit.marker.clone()),
            sink,
        );

        Ok(Self {
            config,
            index,
            matcher,
            extractor,
            state,
            history: Vec::new(),
            tokens_seen: 0,
            outbox: VecDeque::new(),
            skipped: Vec::new(),
            finalized: false,
            cancelled: false,
        })
    }

    /// Feed a raw chunk; returns tokens it completed.
    ///
    /// A trailing fragment is buffered until the next label header or
    /// [`finalize`](Self::finalize). Ignored once the stream has ended.
    pub fn feed(&mut self, chunk: &str) -> Vec<ResponseToken> {
        if self.is_finished() {
            log::warn!("Ignoring {} bytes fed after end of stream", chunk.len());
            return Vec::new();
        }
        let spans = self.extractor.push(chunk);
        self.resolve_spans(spans)
    }

    /// Close the stream, matching the trailing fragment if a label was open.
    ///
    /// Only the first call (before any cancel) can produce tokens.
    pub fn finalize(&mut self) -> Vec<ResponseToken> {
        if self.is_finished() {
            return Vec::new();
        }
        self.finalized = true;

        let spans = self.extractor.finish().into_iter().collect();
        let tokens = self.resolve_spans(spans);
        log::info!(
            "Stream finished: {} tokens, {} skipped",
            self.tokens_seen,
            self.skipped.len()
        );
        tokens
    }

    /// Abort the stream. The buffered fragment is discarded, nothing is
    /// queued, and already-applied state stays as it is.
    pub fn cancel(&mut self) {
        if self.is_finished() {
            return;
        }
        self.cancelled = true;
        self.extractor.discard();
        log::info!(
            "Stream cancelled after {} tokens ({} batches undelivered)",
            self.tokens_seen,
            self.outbox.len()
        );
    }

    /// Where the in-flight label would bind if it closed now.
    ///
    /// Never claims a source unit.
    #[must_use]
    pub fn get_pending(&self) -> Option<PartialToken> {
        if self.is_finished() {
            return None;
        }
        let RawSpan { base, text } = self.extractor.pending()?;
        let marker = self
            .matcher
            .peek(&base, &self.history, self.tokens_seen)
            .ok()
            .map(|found| found.marker);

        Some(PartialToken {
            base,
            marker,
            text,
            response_position: self.tokens_seen,
        })
    }

    /// A `partial` proposal for the in-flight label, stamped now.
    ///
    /// Returned to the caller rather than queued, so it can be delivered on
    /// its own schedule.
    pub fn preview(&mut self) -> Option<ProposalBatch> {
        let pending = self.get_pending()?;
        let marker = pending.marker?;

        Some(ProposalBatch {
            sequence: self.state.issue_sequence(),
            proposals: vec![Proposal::new(
                marker,
                AlignmentState::Partial,
                Some(pending.text),
            )],
        })
    }

    /// Drain queued batches without applying them
    pub fn take_proposals(&mut self) -> Vec<ProposalBatch> {
        self.outbox.drain(..).collect()
    }

    /// Apply one batch to the state machine
    pub fn deliver(&mut self, batch: &ProposalBatch) -> Vec<ProposalOutcome> {
        self.state.apply_batch(batch)
    }

    /// Apply every queued batch in order; returns how many proposals applied
    pub fn flush(&mut self) -> usize {
        let mut applied = 0;
        while let Some(batch) = self.outbox.pop_front() {
            applied += self
                .state
                .apply_batch(&batch)
                .iter()
                .filter(|outcome| outcome.is_applied())
                .count();
        }
        applied
    }

    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        let gap_runs = find_gap_runs(self.index.units(), |marker| {
            self.state.state_of(&RecordKey::Source(marker.clone())) == Some(AlignmentState::Matched)
        });

        Diagnostics::new(
            self.tokens_seen,
            self.skipped.clone(),
            self.matcher.window_stats(),
            self.state.rejections(),
            gap_runs,
        )
    }

    /// Start a new stream over the same source: every record back to `gap`,
    /// windows reinitialized, sequence counter zeroed
    pub fn reset(&mut self) {
        self.matcher = Matcher::new(Arc::clone(&self.index), self.config.clone());
        self.extractor.reset();
        self.state.reset();
        self.history.clear();
        self.tokens_seen = 0;
        self.outbox.clear();
        self.skipped.clear();
        self.finalized = false;
        self.cancelled = false;
    }

    #[must_use]
    pub fn state_of(&self, key: &RecordKey) -> Option<AlignmentState> {
        self.state.state_of(key)
    }

    pub fn records(&self) -> impl Iterator<Item = (&RecordKey, &AlignmentRecord)> {
        self.state.records()
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finalized || self.cancelled
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    #[must_use]
    pub fn index(&self) -> &SourceIndex {
        &self.index
    }

    #[must_use]
    pub const fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    #[must_use]
    pub const fn config(&self) -> &AlignerConfig {
        &self.config
    }

    #[must_use]
    pub const fn sink(&self) -> &S {
        self.state.sink()
    }

    pub fn sink_mut(&mut self) -> &mut S {
        self.state.sink_mut()
    }

    /// Match spans in order and queue one batch for all of them
    fn resolve_spans(&mut self, spans: Vec<RawSpan>) -> Vec<ResponseToken> {
        if spans.is_empty() {
            return Vec::new();
        }

        let tokens: Vec<ResponseToken> = spans
            .into_iter()
            .map(|span| self.resolve_span(span))
            .collect();
        let proposals = tokens
            .iter()
            .map(|token| {
                let target = if token.is_matched() {
                    AlignmentState::Matched
                } else {
                    AlignmentState::Orphan
                };
                Proposal::new(token.record_key(), target, Some(token.text.clone()))
            })
            .collect();

        let batch = ProposalBatch {
            sequence: self.state.issue_sequence(),
            proposals,
        };
        log::trace!("Queued batch {} with {} proposals", batch.sequence, batch.len());
        self.outbox.push_back(batch);
        tokens
    }

    fn resolve_span(&mut self, span: RawSpan) -> ResponseToken {
        let response_position = self.tokens_seen;
        self.tokens_seen += 1;

        let result = self
            .matcher
            .resolve(&span.base, &self.history, response_position);
        match &result {
            Ok(found) => {
                log::debug!(
                    "#{response_position} ({}) -> {} [depth {}, history {}, {:?}]",
                    span.base,
                    found.marker,
                    found.match_depth,
                    found.history_len,
                    found.method
                );
                self.push_history(span.base.clone());
            }
            Err(failure) => {
                log::warn!(
                    "#{response_position} ({}) skipped: {failure}",
                    span.base
                );
                self.skipped.push(SkipWarning {
                    response_position,
                    base: span.base.clone(),
                    failure: failure.clone(),
                });
            }
        }

        ResponseToken {
            base: span.base,
            text: span.text,
            response_position,
            resolution: Resolution::from(result),
        }
    }

    fn push_history(&mut self, label: BaseLabel) {
        self.history.push(label);
        let keep = self.config.max_depth;
        if self.history.len() > keep * 2 {
            self.history.drain(..self.history.len() - keep);
        }
    }
}

impl<S> std::fmt::Debug for StreamAligner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAligner")
            .field("units", &self.index.len())
            .field("tokens_seen", &self.tokens_seen)
            .field("skipped", &self.skipped.len())
            .field("queued_batches", &self.outbox.len())
            .field("finalized", &self.finalized)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}
