//! # Segment Aligner
//!
//! Context-window alignment of a live model output stream against an ordered,
//! labeled source document.
//!
//! The model echoes only a short base label (`(a)`, `(b)`, ...) for each unit it
//! produces, and may skip, repeat, reorder or invent labels. Each label is
//! resolved to a unique source unit using the labels matched before it as
//! evidence; anything that does not line up becomes an orphan rather than a
//! guess.
//!
//! ## Architecture
//!
//! ```text
//! Source units
//!     │
//!     └──> SourceIndex (per-label positions, preceding-label signatures)
//!              │
//!              └──> CandidateWindow per label (lazy, slides on match)
//!
//! Stream chunks
//!     │
//!     ├──> LabelExtractor (buffers split labels)
//!     │
//!     ├──> Matcher
//!     │    ├─> Edge units: exact short-history comparison
//!     │    ├─> Others: in-order subsequence at depth max..=min
//!     │    └─> Tie-break, claim, slide (full-load fallback once)
//!     │
//!     └──> ProposalBatch (one sequence per batch)
//!              │
//!              └──> AlignmentStateMachine ──> PresentationSink
//!                   (rejects stale and terminal-regressing proposals)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use segment_aligner::{AlignerConfig, AlignmentState, RecordKey, SourceIndex, StreamAligner};
//!
//! let config = AlignerConfig::default();
//! let index = SourceIndex::from_labels(
//!     [("a", "Hello"), ("b", "world"), ("a", "again")],
//!     &config,
//! )
//! .unwrap();
//!
//! let mut aligner = StreamAligner::new(index, config).unwrap();
//! let mut tokens = aligner.feed("(b) Welt (a) wie");
//! tokens.extend(aligner.feed("der"));
//! tokens.extend(aligner.finalize());
//! aligner.flush();
//!
//! let markers: Vec<String> = tokens
//!     .iter()
//!     .filter_map(|t| t.marker().map(ToString::to_string))
//!     .collect();
//! assert_eq!(markers, vec!["b-0", "a-1"]);
//!
//! let key = RecordKey::Source("a-1".parse().unwrap());
//! assert_eq!(aligner.state_of(&key), Some(AlignmentState::Matched));
//! ```

mod config;
mod engine;
mod error;
mod extract;
mod lookup;
mod matcher;
mod report;
mod source;
mod state;
mod types;
mod window;

pub use config::{AlignerConfig, MatchStrategy, TieBreak, DEFAULT_LABEL_PATTERN};
pub use engine::StreamAligner;
pub use error::{AlignError, MatchFailure, Rejection, Result};
pub use extract::{LabelExtractor, RawSpan};
pub use lookup::SignatureLookup;
pub use matcher::Matcher;
pub use report::{find_gap_runs, Coverage, Diagnostics, GapKind, GapRun, SkipWarning};
pub use source::{
    extract_mapping_block, index_source, parse_source_text, ContextSignature, SourceIndex,
};
pub use state::{
    AlignmentRecord, AlignmentStateMachine, GlobalSequence, LogSink, Notification, NullSink,
    PresentationSink, Proposal, ProposalBatch, ProposalOutcome, RecordingSink, RejectionCounts,
};
pub use types::{
    AlignmentState, BaseLabel, MatchFound, MatchMethod, MatchResult, Marker, PartialToken,
    RecordKey, Resolution, ResponseToken, Sequence, SourceUnit,
};
pub use window::{CandidateEntry, CandidateWindow, WindowStats};
