use proptest::prelude::*;
use segment_aligner::{
    AlignerConfig, AlignmentState, AlignmentStateMachine, MatchStrategy, Marker, Proposal,
    RecordKey, RecordingSink, ResponseToken, Sequence, SourceIndex, StreamAligner,
};
use std::collections::HashSet;

const LABELS: [&str; 4] = ["a", "b", "c", "d"];
const STATES: [AlignmentState; 4] = [
    AlignmentState::Gap,
    AlignmentState::Partial,
    AlignmentState::Matched,
    AlignmentState::Orphan,
];

fn source_labels() -> impl Strategy<Value = Vec<&'static str>> {
    prop::collection::vec(prop::sample::select(LABELS.to_vec()), 1..40)
}

/// Per-unit edit applied when deriving a response from the source
fn edits() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..10, 1..16)
}

/// A response that mostly follows the source, with skips, repeats and an unknown label
fn response_text(source: &[&str], edits: &[u8]) -> String {
    let mut labels = Vec::new();
    for (i, label) in source.iter().enumerate() {
        match edits[i % edits.len()] {
            0 => {}
            1 => labels.extend([*label, *label]),
            2 => labels.extend(["z", *label]),
            _ => labels.push(*label),
        }
    }
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| format!("({label}) w{i} "))
        .collect()
}

fn stream(source: &[&str], text: &str, chunk_size: usize, config: AlignerConfig) -> Vec<ResponseToken> {
    let index = SourceIndex::from_labels(source.iter().map(|l| (*l, "")), &config).unwrap();
    let mut aligner = StreamAligner::new(index, config).unwrap();

    let mut tokens = Vec::new();
    for chunk in text.as_bytes().chunks(chunk_size) {
        tokens.extend(aligner.feed(std::str::from_utf8(chunk).unwrap()));
    }
    tokens.extend(aligner.finalize());
    assert!(aligner.finalize().is_empty());
    tokens
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn no_source_unit_matched_twice(
        source in source_labels(),
        edits in edits(),
        chunk_size in 1usize..16,
    ) {
        let text = response_text(&source, &edits);
        let tokens = stream(&source, &text, chunk_size, AlignerConfig::default());

        let mut seen = HashSet::new();
        for marker in tokens.iter().filter_map(ResponseToken::marker) {
            prop_assert!(seen.insert(marker.clone()), "{} matched twice", marker);
        }
    }

    #[test]
    fn chunking_does_not_change_tokens(
        source in source_labels(),
        edits in edits(),
        chunk_size in 1usize..16,
    ) {
        let text = response_text(&source, &edits);
        let whole = stream(&source, &text, text.len().max(1), AlignerConfig::default());
        let chunked = stream(&source, &text, chunk_size, AlignerConfig::default());

        prop_assert_eq!(whole.len(), text.matches('(').count());
        prop_assert_eq!(whole, chunked);
    }

    #[test]
    fn lookup_agrees_with_scan(
        source in source_labels(),
        edits in edits(),
    ) {
        let text = response_text(&source, &edits);
        let lookup = AlignerConfig {
            strategy: MatchStrategy::Lookup,
            ..Default::default()
        };

        let scanned = stream(&source, &text, 7, AlignerConfig::default());
        let looked_up = stream(&source, &text, 7, lookup);
        prop_assert_eq!(scanned, looked_up);
    }

    #[test]
    fn terminal_states_and_sequences_never_regress(
        ops in prop::collection::vec((0usize..3, 0usize..4, 0u64..30), 1..60),
    ) {
        let markers: Vec<Marker> = (0..3).map(|i| Marker::new("x".into(), i)).collect();
        let mut machine = AlignmentStateMachine::new(markers.clone(), RecordingSink::default());

        for (m, t, seq) in ops {
            let key = RecordKey::Source(markers[m].clone());
            let before = machine.record(&key).cloned().unwrap();
            let notified = machine.sink().notifications().len();

            let outcome = machine.propose(&Proposal::new(key.clone(), STATES[t], None), Sequence(seq));
            let after = machine.record(&key).cloned().unwrap();

            if before.state.is_terminal() {
                prop_assert!(!outcome.is_applied());
                prop_assert_eq!(&after, &before);
            }
            prop_assert!(after.last_applied >= before.last_applied);
            prop_assert_eq!(
                machine.sink().notifications().len(),
                notified + usize::from(outcome.is_applied())
            );
        }
    }
}
