//! Stream ingest: turns response files into the chunk sequence a live model
//! stream would have delivered.

use serde_json::Value;
use tokio::sync::mpsc;

/// JSON pointer to the text delta in a streamed generation event
const SSE_TEXT_POINTER: &str = "/candidates/0/content/parts/0/text";

/// Split text into chunks of at most `chunk_chars` characters
pub fn split_chunks(text: &str, chunk_chars: usize) -> Vec<String> {
    let size = chunk_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|chunk| chunk.iter().collect()).collect()
}

/// Text deltas of a server-sent-events body, one per `data:` event.
///
/// Events that are not JSON or carry no text are skipped.
pub fn decode_sse(body: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    for (line_no, line) in body.lines().enumerate() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }

        match serde_json::from_str::<Value>(data) {
            Ok(event) => {
                if let Some(text) = event.pointer(SSE_TEXT_POINTER).and_then(Value::as_str) {
                    chunks.push(text.to_string());
                }
            }
            Err(err) => log::debug!("Skipping malformed SSE event on line {}: {err}", line_no + 1),
        }
    }
    chunks
}

/// Send chunks one at a time, yielding between them like a network stream.
///
/// Stops early when the receiver goes away. Returns how many were sent.
pub async fn replay(chunks: Vec<String>, tx: mpsc::Sender<String>) -> usize {
    let mut sent = 0;
    for chunk in chunks {
        if tx.send(chunk).await.is_err() {
            break;
        }
        sent += 1;
        tokio::task::yield_now().await;
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_chunks_respects_char_boundaries() {
        assert_eq!(split_chunks("(a) été", 3), vec!["(a)", " ét", "é"]);
        assert_eq!(split_chunks("abc", 0), vec!["a", "b", "c"]);
        assert!(split_chunks("", 4).is_empty());
    }

    #[test]
    fn test_decode_sse_events() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"(a) Hal\"}]}}]}\n",
            "\n",
            "event: ping\n",
            "data: not json\n",
            "data: {\"candidates\":[]}\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo (b)\"}]}}]}\n",
            "data: [DONE]\n",
        );
        assert_eq!(decode_sse(body), vec!["(a) Hal", "lo (b)"]);
    }

    #[tokio::test]
    async fn test_replay_delivers_in_order() {
        let (tx, mut rx) = mpsc::channel(1);
        let producer = tokio::spawn(replay(vec!["a".into(), "b".into()], tx));

        let mut received = Vec::new();
        while let Some(chunk) = rx.recv().await {
            received.push(chunk);
        }
        assert_eq!(received, vec!["a", "b"]);
        assert_eq!(producer.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_replay_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert_eq!(replay(vec!["a".into()], tx).await, 0);
    }
}
