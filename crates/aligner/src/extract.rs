use crate::config::AlignerConfig;
use crate::error::Result;
use crate::types::BaseLabel;
use regex::Regex;

/// A labeled span cut from the stream, not yet matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpan {
    pub base: BaseLabel,
    pub text: String,
}

/// Incremental label extractor.
///
/// A span runs from one label header to the next. The last span in the buffer
/// stays open until a following header arrives or the stream finishes, since
/// its body may continue in the next chunk.
#[derive(Debug)]
pub struct LabelExtractor {
    pattern: Regex,
    buffer: String,

    /// Unlabeled text retained between chunks, enough to complete a header
    /// split across a chunk boundary
    max_spill: usize,

    /// The buffer starts with a header whose body is still open
    open: bool,
    finished: bool,
}

impl LabelExtractor {
    pub fn new(config: &AlignerConfig) -> Result<Self> {
        Ok(Self {
            pattern: config.compile_label_pattern()?,
            buffer: String::new(),
            max_spill: config.max_header_len,
            open: false,
            finished: false,
        })
    }

    /// Append a chunk and return the spans it completed, in order
    pub fn push(&mut self, chunk: &str) -> Vec<RawSpan> {
        if self.finished {
            log::warn!("Ignoring {} bytes pushed after the stream finished", chunk.len());
            return Vec::new();
        }
        self.buffer.push_str(chunk);

        let headers = self.headers();
        let Some(&(last_start, _, _)) = headers.last() else {
            self.trim_unlabeled();
            return Vec::new();
        };

        if !self.open && !self.buffer[..headers[0].0].trim().is_empty() {
            log::debug!("Ignoring {} bytes before the first response label", headers[0].0);
        }

        let spans = headers
            .windows(2)
            .map(|pair| RawSpan {
                base: pair[0].2.clone(),
                text: self.buffer[pair[0].1..pair[1].0].trim().to_string(),
            })
            .collect();

        self.buffer.drain(..last_start);
        self.open = true;
        spans
    }

    /// The in-flight span, if a header has been seen
    #[must_use]
    pub fn pending(&self) -> Option<RawSpan> {
        if !self.open || self.finished {
            return None;
        }
        let caps = self.pattern.captures(&self.buffer)?;
        let header = caps.get(0)?;
        Some(RawSpan {
            base: BaseLabel::new(caps.get(1)?.as_str()),
            text: self.buffer[header.end()..].trim().to_string(),
        })
    }

    /// Close the stream, returning the trailing span once.
    ///
    /// Subsequent calls return `None`.
    pub fn finish(&mut self) -> Option<RawSpan> {
        if self.finished {
            return None;
        }
        let span = self.pending();
        self.finished = true;
        self.open = false;
        self.buffer.clear();
        span
    }

    /// Drop any buffered fragment without emitting it
    pub fn discard(&mut self) {
        if self.open {
            log::debug!("Discarding {} buffered bytes", self.buffer.len());
        }
        self.buffer.clear();
        self.open = false;
        self.finished = true;
    }

    /// Forget everything and accept a new stream
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.open = false;
        self.finished = false;
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Header (start, end, label) triples in buffer order
    fn headers(&self) -> Vec<(usize, usize, BaseLabel)> {
        self.pattern
            .captures_iter(&self.buffer)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let label = caps.get(1)?;
                Some((whole.start(), whole.end(), BaseLabel::new(label.as_str())))
            })
            .collect()
    }

    fn trim_unlabeled(&mut self) {
        if self.buffer.len() <= self.max_spill {
            return;
        }
        let mut cut = self.buffer.len() - self.max_spill;
        while !self.buffer.is_char_boundary(cut) {
            cut += 1;
        }
        self.buffer.drain(..cut);
    }
}
