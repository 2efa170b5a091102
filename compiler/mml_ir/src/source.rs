//! Source buffer with a derived line index.
//!
//! The compiler core never touches the filesystem; callers hand in the full
//! UTF-8 text and [`SourceInfo`] provides byte-offset to line/column mapping
//! for span construction and diagnostic rendering.

use crate::span::{SrcPoint, SrcSpan};

/// An owned source buffer plus a precomputed table of line start offsets.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    text: String,
    /// Byte offset of the first character of each line. `line_starts[0] == 0`.
    line_starts: Vec<u32>,
}

impl SourceInfo {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0u32];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        SourceInfo { text, line_starts }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of lines (a trailing newline opens a final empty line).
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Resolve a byte offset into a [`SrcPoint`] with 1-based line/column.
    pub fn point_at(&self, offset: u32) -> SrcPoint {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        SrcPoint {
            offset,
            line: line_idx as u32 + 1,
            col: offset - self.line_starts[line_idx] + 1,
        }
    }

    /// Build a [`SrcSpan`] from a byte range.
    pub fn span(&self, range: std::ops::Range<usize>) -> SrcSpan {
        SrcSpan {
            start: self.point_at(range.start as u32),
            end: self.point_at(range.end as u32),
        }
    }

    /// The source text under a span.
    pub fn slice(&self, span: SrcSpan) -> &str {
        let range = span.to_range();
        let end = range.end.min(self.text.len());
        let start = range.start.min(end);
        &self.text[start..end]
    }
}
