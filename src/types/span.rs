//! Byte ranges into a template source.

use std::cmp::{max, min};
use std::ops::{Index, Range};

/// A half open byte range `start..end` of a template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// Returns the smallest span covering both spans.
    pub fn combine(self, other: Self) -> Self {
        Self {
            start: min(self.start, other.start),
            end: max(self.end, other.end),
        }
    }

    /// Returns the 1-based line that the span starts on.
    pub fn line(&self, source: &str) -> usize {
        let upto = min(self.start, source.len());
        source.as_bytes()[..upto]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
            + 1
    }

    /// Returns the 0-based line and the byte column within that line that the
    /// span starts on.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let upto = min(self.start, source.len());
        match source[..upto].rfind('\n') {
            Some(i) => (self.line(source) - 1, upto - i - 1),
            None => (0, upto),
        }
    }
}

impl Index<Span> for str {
    type Output = str;

    fn index(&self, span: Span) -> &Self::Output {
        &self[span.start..span.end]
    }
}

impl From<Range<usize>> for Span {
    fn from(r: Range<usize>) -> Self {
        Self {
            start: r.start,
            end: r.end,
        }
    }
}
