//! Line index over a decoded text buffer.
//!
//! Lines are kept as byte spans into one shared buffer so that partitioning
//! by schema moves indices, never strings.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRef {
    /// 1-based physical line number.
    pub number: usize,
    pub span: Range<usize>,
}

#[derive(Debug)]
pub struct LineArena<'a> {
    text: &'a str,
    lines: Vec<LineRef>,
}

impl<'a> LineArena<'a> {
    /// Split on `\n`, drop one trailing `\r` per line, skip zero-length lines.
    pub fn new(text: &'a str) -> Self {
        let mut lines = Vec::new();
        let mut start = 0;
        for (idx, segment) in text.split('\n').enumerate() {
            let end = start + segment.len();
            let trimmed_end = if segment.ends_with('\r') { end - 1 } else { end };
            if trimmed_end > start {
                lines.push(LineRef {
                    number: idx + 1,
                    span: start..trimmed_end,
                });
            }
            start = end + 1;
        }
        Self { text, lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[LineRef] {
        &self.lines
    }

    pub fn get(&self, idx: usize) -> &LineRef {
        &self.lines[idx]
    }

    pub fn text(&self, line: &LineRef) -> &'a str {
        &self.text[line.span.clone()]
    }
}

/// A line addressable by character position.
///
/// ASCII lines slice by byte; others carry a table of char boundaries.
pub struct CharLine<'a> {
    text: &'a str,
    bounds: Option<Vec<usize>>,
}

impl<'a> CharLine<'a> {
    pub fn new(text: &'a str) -> Self {
        let bounds = if text.is_ascii() {
            None
        } else {
            let mut b: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
            b.push(text.len());
            Some(b)
        };
        Self { text, bounds }
    }

    pub fn char_len(&self) -> usize {
        match &self.bounds {
            None => self.text.len(),
            Some(b) => b.len() - 1,
        }
    }

    /// Characters `[offset, offset + width)`, clamped to the line.
    pub fn slice(&self, offset: usize, width: usize) -> &'a str {
        let len = self.char_len();
        let start = offset.min(len);
        let end = offset.saturating_add(width).min(len);
        match &self.bounds {
            None => &self.text[start..end],
            Some(b) => &self.text[b[start]..b[end]],
        }
    }
}
