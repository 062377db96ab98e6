//! Document text snapshots and the UTF-16 line index.
//!
//! The analysis engine addresses text by offset, counted in UTF-16 code
//! units from the start of the document. The protocol addresses text by
//! zero-based `(line, character)` pairs in the same unit. [`ScriptSnapshot`]
//! keeps a line-start index so both directions are a binary search away.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A contiguous region of a document: offset plus length, in UTF-16 units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TextSpan {
    /// Offset of the first code unit.
    pub start: usize,
    /// Number of code units covered.
    pub length: usize,
}

impl TextSpan {
    /// Create a span from an offset and a length.
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    /// Create a span covering `start..end`.
    ///
    /// An `end` before `start` yields an empty span at `start`.
    pub fn from_bounds(start: usize, end: usize) -> Self {
        Self {
            start,
            length: end.saturating_sub(start),
        }
    }

    /// Offset one past the last covered code unit.
    ///
    /// Saturates at `usize::MAX`.
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.length)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// A replacement of `span` with `new_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChange {
    pub span: TextSpan,
    pub new_text: String,
}

impl TextChange {
    pub fn new(span: TextSpan, new_text: impl Into<String>) -> Self {
        Self {
            span,
            new_text: new_text.into(),
        }
    }
}

/// Zero-based line and character, the protocol's notion of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LineAndCharacter {
    pub line: usize,
    pub character: usize,
}

/// Errors raised while editing a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextError {
    #[error("span {start}..{end} is outside of the document (length {length})")]
    OutOfBounds {
        start: usize,
        end: usize,
        length: usize,
    },

    #[error("offset {0} falls inside a surrogate pair")]
    SplitCodePoint(usize),
}

/// Immutable text of a document together with its line index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSnapshot {
    text: String,
    /// UTF-16 offset of the first code unit of every line. Always starts with 0.
    line_starts: Vec<usize>,
    /// Offset where each line's content ends, before its terminator.
    line_ends: Vec<usize>,
    /// Total length in UTF-16 code units.
    length: usize,
}

impl ScriptSnapshot {
    /// Build a snapshot, scanning the text once for line breaks.
    ///
    /// `\n`, `\r\n` and a lone `\r` all terminate a line.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        let mut line_ends = Vec::new();
        let mut offset = 0;
        let mut chars = text.chars().peekable();

        while let Some(ch) = chars.next() {
            offset += ch.len_utf16();
            match ch {
                '\n' => {
                    line_ends.push(offset - 1);
                    line_starts.push(offset);
                }
                '\r' if chars.peek() == Some(&'\n') => {
                    chars.next();
                    line_ends.push(offset - 1);
                    offset += 1;
                    line_starts.push(offset);
                }
                '\r' => {
                    line_ends.push(offset - 1);
                    line_starts.push(offset);
                }
                _ => {}
            }
        }
        line_ends.push(offset);

        Self {
            text,
            line_starts,
            line_ends,
            length: offset,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in UTF-16 code units.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Zero-based line and character of `offset`.
    ///
    /// Offsets past the end of the document clamp to the end.
    pub fn line_and_character_of(&self, offset: usize) -> LineAndCharacter {
        let offset = offset.min(self.length);
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        LineAndCharacter {
            line,
            character: offset - self.line_starts[line],
        }
    }

    /// Offset of a one-based `(line, offset)` pair.
    ///
    /// Lines past the end clamp to the last line and characters past the end
    /// of a line clamp to the end of its content, before the terminator, so
    /// the result always lies within `0..=len()` and never splits a `\r\n`.
    pub fn line_offset_to_position(&self, line: usize, offset: usize) -> usize {
        let line = line.saturating_sub(1).min(self.line_starts.len() - 1);
        let start = self.line_starts[line];
        start.saturating_add(offset.saturating_sub(1)).min(self.line_ends[line])
    }

    /// Text covered by `span`, if the span lies within the document.
    pub fn slice(&self, span: TextSpan) -> Result<&str, TextError> {
        let (start, end) = self.byte_range(span)?;
        Ok(&self.text[start..end])
    }

    /// Apply `changes` in order, each against the text produced by the
    /// changes before it.
    ///
    /// Either every change applies or the snapshot is left untouched and the
    /// first failure is returned.
    pub fn apply_changes(&self, changes: &[TextChange]) -> Result<ScriptSnapshot, TextError> {
        let mut current = self.clone();
        for change in changes {
            current = current.apply_change(change)?;
        }
        Ok(current)
    }

    pub fn apply_change(&self, change: &TextChange) -> Result<ScriptSnapshot, TextError> {
        let (start, end) = self.byte_range(change.span)?;
        let mut text = String::with_capacity(self.text.len() - (end - start) + change.new_text.len());
        text.push_str(&self.text[..start]);
        text.push_str(&change.new_text);
        text.push_str(&self.text[end..]);
        Ok(ScriptSnapshot::new(text))
    }

    fn byte_range(&self, span: TextSpan) -> Result<(usize, usize), TextError> {
        if span.end() > self.length {
            return Err(TextError::OutOfBounds {
                start: span.start,
                end: span.end(),
                length: self.length,
            });
        }
        Ok((self.byte_index(span.start)?, self.byte_index(span.end())?))
    }

    /// Byte index of a UTF-16 offset within `0..=len()`.
    fn byte_index(&self, offset: usize) -> Result<usize, TextError> {
        let mut units = 0;
        for (idx, ch) in self.text.char_indices() {
            if units == offset {
                return Ok(idx);
            }
            units += ch.len_utf16();
            if units > offset {
                return Err(TextError::SplitCodePoint(offset));
            }
        }
        Ok(self.text.len())
    }
}
