//! Mapping byte offsets of the source text to human-readable positions.

use std::fmt;

/// Position inside a text in a form that's useful for human readers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Pos {
    /// Line number, starting at 1
    pub line: usize,
    /// Position within the line, in characters, starting at 1
    pub column: usize,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A data structure for mapping byte offsets to line/column based positions.
pub struct LineMap<'a> {
    /// Ordered vector of the position of line breaks (`\n`)
    line_offsets: Vec<usize>,
    /// The original string, needed for obtaining the column indices.
    source: &'a str,
}

impl<'a> LineMap<'a> {
    pub fn new(s: &'a str) -> Self {
        Self {
            line_offsets: s
                .char_indices()
                .filter_map(|(pos, ch)| if ch == '\n' { Some(pos) } else { None })
                .collect(),
            source: s,
        }
    }

    /// # Examples
    ///
    /// ```
    /// # use smartquery_lang::line_map::{LineMap, Pos};
    /// let s = "abc\ndefg\n";
    /// let m = LineMap::new(s);
    /// assert_eq!(m.offset_to_pos(0), Pos { line: 1, column: 1 });
    /// assert_eq!(m.offset_to_pos(3), Pos { line: 1, column: 4 });
    /// assert_eq!(m.offset_to_pos(4), Pos { line: 2, column: 1 });
    /// ```
    pub fn offset_to_pos(&self, offset: usize) -> Pos {
        let line = match self.line_offsets.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line,
        };
        let previous_line_start = if line > 0 {
            self.line_offsets[line - 1] + 1
        } else {
            0
        };
        let column = self.source[previous_line_start..offset].chars().count() + 1;
        Pos {
            line: line + 1,
            column,
        }
    }
}
