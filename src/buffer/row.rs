//! Grid Row
//!
//! One row of the unified history-plus-viewport buffer. Slots are `None`
//! until something is written into them, which keeps erase operations cheap
//! and makes "never touched" distinguishable from "erased to background".

use serde::{Deserialize, Serialize};

use super::cell::{Cell, Placeholder};

/// A row in the terminal grid, with its soft-wrap flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// The cells in this row; `None` slots are empty.
    pub cells: Vec<Option<Cell>>,
    /// Whether this row continues onto the next one (soft wrap).
    pub wrapped: bool,
}

impl Row {
    /// Create an empty row with the given number of columns.
    pub fn new(cols: usize) -> Self {
        Self {
            cells: vec![None; cols],
            wrapped: false,
        }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Erase a range of columns back to empty slots.
    pub fn erase_range(&mut self, start: usize, end: usize) {
        let end = end.min(self.cells.len());
        for slot in &mut self.cells[start.min(end)..end] {
            *slot = None;
        }
    }

    /// True if no slot holds a visible glyph.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| match c {
            None => true,
            Some(cell) => cell.is_placeholder(),
        })
    }

    /// Extract the visible text of the row, trailing blanks trimmed.
    pub fn text(&self) -> String {
        let mut s = String::new();
        for cell in &self.cells {
            match cell {
                Some(c) if c.placeholder == Placeholder::None => s.push_str(&c.glyph),
                Some(c) if c.placeholder == Placeholder::Tail => {}
                // Lead padding and untouched slots render as spaces.
                _ => s.push(' '),
            }
        }
        s.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::cell::{Color, Style};

    fn glyph(c: char) -> Option<Cell> {
        Some(Cell::new(c, 1, Color::Default, Color::Default, Style::default()))
    }

    #[test]
    fn test_row_new() {
        let row = Row::new(80);
        assert_eq!(row.len(), 80);
        assert!(!row.wrapped);
        assert!(row.is_blank());
    }

    #[test]
    fn test_row_text() {
        let mut row = Row::new(10);
        row.cells[0] = glyph('H');
        row.cells[1] = glyph('i');
        assert_eq!(row.text(), "Hi");
    }

    #[test]
    fn test_row_text_skips_tails() {
        let mut row = Row::new(10);
        row.cells[0] = Some(Cell::new(
            '中',
            2,
            Color::Default,
            Color::Default,
            Style::default(),
        ));
        row.cells[1] = Some(Cell::tail());
        row.cells[2] = glyph('x');
        assert_eq!(row.text(), "中x");
    }

    #[test]
    fn test_erase_range() {
        let mut row = Row::new(10);
        for i in 0..10 {
            row.cells[i] = glyph('a');
        }
        row.erase_range(3, 7);
        assert_eq!(row.text(), "aaa    aaa".trim_end());
        assert!(row.cells[3].is_none());
        assert!(row.cells[6].is_none());
        assert!(row.cells[7].is_some());
        // Out-of-range end is clamped.
        row.erase_range(8, 100);
        assert!(row.cells[9].is_none());
    }
}
