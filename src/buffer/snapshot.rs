//! Render snapshots
//!
//! A snapshot captures the visible viewport as an immutable, serializable
//! value. Renderers and tests consume snapshots instead of reaching into the
//! live buffer, so the screen lock is held only long enough to copy the
//! viewport out. Given the same byte stream, the buffer must produce
//! identical snapshots.

use serde::{Deserialize, Serialize};

use super::cell::Placeholder;
use super::row::Row;

/// An immutable copy of the viewport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSnapshot {
    /// Viewport rows, top to bottom.
    pub rows: Vec<Row>,
    /// Columns per row.
    pub cols: usize,
    /// Rows in the viewport.
    pub viewport_rows: usize,
    /// Index of the first viewport row within the full buffer.
    pub viewport_offset: usize,
    /// Total rows including scrolled-out history.
    pub total_rows: usize,
    /// Cursor column.
    pub cursor_col: usize,
    /// Cursor row relative to the viewport top; negative when the cursor
    /// has scrolled out of view above.
    pub cursor_row: i64,
    /// Whether the alternate screen is active.
    pub alt_screen: bool,
}

impl RenderSnapshot {
    /// Cursor position within the viewport, if visible.
    pub fn cursor_on_screen(&self) -> Option<(usize, usize)> {
        if self.cursor_row >= 0 && (self.cursor_row as usize) < self.viewport_rows {
            Some((self.cursor_col, self.cursor_row as usize))
        } else {
            None
        }
    }

    /// Convert snapshot to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse snapshot from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Plain-text dump of the viewport (for debugging and golden tests).
    pub fn to_text(&self) -> String {
        let mut result = String::new();
        for row in &self.rows {
            for cell in &row.cells {
                match cell {
                    Some(c) if c.placeholder == Placeholder::None => result.push_str(&c.glyph),
                    Some(c) if c.placeholder == Placeholder::Tail => {}
                    _ => result.push(' '),
                }
            }
            while result.ends_with(' ') {
                result.pop();
            }
            result.push('\n');
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ScreenBuffer;

    #[test]
    fn test_snapshot_contents() {
        let mut buf = ScreenBuffer::new(10, 3);
        buf.stdout(b"Hi");
        let snap = buf.snapshot();
        assert_eq!(snap.cols, 10);
        assert_eq!(snap.viewport_rows, 3);
        assert_eq!(snap.rows.len(), 3);
        assert_eq!(snap.rows[0].cells[0].as_ref().unwrap().glyph, "H");
        assert_eq!(snap.cursor_on_screen(), Some((2, 0)));
        assert!(!snap.alt_screen);
    }

    #[test]
    fn test_snapshot_to_text() {
        let mut buf = ScreenBuffer::new(10, 3);
        buf.stdout(b"AB\r\nC");
        let text = buf.snapshot().to_text();
        assert_eq!(text, "AB\nC\n\n");
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut buf = ScreenBuffer::new(10, 3);
        buf.stdout(b"before");
        let snap = buf.snapshot();
        buf.stdout(b"\x1b[2Jafter");
        assert_eq!(snap.rows[0].text(), "before");
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let mut buf = ScreenBuffer::new(10, 3);
        buf.stdout(b"\x1b[1mX");
        let snap = buf.snapshot();
        let json = snap.to_json().unwrap();
        let restored = RenderSnapshot::from_json(&json).unwrap();
        assert_eq!(snap, restored);
    }

    #[test]
    fn test_cursor_off_screen_when_scrolled_up() {
        let mut buf = ScreenBuffer::new(10, 3);
        for i in 0..10 {
            buf.stdout(format!("l{i}\r\n").as_bytes());
        }
        buf.scroll_up(100);
        let snap = buf.snapshot();
        assert_eq!(snap.viewport_offset, 0);
        assert_eq!(snap.cursor_on_screen(), None);
    }
}
