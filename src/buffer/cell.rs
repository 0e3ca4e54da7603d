//! Grid Cell
//!
//! One slot of the character grid. A multi-column glyph occupies one primary
//! cell followed by `Tail` placeholder cells; `Lead` placeholders pad the end
//! of a row when a wide glyph would not fit and wraps early.

use serde::{Deserialize, Serialize};

/// Role of a cell relative to multi-column glyphs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placeholder {
    /// An ordinary cell carrying a glyph.
    #[default]
    None,
    /// Padding at the end of a row before an early wrap.
    Lead,
    /// Continuation column of a wide glyph to its left.
    Tail,
}

/// Text style attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    pub bold: bool,
    pub underline: bool,
    pub reverse: bool,
}

impl Style {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A single cell in the terminal grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// The glyph in this cell. May hold several codepoints when combining
    /// marks follow the base character; empty for placeholder cells.
    pub glyph: String,
    /// Columns the glyph spans. Placeholders have width 0.
    pub width: u8,
    /// Placeholder role
    pub placeholder: Placeholder,
    /// Foreground color
    pub fg: Color,
    /// Background color
    pub bg: Color,
    /// Style attributes
    pub style: Style,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            glyph: String::new(),
            width: 0,
            placeholder: Placeholder::None,
            fg: Color::Default,
            bg: Color::Default,
            style: Style::default(),
        }
    }
}

impl Cell {
    /// Create a primary cell for a glyph.
    pub fn new(c: char, width: u8, fg: Color, bg: Color, style: Style) -> Self {
        Self {
            glyph: c.to_string(),
            width,
            placeholder: Placeholder::None,
            fg,
            bg,
            style,
        }
    }

    /// Padding cell before an early wrap.
    pub fn lead() -> Self {
        Self {
            placeholder: Placeholder::Lead,
            ..Default::default()
        }
    }

    /// Continuation cell of a wide glyph.
    pub fn tail() -> Self {
        Self {
            placeholder: Placeholder::Tail,
            ..Default::default()
        }
    }

    /// True for Lead and Tail cells.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder != Placeholder::None
    }

    /// Append a combining mark to the glyph.
    pub fn push_combining(&mut self, c: char) {
        self.glyph.push(c);
    }
}

/// Color representation: terminal default or an xterm-256 palette index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    /// Default terminal color (foreground or background)
    #[default]
    Default,
    /// xterm 256-color palette index
    Indexed(u8),
}

impl Color {
    /// Standard ANSI colors (0-7)
    pub const BLACK: Color = Color::Indexed(0);
    pub const RED: Color = Color::Indexed(1);
    pub const GREEN: Color = Color::Indexed(2);
    pub const YELLOW: Color = Color::Indexed(3);
    pub const BLUE: Color = Color::Indexed(4);
    pub const MAGENTA: Color = Color::Indexed(5);
    pub const CYAN: Color = Color::Indexed(6);
    pub const WHITE: Color = Color::Indexed(7);

    /// Convert a 256-color index to RGB
    /// This implements the standard xterm 256-color palette
    pub fn indexed_to_rgb(index: u8) -> (u8, u8, u8) {
        match index {
            // Standard colors (0-15) - using typical xterm defaults
            0 => (0, 0, 0),
            1 => (205, 0, 0),
            2 => (0, 205, 0),
            3 => (205, 205, 0),
            4 => (0, 0, 238),
            5 => (205, 0, 205),
            6 => (0, 205, 205),
            7 => (229, 229, 229),
            8 => (127, 127, 127),
            9 => (255, 0, 0),
            10 => (0, 255, 0),
            11 => (255, 255, 0),
            12 => (92, 92, 255),
            13 => (255, 0, 255),
            14 => (0, 255, 255),
            15 => (255, 255, 255),
            // 216 color cube (16-231)
            16..=231 => {
                let n = index - 16;
                let r = n / 36;
                let g = (n % 36) / 6;
                let b = n % 6;
                let to_rgb = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
                (to_rgb(r), to_rgb(g), to_rgb(b))
            }
            // Grayscale (232-255)
            232..=255 => {
                let gray = 8 + (index - 232) * 10;
                (gray, gray, gray)
            }
        }
    }

    /// Convert this color to RGB, using defaults for Default color
    pub fn to_rgb(&self, is_foreground: bool) -> (u8, u8, u8) {
        match self {
            Color::Default => {
                if is_foreground {
                    (229, 229, 229)
                } else {
                    (0, 0, 0)
                }
            }
            Color::Indexed(i) => Self::indexed_to_rgb(*i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_new() {
        let cell = Cell::new('A', 1, Color::Default, Color::Default, Style::default());
        assert_eq!(cell.glyph, "A");
        assert_eq!(cell.width, 1);
        assert!(!cell.is_placeholder());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Cell::lead().placeholder, Placeholder::Lead);
        assert_eq!(Cell::tail().placeholder, Placeholder::Tail);
        assert!(Cell::lead().is_placeholder());
        assert_eq!(Cell::tail().width, 0);
    }

    #[test]
    fn test_combining_marks() {
        let mut cell = Cell::new('e', 1, Color::Default, Color::Default, Style::default());
        cell.push_combining('\u{0301}');
        assert_eq!(cell.glyph, "e\u{0301}");
        assert_eq!(cell.width, 1);
    }

    #[test]
    fn test_color_indexed_to_rgb() {
        // Standard colors
        assert_eq!(Color::indexed_to_rgb(0), (0, 0, 0));
        assert_eq!(Color::indexed_to_rgb(15), (255, 255, 255));

        // Color cube endpoints
        assert_eq!(Color::indexed_to_rgb(16), (0, 0, 0));
        assert_eq!(Color::indexed_to_rgb(231), (255, 255, 255));

        // Grayscale
        assert_eq!(Color::indexed_to_rgb(232), (8, 8, 8));
        assert_eq!(Color::indexed_to_rgb(255), (238, 238, 238));
    }
}
