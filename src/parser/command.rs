//! Parsed terminal commands
//!
//! Every escape sequence the processor recognizes is lowered into a
//! [`Command`] variant. The screen buffer dispatches on the variant with an
//! exhaustive `match`, so adding a sequence means adding a variant and the
//! compiler points at every place that must handle it.

use serde::{Deserialize, Serialize};

use crate::buffer::Color;

/// A fully parsed escape sequence, ready to be applied to the screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// ESC M: move the cursor up one row without clamping to the viewport.
    ReverseIndex,
    /// CSI J: erase within the viewport. 0 = cursor to end, 1 = start to
    /// cursor, 2 (or anything else) = entire viewport.
    EraseDisplay(u16),
    /// CSI K / CSI P: erase within the cursor row. 0 = cursor to end of
    /// line, 1 = start of line to cursor, 2 = entire line.
    EraseLine(u16),
    /// CSI M: delete rows ending at the cursor row, scrolling content up.
    DeleteLines(u16),
    /// CSI H: absolute cursor move, viewport-relative and zero-based.
    CursorPosition { row: u16, col: u16 },
    /// CSI A/B/C/D: relative cursor move, clamped to the viewport.
    CursorMove { dx: i32, dy: i32 },
    /// CSI G: move the cursor to an absolute column, zero-based.
    CursorColumn(u16),
    /// CSI 6n: the application asked where the cursor is.
    ReportCursorPosition,
    /// CSI n with any other argument: report "terminal OK".
    ReportDeviceStatus,
    /// CSI m: apply a style delta to the current drawing attributes.
    SetStyle(StyleUpdate),
    /// OSC 0/1/2: set the window/icon title.
    SetTitle(String),
    /// DEC private mode 7: enable or disable auto-wrap.
    SetAutoWrap(bool),
    /// DEC private mode 47: enter or leave the alternate screen.
    AltScreen(bool),
    /// DEC private mode 1049: alternate screen, saving/restoring the cursor.
    AltScreenSaveCursor(bool),
}

/// A style delta produced by an SGR sequence.
///
/// `None` fields leave the corresponding attribute untouched, so
/// `ESC[1m` only turns on bold and `ESC[0m` resets everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StyleUpdate {
    pub fg: Option<Color>,
    pub bg: Option<Color>,
    pub bold: Option<bool>,
    pub underline: Option<bool>,
    pub reverse: Option<bool>,
}

impl StyleUpdate {
    /// The delta produced by SGR 0: everything back to defaults.
    pub fn reset() -> Self {
        Self {
            fg: Some(Color::Default),
            bg: Some(Color::Default),
            bold: Some(false),
            underline: Some(false),
            reverse: Some(false),
        }
    }

    /// True if this update changes nothing.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}
