//! Screen Buffer
//!
//! The character grid, its scrollback history, and the cursor. History and
//! the visible viewport live in one `VecDeque<Row>`: the viewport is the
//! window of `col_len` rows starting at `viewport_offset`, and the cursor's
//! row index is absolute within the deque. Bytes from the child process come
//! in through [`ScreenBuffer::stdout`], which routes them through the escape
//! processor and applies the resulting commands.
//!
//! Invariants kept by every operation:
//! - `rows.len() >= col_len`
//! - `0 <= viewport_offset <= rows.len() - col_len`
//! - `cursor.y < rows.len()` and `cursor.x < row_len`

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::trace;
use unicode_width::UnicodeWidthChar;

use super::cell::{Cell, Color, Placeholder, Style};
use super::row::Row;
use super::snapshot::RenderSnapshot;
use crate::parser::{Command, EscapeProcessor, ParseResult, StyleUpdate};

/// Default scrollback limit, counted in rows including the viewport.
pub const DEFAULT_MAX_HISTORY: usize = 5000;

/// Absolute position in the unified buffer: `y` indexes rows from the top
/// of history, `x` is the column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

/// Bytes the terminal wants to send back to the child process.
pub type StdinCallback = Box<dyn FnMut(&[u8]) + Send>;
/// The application set the window title.
pub type TitleCallback = Box<dyn FnMut(&str) + Send>;
/// Viewport offset or history length changed: `(offset, total_rows)`.
pub type ScrollCallback = Box<dyn FnMut(usize, usize) + Send>;
/// The viewport geometry changed: `(cols, rows)`.
pub type ResizeCallback = Box<dyn FnMut(usize, usize) + Send>;

/// Saved primary screen while the alternate screen is active.
struct AltScreen {
    rows: VecDeque<Row>,
    viewport_offset: usize,
    saved_cursor: Option<Position>,
}

/// The terminal screen model.
pub struct ScreenBuffer {
    rows: VecDeque<Row>,
    /// Index of the first viewport row within `rows`.
    viewport_offset: usize,
    /// Columns per row.
    row_len: usize,
    /// Rows in the viewport.
    col_len: usize,
    cursor: Position,

    // current drawing attributes
    fg: Color,
    bg: Color,
    style: Style,
    auto_wrap_enabled: bool,

    max_history: usize,
    alt: Option<AltScreen>,

    processor: EscapeProcessor,
    /// Partial UTF-8 scalar split across `stdout` calls.
    utf8_pending: Vec<u8>,
    utf8_need: usize,

    postpone_scroll_updates: bool,
    scroll_update_pending: bool,

    stdin_cb: Option<StdinCallback>,
    title_cb: Option<TitleCallback>,
    scroll_cb: Option<ScrollCallback>,
    resize_cb: Option<ResizeCallback>,
}

impl ScreenBuffer {
    /// Create a buffer with a `cols` x `rows` viewport and empty history.
    pub fn new(cols: usize, rows: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            rows: (0..rows).map(|_| Row::new(cols)).collect(),
            viewport_offset: 0,
            row_len: cols,
            col_len: rows,
            cursor: Position::default(),
            fg: Color::Default,
            bg: Color::Default,
            style: Style::default(),
            auto_wrap_enabled: true,
            max_history: DEFAULT_MAX_HISTORY.max(rows),
            alt: None,
            processor: EscapeProcessor::new(),
            utf8_pending: Vec::with_capacity(4),
            utf8_need: 0,
            postpone_scroll_updates: false,
            scroll_update_pending: false,
            stdin_cb: None,
            title_cb: None,
            scroll_cb: None,
            resize_cb: None,
        }
    }

    // ==========================
    //        ACCESSORS
    // ==========================

    pub fn cursor(&self) -> Position {
        self.cursor
    }

    /// Viewport size as `(cols, rows)`.
    pub fn size(&self) -> (usize, usize) {
        (self.row_len, self.col_len)
    }

    pub fn viewport_offset(&self) -> usize {
        self.viewport_offset
    }

    /// Total rows including scrolled-out history.
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, y: usize) -> Option<&Row> {
        self.rows.get(y)
    }

    pub fn is_alt_screen(&self) -> bool {
        self.alt.is_some()
    }

    pub fn auto_wrap_enabled(&self) -> bool {
        self.auto_wrap_enabled
    }

    /// Cap on total rows kept, clamped to at least one viewport's height.
    pub fn set_max_history(&mut self, limit: usize) {
        self.max_history = limit.max(self.col_len);
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn on_stdin(&mut self, cb: StdinCallback) {
        self.stdin_cb = Some(cb);
    }

    pub fn on_title(&mut self, cb: TitleCallback) {
        self.title_cb = Some(cb);
    }

    pub fn on_scroll(&mut self, cb: ScrollCallback) {
        self.scroll_cb = Some(cb);
    }

    pub fn on_resize(&mut self, cb: ResizeCallback) {
        self.resize_cb = Some(cb);
    }

    /// Immutable copy of the viewport for rendering.
    pub fn snapshot(&self) -> RenderSnapshot {
        let top = self.viewport_offset;
        let bottom = (top + self.col_len).min(self.rows.len());
        RenderSnapshot {
            rows: self.rows.range(top..bottom).cloned().collect(),
            cols: self.row_len,
            viewport_rows: self.col_len,
            viewport_offset: top,
            total_rows: self.rows.len(),
            cursor_col: self.cursor.x,
            cursor_row: self.cursor.y as i64 - top as i64,
            alt_screen: self.alt.is_some(),
        }
    }

    // ==========================
    //     STREAM PROCESSING
    // ==========================

    /// Feed bytes read from the child process into the terminal.
    ///
    /// Escape sequences and UTF-8 scalars may be split at any byte boundary
    /// between calls.
    pub fn stdout(&mut self, bytes: &[u8]) {
        let mut text = String::new();
        for &byte in bytes {
            // Continuation bytes of a pending scalar bypass the escape
            // processor entirely.
            if self.utf8_need > 0 {
                if byte & 0xc0 == 0x80 {
                    self.utf8_pending.push(byte);
                    self.utf8_need -= 1;
                    if self.utf8_need == 0 {
                        match std::str::from_utf8(&self.utf8_pending) {
                            Ok(s) => text.push_str(s),
                            Err(_) => text.push(char::REPLACEMENT_CHARACTER),
                        }
                        self.utf8_pending.clear();
                    }
                    continue;
                }
                // Malformed: emit a replacement and reprocess this byte.
                self.utf8_pending.clear();
                self.utf8_need = 0;
                text.push(char::REPLACEMENT_CHARACTER);
            }

            match self.processor.input(byte) {
                ParseResult::InProgress => {
                    self.flush_text(&mut text);
                }
                ParseResult::Completed(command) => {
                    self.flush_text(&mut text);
                    if let Some(command) = command {
                        self.apply_command(command);
                    }
                }
                ParseResult::NotInSequence => match byte {
                    0x08 => {
                        self.flush_text(&mut text);
                        self.backspace(1);
                    }
                    0x0d => {
                        self.flush_text(&mut text);
                        self.carriage_feed();
                    }
                    0x0a => {
                        self.flush_text(&mut text);
                        self.write_at_cursor("\n");
                    }
                    0x09 => text.push_str("        "),
                    0x07 => {} // bell
                    0x00..=0x1f | 0x7f => {
                        trace!("ignoring control byte {byte:#04x}");
                    }
                    0xc2..=0xdf => self.start_utf8(byte, 1),
                    0xe0..=0xef => self.start_utf8(byte, 2),
                    0xf0..=0xf4 => self.start_utf8(byte, 3),
                    0x80..=0xc1 | 0xf5..=0xff => {
                        text.push(char::REPLACEMENT_CHARACTER);
                    }
                    _ => text.push(byte as char),
                },
            }
        }
        self.flush_text(&mut text);
    }

    fn start_utf8(&mut self, lead: u8, need: usize) {
        self.utf8_pending.clear();
        self.utf8_pending.push(lead);
        self.utf8_need = need;
    }

    fn flush_text(&mut self, text: &mut String) {
        if !text.is_empty() {
            self.write_at_cursor(text);
            text.clear();
        }
    }

    /// Apply one parsed escape sequence.
    fn apply_command(&mut self, command: Command) {
        match command {
            Command::ReverseIndex => self.set_cursor_rel_pos(0, -1, false),
            Command::EraseDisplay(mode) => self.erase_display(mode),
            Command::EraseLine(mode) => self.erase_line(mode),
            Command::DeleteLines(n) => self.delete_lines(n as usize),
            Command::CursorPosition { row, col } => {
                self.set_cursor_on_screen_position(col as usize, row as usize);
            }
            Command::CursorMove { dx, dy } => self.set_cursor_rel_pos(dx as i64, dy as i64, true),
            Command::CursorColumn(col) => self.set_cursor_x_pos(col as usize),
            Command::ReportCursorPosition => self.report_cursor_position(),
            Command::ReportDeviceStatus => self.send_stdin(b"\x1b[0n"),
            Command::SetStyle(update) => self.apply_style(update),
            Command::SetTitle(title) => {
                if let Some(cb) = &mut self.title_cb {
                    cb(&title);
                }
            }
            Command::SetAutoWrap(on) => self.auto_wrap_enabled = on,
            Command::AltScreen(on) => self.toggle_alt_screen(on),
            Command::AltScreenSaveCursor(on) => self.toggle_alt_screen_save_cursor(on),
        }
    }

    fn apply_style(&mut self, update: StyleUpdate) {
        if let Some(fg) = update.fg {
            self.fg = fg;
        }
        if let Some(bg) = update.bg {
            self.bg = bg;
        }
        if let Some(bold) = update.bold {
            self.style.bold = bold;
        }
        if let Some(underline) = update.underline {
            self.style.underline = underline;
        }
        if let Some(reverse) = update.reverse {
            self.style.reverse = reverse;
        }
    }

    // ==========================
    //         WRITING
    // ==========================

    /// Write literal text at the cursor, wrapping and scrolling as needed.
    pub fn write_at_cursor(&mut self, text: &str) {
        let mut x = self.cursor.x;
        let mut y = self.cursor.y;

        for ch in text.chars() {
            if ch == '\n' {
                x = 0;
                y += 1;
                self.ensure_row(y);
                continue;
            }

            let width = UnicodeWidthChar::width(ch).unwrap_or(0);
            if width == 0 {
                // Combining mark: attach to the glyph on the left.
                if x > 0 {
                    if let Some(Some(cell)) = self.rows[y].cells.get_mut(x - 1) {
                        if cell.placeholder == Placeholder::None {
                            cell.push_combining(ch);
                        }
                    }
                }
                continue;
            }
            let width = width.min(self.row_len);

            if x + width > self.row_len {
                if self.auto_wrap_enabled {
                    // Pad the rest of the row so a reflow knows the wrap
                    // happened early for a wide glyph.
                    for slot in self.rows[y].cells[x..].iter_mut() {
                        *slot = Some(Cell::lead());
                    }
                    self.rows[y].wrapped = true;
                    x = 0;
                    y += 1;
                    self.ensure_row(y);
                } else {
                    x = self.row_len - width;
                }
            }

            self.rows[y].cells[x] = Some(Cell::new(ch, width as u8, self.fg, self.bg, self.style));
            for i in 1..width {
                self.rows[y].cells[x + i] = Some(Cell::tail());
            }
            x += width;
        }

        while self.rows.len() > self.max_history {
            self.rows.pop_front();
            y = y.saturating_sub(1);
            self.viewport_offset = self.viewport_offset.saturating_sub(1);
        }

        self.cursor = Position {
            x: x.min(self.row_len - 1),
            y: y.min(self.rows.len() - 1),
        };

        // Keep the cursor visible: follow it past the bottom of the viewport.
        let y_from_top = self.cursor.y as i64 - self.viewport_offset as i64;
        if y_from_top > self.col_len as i64 - 1 {
            self.viewport_offset = (self.viewport_offset + y_from_top as usize + 1 - self.col_len)
                .min(self.rows.len() - self.col_len);
            self.notify_scroll_postponed();
        }
    }

    fn ensure_row(&mut self, y: usize) {
        while y >= self.rows.len() {
            self.rows.push_back(Row::new(self.row_len));
        }
    }

    fn clamp_viewport(&mut self) {
        let max = self.rows.len().saturating_sub(self.col_len);
        if self.viewport_offset > max {
            self.viewport_offset = max;
        }
    }

    // ==========================
    //         ERASING
    // ==========================

    /// CSI J: erase within the viewport.
    pub fn erase_display(&mut self, mode: u16) {
        let top = self.viewport_offset;
        let bottom = (top + self.col_len).min(self.rows.len());
        let cy = self.cursor.y;
        match mode {
            0 => {
                if cy < self.rows.len() {
                    self.rows[cy].erase_range(self.cursor.x, self.row_len);
                }
                for y in (cy + 1)..bottom {
                    self.rows[y].erase_range(0, self.row_len);
                }
            }
            1 => {
                for y in top..cy.min(bottom) {
                    self.rows[y].erase_range(0, self.row_len);
                }
                if cy < self.rows.len() {
                    self.rows[cy].erase_range(0, self.cursor.x);
                }
            }
            _ => {
                for y in top..bottom {
                    self.rows[y].erase_range(0, self.row_len);
                }
            }
        }
    }

    /// CSI K / CSI P: erase within the cursor row.
    pub fn erase_line(&mut self, mode: u16) {
        let cy = self.cursor.y;
        let cx = self.cursor.x;
        let row_len = self.row_len;
        match mode {
            0 => self.rows[cy].erase_range(cx, row_len),
            1 => self.rows[cy].erase_range(0, cx),
            _ => self.rows[cy].erase_range(0, row_len),
        }
    }

    /// CSI M: delete `n` rows ending at the cursor row, scrolling what is
    /// below up into the gap, then re-pad so the buffer still fills the
    /// viewport.
    pub fn delete_lines(&mut self, n: usize) {
        let n = n.max(1);
        let cy = self.cursor.y;
        let start = (cy + 1).saturating_sub(n);
        let removed = cy - start + 1;
        for _ in 0..removed {
            self.rows.remove(start);
        }

        while self.rows.len() < self.col_len {
            self.rows.push_back(Row::new(self.row_len));
        }

        self.cursor = Position {
            x: 0,
            y: cy.saturating_sub(n),
        };
        self.viewport_offset = self.viewport_offset.saturating_sub(removed);
        self.clamp_viewport();
        self.notify_scroll_postponed();
    }

    // ==========================
    //       ALT SCREEN
    // ==========================

    /// DEC private mode 47: switch between primary and alternate screens.
    pub fn toggle_alt_screen(&mut self, on: bool) {
        if on {
            let fresh: VecDeque<Row> = (0..self.col_len).map(|_| Row::new(self.row_len)).collect();
            let rows = std::mem::replace(&mut self.rows, fresh);
            self.alt = Some(AltScreen {
                rows,
                viewport_offset: self.viewport_offset,
                saved_cursor: None,
            });
            self.viewport_offset = 0;
            self.cursor = Position::default();
        } else {
            let Some(alt) = self.alt.take() else {
                return;
            };
            self.rows = alt.rows;
            self.viewport_offset = alt.viewport_offset;
            self.cursor.y = self.cursor.y.min(self.rows.len() - 1);
            self.cursor.x = self.cursor.x.min(self.row_len - 1);
        }

        // Drawing attributes reset on both transitions.
        self.fg = Color::Default;
        self.bg = Color::Default;
        self.style.reset();
        self.notify_scroll();
    }

    /// DEC private mode 1049: like mode 47, but the cursor position is
    /// saved on entry and restored on exit.
    pub fn toggle_alt_screen_save_cursor(&mut self, on: bool) {
        if on {
            let saved = self.cursor;
            self.toggle_alt_screen(true);
            if let Some(alt) = self.alt.as_mut() {
                alt.saved_cursor = Some(saved);
            }
        } else {
            let Some(alt) = self.alt.as_ref() else {
                return;
            };
            let saved = alt.saved_cursor;
            self.toggle_alt_screen(false);
            if let Some(cursor) = saved {
                self.cursor = Position {
                    x: cursor.x.min(self.row_len - 1),
                    y: cursor.y.min(self.rows.len() - 1),
                };
            }
        }
    }

    // ==========================
    //       CURSOR CONTROL
    // ==========================

    /// Move to an absolute buffer position, wrapping column overflow and
    /// underflow across rows and growing/scrolling the buffer as needed.
    pub fn set_cursor_position(&mut self, x: i64, y: i64) {
        self.cursor = self.move_screen_with_pos(x, y);
    }

    /// CSI H: viewport-relative move, zero-based.
    pub fn set_cursor_on_screen_position(&mut self, col: usize, row: usize) {
        let col = col.min(self.row_len - 1);
        let row = row.min(self.col_len - 1);
        self.set_cursor_position(col as i64, (self.viewport_offset + row) as i64);
    }

    /// Relative move. With `keep_in_viewport` the target is clamped into
    /// the visible window (CSI A/B/C/D); without it rows can be created or
    /// the viewport scrolled (reverse index).
    pub fn set_cursor_rel_pos(&mut self, dx: i64, dy: i64, keep_in_viewport: bool) {
        let x = self.cursor.x as i64 + dx;
        let y = self.cursor.y as i64 + dy;
        if keep_in_viewport {
            let (x, y) = self.keep_pos_in_screen(x, y);
            self.set_cursor_position(x, y);
        } else {
            self.set_cursor_position(x, y);
        }
    }

    /// CSI G: move to an absolute column in the current row.
    pub fn set_cursor_x_pos(&mut self, x: usize) {
        self.set_cursor_position(x as i64, self.cursor.y as i64);
    }

    /// BS: step left, wrapping to the end of the previous row.
    pub fn backspace(&mut self, count: usize) {
        let x = self.cursor.x as i64 - count as i64;
        self.set_cursor_position(x, self.cursor.y as i64);
    }

    /// CR: back to column zero of the current row.
    pub fn carriage_feed(&mut self) {
        self.set_cursor_position(0, self.cursor.y as i64);
    }

    fn keep_pos_in_screen(&self, x: i64, y: i64) -> (i64, i64) {
        let top = self.viewport_offset as i64;
        let bottom = top + self.col_len as i64 - 1;
        let y = y.clamp(top, bottom);
        let x = x.clamp(0, self.row_len as i64 - 1);
        (x, y)
    }

    fn move_screen_with_pos(&mut self, x: i64, y: i64) -> Position {
        let mut x = x;
        let mut y = y;
        let w = self.row_len as i64;

        while x < 0 {
            x += w;
            y -= 1;
        }
        while x >= w {
            x -= w;
            y += 1;
        }
        y = y.max(0);
        let mut y = y as usize;

        if y < self.viewport_offset {
            self.viewport_offset = y;
            self.notify_scroll_postponed();
        }

        self.ensure_row(y);
        while self.rows.len() > self.max_history {
            self.rows.pop_front();
            y = y.saturating_sub(1);
            self.viewport_offset = self.viewport_offset.saturating_sub(1);
        }

        if y >= self.viewport_offset + self.col_len {
            self.viewport_offset = y + 1 - self.col_len;
            self.notify_scroll_postponed();
        }

        Position { x: x as usize, y }
    }

    /// CSI 6n: send the viewport-relative cursor position, one-based.
    pub fn report_cursor_position(&mut self) {
        let x = self.cursor.x + 1;
        let y = self.cursor.y as i64 - self.viewport_offset as i64 + 1;
        let report = format!("\x1b[{y};{x}R");
        self.send_stdin(report.as_bytes());
    }

    /// Forward user keystrokes to the child process.
    pub fn input(&mut self, bytes: &[u8]) {
        self.send_stdin(bytes);
    }

    fn send_stdin(&mut self, bytes: &[u8]) {
        if let Some(cb) = &mut self.stdin_cb {
            cb(bytes);
        }
    }

    // ==========================
    //         RESIZING
    // ==========================

    /// Resize the viewport to `cols` x `rows`, reflowing soft-wrapped lines
    /// when the width changes.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        let cols = cols.max(1);
        let rows = rows.max(1);
        self.max_history = self.max_history.max(rows);

        if cols == self.row_len {
            self.col_len = rows;
            while self.rows.len() < rows {
                self.rows.push_front(Row::new(cols));
                self.cursor.y += 1;
            }
            self.viewport_offset = self.rows.len() - rows;
            self.notify_scroll();
        } else {
            self.reflow(cols, rows);
        }
        self.notify_resize();
    }

    fn notify_resize(&mut self) {
        let (cols, rows) = (self.row_len, self.col_len);
        if let Some(cb) = &mut self.resize_cb {
            cb(cols, rows);
        }
    }

    /// Re-break every logical line for a new width.
    ///
    /// Hard-broken lines start a fresh row; soft-wrapped runs are re-filled
    /// and re-broken, tracking how many soft wraps precede the cursor in the
    /// old and new layouts so the cursor lands on the same logical spot.
    fn reflow(&mut self, cols: usize, rows: usize) {
        let old_rows = std::mem::take(&mut self.rows);
        let old_len = old_rows.len();
        let cur_x = self.cursor.x;
        let mut cur_y = self.cursor.y as i64;
        let do_auto_wrap = self.auto_wrap_enabled;

        let old_breaks_before_cursor = old_rows
            .iter()
            .take(self.cursor.y)
            .filter(|r| r.wrapped)
            .count() as i64;

        let mut new_rows: VecDeque<Row> = VecDeque::with_capacity(old_len);
        new_rows.push_back(Row::new(cols));
        let mut new_y = 0usize;
        let mut new_x = 0usize;
        let mut new_breaks_before_cursor = 0i64;

        // Set when a row was just auto-broken, so that a following hard
        // break does not also open a row: when the new width divides the
        // old one exactly both conditions fire for the same boundary.
        let mut just_wrapped = false;

        'rows: for y in 0..old_len {
            if y > 0 && !old_rows[y - 1].wrapped && !just_wrapped {
                new_rows.push_back(Row::new(cols));
                new_y += 1;
                new_x = 0;
            }

            let old_row = &old_rows[y];
            let mut x: i64 = -1;
            while x + 1 < old_row.cells.len() as i64 {
                x += 1;
                let cell = old_row.cells[x as usize].clone();
                just_wrapped = false;

                if let Some(c) = &cell {
                    if c.placeholder == Placeholder::Lead {
                        continue;
                    }
                }

                // Clamp like the write path does, otherwise a glyph wider
                // than the whole row could never be placed.
                let width = cell.as_ref().map_or(1, |c| c.width as usize).min(cols);

                if new_x + width > cols {
                    // Glyph too wide to finish this row: pad and retry it
                    // on the next one.
                    while new_x < cols {
                        new_rows[new_y].cells[new_x] = Some(Cell::lead());
                        new_x += 1;
                    }
                    x -= 1;
                } else {
                    new_rows[new_y].cells[new_x] = cell;
                    new_x += 1;
                }

                if new_x >= cols {
                    if !do_auto_wrap {
                        new_x = cols - 1;
                        continue;
                    }

                    let rest = &old_row.cells[((x + 1).max(0) as usize).min(old_row.cells.len())..];
                    let empty_ahead = rest
                        .iter()
                        .all(|c| c.as_ref().map_or(true, |cell| cell.is_placeholder()));

                    if y == old_len - 1 && empty_ahead {
                        // Nothing left: no extra rows after the last line.
                        break 'rows;
                    }

                    new_rows.push_back(Row::new(cols));
                    new_y += 1;
                    new_x = 0;
                    just_wrapped = true;

                    if empty_ahead && !old_row.wrapped {
                        // Avoid wrapping a run of blanks into the next row.
                        break;
                    }

                    let auto_break_y = new_y - 1;
                    new_rows[auto_break_y].wrapped = true;
                    if (auto_break_y as i64) < cur_y {
                        new_breaks_before_cursor += 1;
                        if new_breaks_before_cursor > old_breaks_before_cursor {
                            cur_y += 1;
                        }
                    }
                }
            }
        }

        cur_y -= (old_breaks_before_cursor - new_breaks_before_cursor).max(0);

        // Re-pad at the top so content keeps its distance from the bottom.
        let filler = old_len as i64 - new_rows.len() as i64;
        if filler > 0 {
            cur_y += filler;
            for _ in 0..filler {
                new_rows.push_front(Row::new(cols));
            }
        }

        while new_rows.len() > self.max_history {
            new_rows.pop_front();
            cur_y -= 1;
        }
        while new_rows.len() < rows {
            new_rows.push_front(Row::new(cols));
            cur_y += 1;
        }

        self.row_len = cols;
        self.col_len = rows;
        self.rows = new_rows;
        self.viewport_offset = self.rows.len() - rows;
        let cur_y = cur_y.clamp(0, self.rows.len() as i64 - 1) as usize;
        self.cursor = Position {
            x: cur_x.min(cols - 1),
            y: cur_y,
        };
        self.notify_scroll();
    }

    // ==========================
    //        SCROLLING
    // ==========================

    /// Scroll the viewport toward newer rows.
    pub fn scroll_down(&mut self, lines: usize) {
        let max = self.rows.len() - self.col_len;
        self.viewport_offset = (self.viewport_offset + lines).min(max);
        self.notify_scroll();
    }

    /// Scroll the viewport toward older rows.
    pub fn scroll_up(&mut self, lines: usize) {
        self.viewport_offset = self.viewport_offset.saturating_sub(lines);
        self.notify_scroll();
    }

    /// Batch scroll notifications, e.g. around a burst of writes. Turning
    /// batching off delivers a pending notification.
    pub fn set_postpone_scroll_updates(&mut self, on: bool) {
        self.postpone_scroll_updates = on;
        if !on && self.scroll_update_pending {
            self.scroll_update_pending = false;
            self.notify_scroll();
        }
    }

    fn notify_scroll(&mut self) {
        let offset = self.viewport_offset;
        let total = self.rows.len();
        if let Some(cb) = &mut self.scroll_cb {
            cb(offset, total);
        }
    }

    fn notify_scroll_postponed(&mut self) {
        if self.postpone_scroll_updates {
            self.scroll_update_pending = true;
        } else {
            self.notify_scroll();
        }
    }

    /// Visible text of the viewport, one string per row.
    pub fn viewport_text(&self) -> Vec<String> {
        let top = self.viewport_offset;
        let bottom = (top + self.col_len).min(self.rows.len());
        self.rows.range(top..bottom).map(Row::text).collect()
    }
}
