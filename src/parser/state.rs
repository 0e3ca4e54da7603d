//! Escape Sequence State Machine
//!
//! Byte-driven processor for the ESC/CSI/OSC subset the screen buffer
//! understands. Bytes are fed one at a time through [`EscapeProcessor::input`],
//! so escape sequences may be split across arbitrary read boundaries.
//!
//! States:
//! - Ground: not inside a sequence
//! - AfterEsc: ESC seen, waiting for `[`, `]`, or a single final letter
//! - CsiMarks: inside CSI, a private marker (`?`, `#`, `<`, `>`, `=`) may come
//! - CsiArgs: inside CSI, between numeric arguments
//! - CsiArgDigits: inside CSI, accumulating digits of one argument
//! - OscArgs: inside OSC, between string arguments
//! - OscArgDigits: inside OSC, accumulating one string argument
//!
//! A byte outside the expected class discards the partial sequence, logs a
//! diagnostic, resets to Ground, and parsing resumes at the next byte.

use tracing::{debug, warn};

use super::command::{Command, StyleUpdate};
use crate::buffer::Color;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    AfterEsc,
    CsiMarks,
    CsiArgs,
    CsiArgDigits,
    OscArgs,
    OscArgDigits,
}

/// Classification of a single input byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// The byte is not part of any escape sequence; the caller should treat
    /// it as literal output (or a C0 control).
    NotInSequence,
    /// The byte was consumed into a sequence still being accumulated.
    InProgress,
    /// The byte terminated a sequence. `Some` carries the parsed command;
    /// `None` means the sequence was unsupported or malformed and has been
    /// discarded after a diagnostic.
    Completed(Option<Command>),
}

/// The escape sequence processor.
#[derive(Debug)]
pub struct EscapeProcessor {
    state: State,
    /// Numeric arguments for CSI sequences
    args: Vec<u32>,
    /// Digits of the numeric argument being accumulated
    arg_buf: String,
    /// Bytes of the OSC string argument being accumulated
    osc_buf: Vec<u8>,
    /// String arguments for OSC sequences
    osc_args: Vec<String>,
    /// Private marker byte after CSI (`?`, `#`, `<`, `>`, `=`), 0 if none
    mark: u8,
    /// Raw bytes of the current sequence, kept for diagnostics
    raw: Vec<u8>,
}

impl Default for EscapeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl EscapeProcessor {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            args: Vec::with_capacity(16),
            arg_buf: String::with_capacity(8),
            osc_buf: Vec::with_capacity(64),
            osc_args: Vec::with_capacity(4),
            mark: 0,
            raw: Vec::with_capacity(32),
        }
    }

    /// Reset to the ground state, discarding any partial sequence.
    pub fn reset(&mut self) {
        self.state = State::Ground;
        self.args.clear();
        self.arg_buf.clear();
        self.osc_buf.clear();
        self.osc_args.clear();
        self.mark = 0;
        self.raw.clear();
    }

    /// Feed one byte through the state machine.
    pub fn input(&mut self, byte: u8) -> ParseResult {
        if self.state != State::Ground {
            self.raw.push(byte);
        }
        match self.state {
            State::Ground => {
                if byte == ESC {
                    self.raw.clear();
                    self.raw.push(byte);
                    self.state = State::AfterEsc;
                    ParseResult::InProgress
                } else {
                    ParseResult::NotInSequence
                }
            }
            State::AfterEsc => match byte {
                b'[' => {
                    self.state = State::CsiMarks;
                    ParseResult::InProgress
                }
                b']' => {
                    self.state = State::OscArgs;
                    ParseResult::InProgress
                }
                b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z' => {
                    ParseResult::Completed(self.complete_esc(byte))
                }
                _ => self.fail("unexpected byte after ESC"),
            },
            State::CsiMarks => match byte {
                b'?' | b'#' | b'<' | b'>' | b'=' => {
                    self.mark = byte;
                    self.state = State::CsiArgs;
                    ParseResult::InProgress
                }
                b'0'..=b'9' => {
                    self.arg_buf.push(byte as char);
                    self.state = State::CsiArgDigits;
                    ParseResult::InProgress
                }
                b'A'..=b'Z' | b'a'..=b'z' => ParseResult::Completed(self.complete_csi(byte)),
                _ => self.fail("unexpected byte after CSI"),
            },
            State::CsiArgs => match byte {
                b'0'..=b'9' => {
                    self.arg_buf.push(byte as char);
                    self.state = State::CsiArgDigits;
                    ParseResult::InProgress
                }
                b'A'..=b'Z' | b'a'..=b'z' => ParseResult::Completed(self.complete_csi(byte)),
                _ => self.fail("unexpected byte in CSI arguments"),
            },
            State::CsiArgDigits => match byte {
                b'0'..=b'9' => {
                    self.arg_buf.push(byte as char);
                    ParseResult::InProgress
                }
                b';' => {
                    self.flush_numeric_arg();
                    self.state = State::CsiArgs;
                    ParseResult::InProgress
                }
                b'A'..=b'Z' | b'a'..=b'z' => {
                    self.flush_numeric_arg();
                    ParseResult::Completed(self.complete_csi(byte))
                }
                _ => self.fail("unexpected byte in CSI argument digits"),
            },
            State::OscArgs => {
                if is_osc_payload(byte) {
                    self.osc_buf.push(byte);
                    self.state = State::OscArgDigits;
                    ParseResult::InProgress
                } else {
                    self.fail("unexpected byte in OSC arguments")
                }
            }
            State::OscArgDigits => {
                if is_osc_payload(byte) {
                    self.osc_buf.push(byte);
                    ParseResult::InProgress
                } else if byte == b';' {
                    self.flush_string_arg();
                    self.state = State::OscArgs;
                    ParseResult::InProgress
                } else if byte == BEL || byte == ESC {
                    self.flush_string_arg();
                    ParseResult::Completed(self.complete_osc())
                } else {
                    self.fail("unexpected byte in OSC payload")
                }
            }
        }
    }

    /// Whether a sequence is currently being accumulated.
    pub fn in_sequence(&self) -> bool {
        self.state != State::Ground
    }

    fn flush_numeric_arg(&mut self) {
        // Accumulate with saturation rather than overflowing on hostile input.
        let mut value: u32 = 0;
        for c in self.arg_buf.chars() {
            let digit = c as u32 - '0' as u32;
            value = value.saturating_mul(10).saturating_add(digit);
        }
        self.args.push(value);
        self.arg_buf.clear();
    }

    fn flush_string_arg(&mut self) {
        self.osc_args
            .push(String::from_utf8_lossy(&self.osc_buf).into_owned());
        self.osc_buf.clear();
    }

    /// Discard the partial sequence with a diagnostic and reset.
    fn fail(&mut self, why: &str) -> ParseResult {
        warn!(
            sequence = %String::from_utf8_lossy(&self.raw).escape_debug(),
            "discarding escape sequence: {why}"
        );
        self.reset();
        ParseResult::Completed(None)
    }

    /// ESC followed by a single letter.
    fn complete_esc(&mut self, cmd: u8) -> Option<Command> {
        let result = match cmd {
            b'M' => Some(Command::ReverseIndex),
            _ => {
                debug!("unsupported ESC sequence: ESC {}", cmd as char);
                None
            }
        };
        self.reset();
        result
    }

    /// CSI terminated by its final letter.
    fn complete_csi(&mut self, cmd: u8) -> Option<Command> {
        let args = std::mem::take(&mut self.args);
        let arg = |i: usize, default: u32| args.get(i).copied().unwrap_or(default);
        let result = match (self.mark, cmd) {
            (0, b'n') | (b'?', b'n') => {
                if arg(0, 0) == 6 {
                    Some(Command::ReportCursorPosition)
                } else {
                    Some(Command::ReportDeviceStatus)
                }
            }
            (0, b'm') => Some(Command::SetStyle(parse_sgr(&args))),
            (0, b'P') => Some(Command::EraseLine(0)),
            (0, b'A') => Some(Command::CursorMove {
                dx: 0,
                dy: -(arg(0, 1).min(i32::MAX as u32) as i32),
            }),
            (0, b'B') => Some(Command::CursorMove {
                dx: 0,
                dy: arg(0, 1).min(i32::MAX as u32) as i32,
            }),
            (0, b'C') => Some(Command::CursorMove {
                dx: arg(0, 1).min(i32::MAX as u32) as i32,
                dy: 0,
            }),
            (0, b'D') => Some(Command::CursorMove {
                dx: -(arg(0, 1).min(i32::MAX as u32) as i32),
                dy: 0,
            }),
            (0, b'G') => Some(Command::CursorColumn(
                arg(0, 1).max(1).saturating_sub(1).min(u16::MAX as u32) as u16,
            )),
            (0, b'H') => Some(Command::CursorPosition {
                row: arg(0, 1).max(1).saturating_sub(1).min(u16::MAX as u32) as u16,
                col: arg(1, 1).max(1).saturating_sub(1).min(u16::MAX as u32) as u16,
            }),
            (0, b'J') => Some(Command::EraseDisplay(arg(0, 0).min(u16::MAX as u32) as u16)),
            (0, b'K') => {
                // No argument means erase the entire line; 3 and above is
                // outside the protocol and the sequence is discarded.
                let mode = arg(0, 2);
                if mode > 2 {
                    return self.fail_completion("CSI K mode out of range");
                }
                Some(Command::EraseLine(mode as u16))
            }
            (0, b'M') => Some(Command::DeleteLines(
                arg(0, 1).max(1).min(u16::MAX as u32) as u16
            )),
            (b'?', b'h') | (b'?', b'l') => {
                let on = cmd == b'h';
                match arg(0, 0) {
                    7 => Some(Command::SetAutoWrap(on)),
                    47 => Some(Command::AltScreen(on)),
                    1049 => Some(Command::AltScreenSaveCursor(on)),
                    0 => return self.fail_completion("missing DEC private mode number"),
                    other => {
                        debug!("ignoring DEC private mode {other}");
                        None
                    }
                }
            }
            _ => {
                return self.fail_completion("unsupported CSI sequence");
            }
        };
        self.reset();
        result
    }

    /// OSC terminated by BEL or ESC.
    fn complete_osc(&mut self) -> Option<Command> {
        let result = match self.osc_args.first().map(String::as_str) {
            Some("0") | Some("1") | Some("2") => match self.osc_args.get(1) {
                Some(title) => Some(Command::SetTitle(title.clone())),
                None => return self.fail_completion("OSC title sequence missing payload"),
            },
            _ => {
                debug!(
                    "ignoring OSC sequence: {}",
                    String::from_utf8_lossy(&self.raw).escape_debug()
                );
                None
            }
        };
        self.reset();
        result
    }

    /// Like `fail` but for use inside the completion helpers, which return
    /// the inner `Option<Command>` rather than a `ParseResult`.
    fn fail_completion(&mut self, why: &str) -> Option<Command> {
        warn!(
            sequence = %String::from_utf8_lossy(&self.raw).escape_debug(),
            "discarding escape sequence: {why}"
        );
        self.reset();
        None
    }
}

/// OSC payload bytes: printable ASCII and high bytes (UTF-8 continuation
/// lands here), excluding the `;` separator.
fn is_osc_payload(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte) && byte != b';' || byte >= 0x80
}

/// Scan an SGR argument list into a style delta.
///
/// Classic colors 30-37/40-47 may be followed by a 0/1 argument selecting the
/// normal or bright palette half, consuming one or two arguments accordingly.
/// 38/48 accept only the `5;n` indexed form. Unrecognized codes are skipped.
fn parse_sgr(args: &[u32]) -> StyleUpdate {
    let mut update = StyleUpdate::default();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i];
        match arg {
            0 => {
                update = StyleUpdate::reset();
                i += 1;
            }
            1 => {
                update.bold = Some(true);
                i += 1;
            }
            4 => {
                update.underline = Some(true);
                i += 1;
            }
            7 => {
                update.reverse = Some(true);
                i += 1;
            }
            22 => {
                update.bold = Some(false);
                i += 1;
            }
            24 => {
                update.underline = Some(false);
                i += 1;
            }
            27 => {
                update.reverse = Some(false);
                i += 1;
            }
            30..=37 | 40..=47 => {
                let variant = args.get(i + 1).copied();
                let bright = variant == Some(1);
                let consumed = if matches!(variant, Some(0) | Some(1)) {
                    2
                } else {
                    1
                };
                let index = (arg % 10) as u8 + if bright { 8 } else { 0 };
                if arg < 40 {
                    update.fg = Some(Color::Indexed(index));
                } else {
                    update.bg = Some(Color::Indexed(index));
                }
                i += consumed;
            }
            39 => {
                update.fg = Some(Color::Default);
                i += 1;
            }
            49 => {
                update.bg = Some(Color::Default);
                i += 1;
            }
            90..=97 => {
                update.fg = Some(Color::Indexed((arg - 90 + 8) as u8));
                i += 1;
            }
            100..=107 => {
                update.bg = Some(Color::Indexed((arg - 100 + 8) as u8));
                i += 1;
            }
            38 | 48 => {
                if i + 2 >= args.len() {
                    debug!("truncated SGR {} sequence", arg);
                    break;
                }
                if args[i + 1] == 5 && args[i + 2] <= 255 {
                    let color = Color::Indexed(args[i + 2] as u8);
                    if arg == 38 {
                        update.fg = Some(color);
                    } else {
                        update.bg = Some(color);
                    }
                } else {
                    debug!("unsupported SGR {} form: {:?}", arg, &args[i..]);
                }
                i += 3;
            }
            other => {
                debug!("ignoring SGR code {other}");
                i += 1;
            }
        }
    }
    update
}
