//! Terminal emulation core
//!
//! A headless terminal emulator: escape sequence parsing, a screen model
//! with scrollback and reflow, and pty-backed child process management.
//!
//! - `parser`: byte-driven VT/xterm escape sequence processor
//! - `buffer`: character grid, scrollback, alternate screen, snapshots
//! - `pty`: child process behind a pseudoterminal, per platform
//! - `session`: glue between a screen buffer and a pty channel

pub mod buffer;
pub mod parser;
pub mod pty;
pub mod session;

pub use buffer::{RenderSnapshot, ScreenBuffer};
pub use parser::{Command, EscapeProcessor, ParseResult};
pub use pty::{PlatformPtyChannel, PtyChannel, PtyError, PtyResult};
pub use session::TerminalSession;
