//! Terminal escape sequence parser
//!
//! A stateful byte-at-a-time processor that lowers ESC/CSI/OSC sequences
//! into [`Command`] values for the screen buffer to apply.

mod command;
mod state;

pub use command::{Command, StyleUpdate};
pub use state::{EscapeProcessor, ParseResult};
