//! Terminal screen model
//!
//! Platform-independent terminal state management:
//! - Character grid with scrollback history and a movable viewport
//! - Cell representation with colors and attributes
//! - Line-wrap tracking and reflow on resize
//! - Alternate screen
//! - Deterministic render snapshots
//!
//! The model is completely deterministic: the same byte stream always
//! produces the same state.

mod cell;
mod row;
mod screen;
mod snapshot;

pub use cell::{Cell, Color, Placeholder, Style};
pub use row::Row;
pub use screen::{
    Position, ResizeCallback, ScreenBuffer, ScrollCallback, StdinCallback, TitleCallback,
    DEFAULT_MAX_HISTORY,
};
pub use snapshot::RenderSnapshot;
