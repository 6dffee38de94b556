//! Command palette: searchable quick actions and navigation targets.
//!
//! The resolver is a pure substring filter over a static command table;
//! the palette adds the open/closed state machine and a bounded selection
//! index on top.

pub mod commands;
pub mod palette;

pub use commands::{resolve, Command, CommandKind};
pub use palette::CommandPalette;
