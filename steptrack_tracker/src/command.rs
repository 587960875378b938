//! Command dispatcher root.
//!
//! Operator input from every source is normalized into a
//! [`CommandEnvelope`](steptrack_common::protocol::CommandEnvelope) by
//! [`parse`], then applied optimistically to the axis store by
//! [`dispatch`] before it is handed to the outbound link.

pub mod dispatch;
pub mod parse;

use std::fmt;

pub use dispatch::{apply, steps_to_degrees};
pub use parse::parse_operator_input;

/// Producer that submitted a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandSource {
    /// Jog wheel (accumulated knob steps and press-to-reset).
    Knob = 0,
    /// Local console.
    Console = 1,
    /// Remote socket client.
    Remote = 2,
    /// The engine itself (alignment queries).
    Engine = 3,
}

impl CommandSource {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Knob => "knob",
            Self::Console => "console",
            Self::Remote => "remote",
            Self::Engine => "engine",
        }
    }
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
