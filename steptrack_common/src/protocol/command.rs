//! Outbound command envelope.
//!
//! | Prefix | Meaning                             | Payload        |
//! |--------|-------------------------------------|----------------|
//! | `D`    | move to absolute degree             | `0..=360`      |
//! | `S`    | move by relative steps              | signed integer |
//! | `K`    | move by relative steps (jog-sourced)| signed integer |
//! | `C`    | reset to zero                       | none           |
//! | `Q`    | query current position              | none           |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::{ABSOLUTE_DEGREE_MAX, ABSOLUTE_DEGREE_MIN};
use crate::error::Rejection;

/// Kind of command sent to the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Move to an absolute degree.
    AbsoluteDegree,
    /// Move by a signed number of steps (operator-sourced).
    RelativeSteps,
    /// Return to zero.
    Reset,
    /// Report the current position.
    Query,
    /// Move by a signed number of steps (jog-wheel-sourced).
    KnobSteps,
}

impl CommandKind {
    /// Wire prefix character.
    #[inline]
    pub const fn prefix(self) -> char {
        match self {
            Self::AbsoluteDegree => 'D',
            Self::RelativeSteps => 'S',
            Self::Reset => 'C',
            Self::Query => 'Q',
            Self::KnobSteps => 'K',
        }
    }

    /// Inverse of [`prefix`](Self::prefix), case-insensitive.
    pub const fn from_prefix(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'D' => Some(Self::AbsoluteDegree),
            'S' => Some(Self::RelativeSteps),
            'C' => Some(Self::Reset),
            'Q' => Some(Self::Query),
            'K' => Some(Self::KnobSteps),
            _ => None,
        }
    }

    /// Returns true if this kind carries a numeric payload.
    #[inline]
    pub const fn has_payload(self) -> bool {
        !matches!(self, Self::Reset | Self::Query)
    }

    /// Returns true for the relative-step kinds (`S` and `K`).
    #[inline]
    pub const fn is_relative(self) -> bool {
        matches!(self, Self::RelativeSteps | Self::KnobSteps)
    }
}

/// A validated, normalized command ready for the outbound transport.
///
/// Construct through the associated functions; an `AbsoluteDegree`
/// envelope can only exist with a payload in `0..=360`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandEnvelope {
    kind: CommandKind,
    payload: Option<i32>,
}

impl CommandEnvelope {
    /// Absolute-degree move. Rejects payloads outside `0..=360`.
    pub fn absolute_degree(deg: i64) -> Result<Self, Rejection> {
        if !(ABSOLUTE_DEGREE_MIN..=ABSOLUTE_DEGREE_MAX).contains(&deg) {
            return Err(Rejection::OutOfRange(deg));
        }
        Ok(Self {
            kind: CommandKind::AbsoluteDegree,
            payload: Some(deg as i32),
        })
    }

    /// Relative move requested by an operator.
    pub const fn relative_steps(steps: i32) -> Self {
        Self {
            kind: CommandKind::RelativeSteps,
            payload: Some(steps),
        }
    }

    /// Relative move produced by the knob accumulator.
    pub const fn knob_steps(steps: i32) -> Self {
        Self {
            kind: CommandKind::KnobSteps,
            payload: Some(steps),
        }
    }

    /// Reset to zero.
    pub const fn reset() -> Self {
        Self {
            kind: CommandKind::Reset,
            payload: None,
        }
    }

    /// Position query.
    pub const fn query() -> Self {
        Self {
            kind: CommandKind::Query,
            payload: None,
        }
    }

    #[inline]
    pub const fn kind(&self) -> CommandKind {
        self.kind
    }

    #[inline]
    pub const fn payload(&self) -> Option<i32> {
        self.payload
    }

    /// Step count for `S`/`K` commands.
    #[inline]
    pub fn steps(&self) -> Option<i32> {
        if self.kind.is_relative() {
            self.payload
        } else {
            None
        }
    }

    /// Returns true if accepting this command moves the motor.
    #[inline]
    pub const fn is_motion(&self) -> bool {
        !matches!(self.kind, CommandKind::Query)
    }

    /// Newline-terminated wire form.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for CommandEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.prefix())?;
        if let Some(payload) = self.payload {
            write!(f, "{payload}")?;
        }
        Ok(())
    }
}
