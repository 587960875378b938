//! Boundary error types.
//!
//! These errors are produced while parsing operator input or actuator
//! feedback. They are handled where they occur and never reach the axis
//! state store.

use thiserror::Error;

/// Reason an operator command was refused before dispatch.
///
/// A rejected command is never forwarded to the actuator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Absolute-degree payload outside `0..=360`.
    #[error("out of range: {0} (expected 0..=360)")]
    OutOfRange(i64),

    /// Payload missing, non-numeric, or attached to a kind that takes none.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Motion refused until the first feedback reading aligns the bearing.
    #[error("not aligned: waiting for the first feedback reading")]
    NotAligned,
}

/// A feedback line that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedbackError {
    /// Wrong number of comma-separated fields.
    #[error("expected 3 fields, got {0}")]
    FieldCount(usize),

    /// Unknown label.
    #[error("unknown label '{0}'")]
    InvalidLabel(String),

    /// Raw count or bearing is not a finite number.
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
}
