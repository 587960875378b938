//! Operator input normalization.
//!
//! | Input        | Result                  |
//! |--------------|-------------------------|
//! | `D<int>`     | `AbsoluteDegree`        |
//! | `S<int>`     | `RelativeSteps`         |
//! | `C`          | `Reset`                 |
//! | `Q`          | `Query`                 |
//! | `<int>`      | `RelativeSteps`         |
//!
//! Prefixes are case-insensitive and surrounding whitespace is ignored.

use steptrack_common::error::Rejection;
use steptrack_common::protocol::{CommandEnvelope, CommandKind};

/// Parse one line of operator input.
///
/// Returns `Ok(None)` for blank input.
pub fn parse_operator_input(input: &str) -> Result<Option<CommandEnvelope>, Rejection> {
    let input = input.trim();
    let Some(first) = input.chars().next() else {
        return Ok(None);
    };
    let rest = input[first.len_utf8()..].trim();
    let invalid = || Rejection::InvalidFormat(input.to_string());

    let envelope = match CommandKind::from_prefix(first) {
        Some(CommandKind::AbsoluteDegree) => {
            let deg: i64 = rest.parse().map_err(|_| invalid())?;
            CommandEnvelope::absolute_degree(deg)?
        }
        Some(CommandKind::RelativeSteps) => {
            CommandEnvelope::relative_steps(rest.parse().map_err(|_| invalid())?)
        }
        Some(CommandKind::Reset) if rest.is_empty() => CommandEnvelope::reset(),
        Some(CommandKind::Query) if rest.is_empty() => CommandEnvelope::query(),
        Some(CommandKind::Reset | CommandKind::Query) => return Err(invalid()),
        // `K` is reserved for the jog wheel; operators fall through to a bare step count.
        Some(CommandKind::KnobSteps) | None => {
            CommandEnvelope::relative_steps(input.parse().map_err(|_| invalid())?)
        }
    };
    Ok(Some(envelope))
}
