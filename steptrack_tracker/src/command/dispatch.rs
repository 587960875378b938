//! Optimistic axis-store update for an accepted command.

use steptrack_common::consts::FULL_TURN_DEG;
use steptrack_common::protocol::{CommandEnvelope, CommandKind};

use crate::state::AxisStore;

/// Motor-shaft rotation [deg] for a signed step count.
#[inline]
pub fn steps_to_degrees(steps: i32, steps_per_revolution: u32) -> f64 {
    f64::from(steps) * FULL_TURN_DEG / f64::from(steps_per_revolution.max(1))
}

/// Apply `envelope` to every axis ahead of hardware confirmation.
///
/// `Query` leaves the store untouched.
pub fn apply(store: &mut AxisStore, envelope: &CommandEnvelope, steps_per_revolution: u32) {
    match (envelope.kind(), envelope.payload()) {
        (CommandKind::AbsoluteDegree, Some(deg)) => {
            store.update_all(|axis| axis.command_absolute(f64::from(deg)));
        }
        (CommandKind::RelativeSteps | CommandKind::KnobSteps, Some(steps)) => {
            let delta = steps_to_degrees(steps, steps_per_revolution);
            store.update_all(|axis| axis.command_relative(delta, steps));
        }
        (CommandKind::Reset, _) => store.update_all(|axis| axis.command_reset()),
        _ => {}
    }
}
