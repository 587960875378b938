//! Feedback reconciler.
//!
//! The angle sensor reports a value in `[0, 360)`. The tracker keeps an
//! unwrapped bearing, so every reading is lifted onto the branch nearest a
//! reference bearing before it is stored.

use steptrack_common::consts::FULL_TURN_DEG;
use steptrack_common::protocol::FeedbackReading;

pub use steptrack_common::protocol::normalize_bearing;

/// Unwrapped bearing congruent to `feedback_deg` and nearest `reference_abs`.
///
/// With no reference the reading is returned unchanged.
#[inline]
pub fn reconcile(feedback_deg: f64, reference_abs: Option<f64>) -> f64 {
    match reference_abs {
        None => feedback_deg,
        Some(reference) => {
            let k = ((reference - feedback_deg) / FULL_TURN_DEG).round();
            feedback_deg + FULL_TURN_DEG * k
        }
    }
}

/// Outcome of reconciling one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileReport {
    pub reading: FeedbackReading,
    /// Reference the reading was unwrapped against.
    pub reference: f64,
    /// Unwrapped bearing now stored on every axis.
    pub reconciled: f64,
}

impl ReconcileReport {
    /// Bearing change [deg] versus the reference.
    #[inline]
    pub fn correction(&self) -> f64 {
        self.reconciled - self.reference
    }
}
