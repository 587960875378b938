//! Engine-level error type.

use steptrack_common::config::ConfigError;
use steptrack_common::error::{FeedbackError, Rejection};
use thiserror::Error;

use crate::calibration::CalibrationError;

/// Errors surfaced by the tracker engine and runtime.
#[derive(Debug, Clone, Error)]
pub enum TrackerError {
    /// Operator command refused before dispatch.
    #[error("Invalid command: {0}")]
    InvalidCommand(#[from] Rejection),

    /// Feedback line discarded.
    #[error("Spurious feedback: {0}")]
    SpuriousFeedback(#[from] FeedbackError),

    /// Actuator link is down.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Calibration store failure
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The runtime has stopped and no longer accepts requests.
    #[error("Tracker is shut down")]
    ShutDown,
}

impl TrackerError {
    /// Returns true if the error leaves axis state untouched and the caller may retry.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ShutDown | Self::Config(_))
    }
}
