//! Prelude module for common re-exports.
//!
//! ```rust
//! use steptrack_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    AxisConfig, ConfigError, ConfigLoader, EngineConfig, KnobGainConfig, SharedConfig,
    TrackerConfig,
};

// ─── Protocol ───────────────────────────────────────────────────────
pub use crate::protocol::{CommandEnvelope, CommandKind, FeedbackLabel, FeedbackReading};

// ─── Calibration ────────────────────────────────────────────────────
pub use crate::calibration::CalibrationRecord;

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{FeedbackError, Rejection};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{FULL_TURN_DEG, MAX_AXES};

/// Default knob drain interval as Duration.
pub const DEFAULT_TICK_INTERVAL: Duration =
    Duration::from_millis(crate::consts::DEFAULT_TICK_INTERVAL_MS);
