//! System-wide constants for the StepTrack workspace.
//!
//! Single source of truth for numeric limits and defaults.

/// Maximum number of axes (motor axis plus gear-driven axes).
pub const MAX_AXES: usize = 8;

/// Default knob drain interval in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// Minimum knob drain interval in milliseconds.
pub const TICK_INTERVAL_MS_MIN: u64 = 5;

/// Maximum knob drain interval in milliseconds.
pub const TICK_INTERVAL_MS_MAX: u64 = 1000;

/// Default motor steps for one full revolution of the motor shaft.
pub const DEFAULT_STEPS_PER_REVOLUTION: u32 = 1600;

/// Default raw angle-sensor counts for one revolution (12-bit magnetic encoder).
pub const DEFAULT_RAW_COUNTS_PER_REVOLUTION: u32 = 4096;

/// Lowest accepted absolute-degree payload.
pub const ABSOLUTE_DEGREE_MIN: i64 = 0;

/// Highest accepted absolute-degree payload (inclusive).
pub const ABSOLUTE_DEGREE_MAX: i64 = 360;

/// Knob tick totals up to this magnitude use the slow scale.
pub const DEFAULT_FAST_THRESHOLD: u32 = 3;

/// Gain applied to slow knob motion.
pub const DEFAULT_SLOW_SCALE: f64 = 1.0;

/// Gain applied to fast knob motion.
pub const DEFAULT_FAST_SCALE: f64 = 2.0;

/// Default capacity of the outbound command queue.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 32;

/// Default service name.
pub const DEFAULT_SERVICE_NAME: &str = "steptrack";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/steptrack/steptrack.toml";

/// Degrees in one revolution.
pub const FULL_TURN_DEG: f64 = 360.0;
