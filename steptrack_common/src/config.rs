//! Configuration loading traits and tracker configuration.
//!
//! Every StepTrack binary loads one TOML file through [`ConfigLoader`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use steptrack_common::config::{ConfigError, TrackerConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = TrackerConfig::load_validated(Path::new("steptrack.toml"))?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::consts::{
    DEFAULT_FAST_SCALE, DEFAULT_FAST_THRESHOLD, DEFAULT_OUTBOUND_QUEUE,
    DEFAULT_RAW_COUNTS_PER_REVOLUTION, DEFAULT_SERVICE_NAME, DEFAULT_SLOW_SCALE,
    DEFAULT_STEPS_PER_REVOLUTION, DEFAULT_TICK_INTERVAL_MS, MAX_AXES, TICK_INTERVAL_MS_MAX,
    TICK_INTERVAL_MS_MIN,
};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// `EnvFilter` directive spelling.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across StepTrack applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "steptrack-roof"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Tracker Config ─────────────────────────────────────────────────

/// Engine timing and unit conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Knob drain interval [ms] (default: 50).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Motor steps per motor-shaft revolution (default: 1600).
    #[serde(default = "default_steps_per_revolution")]
    pub steps_per_revolution: u32,

    /// Raw angle-sensor counts per revolution (default: 4096).
    #[serde(default = "default_raw_counts_per_revolution")]
    pub raw_counts_per_revolution: u32,

    /// Calibration file. In-memory only when absent.
    #[serde(default)]
    pub calibration_path: Option<PathBuf>,

    /// Outbound command queue capacity (default: 32).
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}
fn default_steps_per_revolution() -> u32 {
    DEFAULT_STEPS_PER_REVOLUTION
}
fn default_raw_counts_per_revolution() -> u32 {
    DEFAULT_RAW_COUNTS_PER_REVOLUTION
}
fn default_outbound_queue() -> usize {
    DEFAULT_OUTBOUND_QUEUE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            steps_per_revolution: DEFAULT_STEPS_PER_REVOLUTION,
            raw_counts_per_revolution: DEFAULT_RAW_COUNTS_PER_REVOLUTION,
            calibration_path: None,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

impl EngineConfig {
    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(TICK_INTERVAL_MS_MIN..=TICK_INTERVAL_MS_MAX).contains(&self.tick_interval_ms) {
            return Err(ConfigError::ValidationError(format!(
                "tick_interval_ms {} out of range [{}, {}]",
                self.tick_interval_ms, TICK_INTERVAL_MS_MIN, TICK_INTERVAL_MS_MAX
            )));
        }
        if self.steps_per_revolution == 0 {
            return Err(ConfigError::ValidationError(
                "steps_per_revolution must be > 0".to_string(),
            ));
        }
        if self.raw_counts_per_revolution == 0 {
            return Err(ConfigError::ValidationError(
                "raw_counts_per_revolution must be > 0".to_string(),
            ));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::ValidationError(
                "outbound_queue must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Non-linear jog-wheel gain.
///
/// A tick whose summed raw delta has magnitude `<= fast_threshold` is scaled
/// by `slow_scale`, anything larger by `fast_scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KnobGainConfig {
    #[serde(default = "default_fast_threshold")]
    pub fast_threshold: u32,
    #[serde(default = "default_slow_scale")]
    pub slow_scale: f64,
    #[serde(default = "default_fast_scale")]
    pub fast_scale: f64,
}

fn default_fast_threshold() -> u32 {
    DEFAULT_FAST_THRESHOLD
}
fn default_slow_scale() -> f64 {
    DEFAULT_SLOW_SCALE
}
fn default_fast_scale() -> f64 {
    DEFAULT_FAST_SCALE
}

impl Default for KnobGainConfig {
    fn default() -> Self {
        Self {
            fast_threshold: DEFAULT_FAST_THRESHOLD,
            slow_scale: DEFAULT_SLOW_SCALE,
            fast_scale: DEFAULT_FAST_SCALE,
        }
    }
}

impl KnobGainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("slow_scale", self.slow_scale), ("fast_scale", self.fast_scale)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "knob.{name} must be a positive finite number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// One axis. The first configured axis is the motor axis; every other axis
/// is driven through a gear pair by an earlier-resolvable axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxisConfig {
    pub name: String,
    /// Name of the axis driving this one.
    #[serde(default)]
    pub driven_by: Option<String>,
    /// Teeth on the driving gear.
    #[serde(default)]
    pub driving_teeth: Option<u32>,
    /// Teeth on this axis's gear.
    #[serde(default)]
    pub driven_teeth: Option<u32>,
}

impl AxisConfig {
    /// Motor (driving) axis.
    pub fn motor(name: &str) -> Self {
        Self {
            name: name.to_string(),
            driven_by: None,
            driving_teeth: None,
            driven_teeth: None,
        }
    }

    /// Axis driven by `driver` through a `driving_teeth : driven_teeth` pair.
    pub fn geared(name: &str, driver: &str, driving_teeth: u32, driven_teeth: u32) -> Self {
        Self {
            name: name.to_string(),
            driven_by: Some(driver.to_string()),
            driving_teeth: Some(driving_teeth),
            driven_teeth: Some(driven_teeth),
        }
    }

    /// Gear ratio to the driving axis (`driving_teeth / driven_teeth`).
    pub fn gear_ratio(&self) -> Option<f64> {
        match (self.driving_teeth, self.driven_teeth) {
            (Some(a), Some(b)) if a > 0 && b > 0 => Some(f64::from(a) / f64::from(b)),
            _ => None,
        }
    }
}

/// Complete tracker configuration file.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "steptrack"
///
/// [tracker]
/// tick_interval_ms = 50
/// steps_per_revolution = 1600
///
/// [knob]
/// fast_threshold = 3
///
/// [[axes]]
/// name = "motor"
///
/// [[axes]]
/// name = "dish"
/// driven_by = "motor"
/// driving_teeth = 76
/// driven_teeth = 228
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    #[serde(default)]
    pub shared: SharedConfig,
    #[serde(default)]
    pub tracker: EngineConfig,
    #[serde(default)]
    pub knob: KnobGainConfig,
    pub axes: Vec<AxisConfig>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig::default(),
            tracker: EngineConfig::default(),
            knob: KnobGainConfig::default(),
            axes: vec![
                AxisConfig::motor("motor"),
                AxisConfig::geared("dish", "motor", 76, 228),
            ],
        }
    }
}

impl TrackerConfig {
    /// Load from TOML and validate.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        debug!(
            "Loaded tracker config from {:?} ({} axes)",
            path,
            config.axes.len()
        );
        Ok(config)
    }

    /// Validate every section and the axis gear graph.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.tracker.validate()?;
        self.knob.validate()?;
        self.resolved_ratios().map(|_| ())
    }

    /// Cumulative gear ratio from the motor axis to every axis, in config order.
    ///
    /// The motor axis has ratio `1.0`. Chains (`a` drives `b` drives `c`)
    /// multiply. Fails on unknown drivers, missing teeth, duplicate names
    /// and cycles.
    pub fn resolved_ratios(&self) -> Result<Vec<f64>, ConfigError> {
        let invalid = |msg: String| -> Result<Vec<f64>, ConfigError> {
            Err(ConfigError::ValidationError(msg))
        };

        let Some(motor) = self.axes.first() else {
            return invalid("at least one axis is required".to_string());
        };
        if self.axes.len() > MAX_AXES {
            return invalid(format!(
                "{} axes configured, at most {} supported",
                self.axes.len(),
                MAX_AXES
            ));
        }
        if motor.driven_by.is_some() {
            return invalid(format!("motor axis '{}' cannot be driven_by another axis", motor.name));
        }

        for (i, axis) in self.axes.iter().enumerate() {
            if axis.name.is_empty() {
                return invalid(format!("axis #{i} has an empty name"));
            }
            if self.axes[..i].iter().any(|other| other.name == axis.name) {
                return invalid(format!("duplicate axis name '{}'", axis.name));
            }
            if i > 0 {
                let Some(driver) = axis.driven_by.as_deref() else {
                    return invalid(format!("axis '{}' must name driven_by", axis.name));
                };
                if !self.axes.iter().any(|a| a.name == driver) {
                    return invalid(format!(
                        "axis '{}' is driven_by unknown axis '{}'",
                        axis.name, driver
                    ));
                }
                if axis.gear_ratio().is_none() {
                    return invalid(format!(
                        "axis '{}' needs driving_teeth and driven_teeth > 0",
                        axis.name
                    ));
                }
            }
        }

        let mut ratios = Vec::with_capacity(self.axes.len());
        for axis in &self.axes {
            let mut ratio = 1.0;
            let mut current = axis;
            let mut hops = 0;
            while let Some(driver) = current.driven_by.as_deref() {
                hops += 1;
                if hops > self.axes.len() {
                    return invalid(format!("gear chain through '{}' is cyclic", axis.name));
                }
                ratio *= current.gear_ratio().unwrap_or(1.0);
                match self.axes.iter().find(|a| a.name == driver) {
                    Some(next) => current = next,
                    None => return invalid(format!("unknown driver '{driver}'")),
                }
            }
            ratios.push(ratio);
        }
        Ok(ratios)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"").unwrap().level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"error\"").unwrap().level,
            LogLevel::Error
        );
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = TrackerConfig::load(Path::new("/nonexistent/path/steptrack.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = TrackerConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn default_config_is_valid() {
        let config = TrackerConfig::default();
        config.validate().unwrap();
        let ratios = config.resolved_ratios().unwrap();
        assert_eq!(ratios[0], 1.0);
        assert!((ratios[1] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn tick_interval_bounds() {
        let mut config = TrackerConfig::default();
        config.tracker.tick_interval_ms = 1;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
        config.tracker.tick_interval_ms = 1000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn knob_scales_must_be_positive() {
        let mut config = TrackerConfig::default();
        config.knob.fast_scale = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn chained_gears_multiply() {
        let config = TrackerConfig {
            axes: vec![
                AxisConfig::motor("motor"),
                AxisConfig::geared("stage", "motor", 20, 40),
                AxisConfig::geared("dish", "stage", 10, 30),
            ],
            ..Default::default()
        };
        let ratios = config.resolved_ratios().unwrap();
        assert!((ratios[2] - (0.5 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn cyclic_gears_rejected() {
        let config = TrackerConfig {
            axes: vec![
                AxisConfig::motor("motor"),
                AxisConfig::geared("a", "b", 1, 1),
                AxisConfig::geared("b", "a", 1, 1),
            ],
            ..Default::default()
        };
        let err = config.resolved_ratios().unwrap_err();
        assert!(err.to_string().contains("cyclic"));
    }

    #[test]
    fn geared_motor_rejected() {
        let config = TrackerConfig {
            axes: vec![AxisConfig::geared("motor", "dish", 1, 1), AxisConfig::motor("dish")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
