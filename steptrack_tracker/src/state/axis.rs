//! Per-axis bearing state and the axis store.
//!
//! Every axis record holds motor-frame values: the unwrapped bearing the
//! motor shaft has reached. Dependent axes carry the same values and are
//! rendered through their cumulative gear coupling on read.

use heapless::Vec as HVec;
use steptrack_common::config::{ConfigError, TrackerConfig};
use steptrack_common::consts::MAX_AXES;

use super::gear::GearCoupling;
use crate::reconcile::{normalize_bearing, reconcile};

/// Polarity of an in-progress relative move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i8)]
pub enum Direction {
    Reverse = -1,
    /// Not in a directed move.
    #[default]
    Idle = 0,
    Forward = 1,
}

impl Direction {
    /// Direction of a signed step count.
    pub const fn of_steps(steps: i32) -> Self {
        if steps > 0 {
            Self::Forward
        } else if steps < 0 {
            Self::Reverse
        } else {
            Self::Idle
        }
    }

    /// Direction of a signed angular delta.
    pub fn of_delta(delta_deg: f64) -> Self {
        if delta_deg > 0.0 {
            Self::Forward
        } else if delta_deg < 0.0 {
            Self::Reverse
        } else {
            Self::Idle
        }
    }

    #[inline]
    pub const fn as_i8(self) -> i8 {
        self as i8
    }
}

/// Unwrapped bearing record for one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisState {
    /// Unwrapped bearing [deg]. May be negative or exceed 360.
    absolute_bearing: f64,
    /// Pending destination, also unwrapped.
    target_bearing: Option<f64>,
    direction: Direction,
    /// Set when a motion command is issued, cleared by reconciliation.
    awaiting_feedback: bool,
}

impl AxisState {
    pub const fn new(absolute_bearing: f64) -> Self {
        Self {
            absolute_bearing,
            target_bearing: None,
            direction: Direction::Idle,
            awaiting_feedback: false,
        }
    }

    #[inline]
    pub const fn absolute_bearing(&self) -> f64 {
        self.absolute_bearing
    }

    #[inline]
    pub const fn target_bearing(&self) -> Option<f64> {
        self.target_bearing
    }

    #[inline]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub const fn awaiting_feedback(&self) -> bool {
        self.awaiting_feedback
    }

    /// Displayable bearing in `[0, 360)`.
    #[inline]
    pub fn display_bearing(&self) -> f64 {
        normalize_bearing(self.absolute_bearing)
    }

    /// Reference used to unwrap the next feedback reading.
    ///
    /// The pending target if there is one, the current bearing otherwise.
    #[inline]
    pub fn reference(&self) -> f64 {
        self.target_bearing.unwrap_or(self.absolute_bearing)
    }

    /// Optimistic update for an absolute-degree move.
    ///
    /// The target is the branch of `deg` nearest the current bearing. The
    /// actuator approaches it proportionally, so no direction is locked.
    pub fn command_absolute(&mut self, deg: f64) {
        self.target_bearing = Some(reconcile(deg, Some(self.absolute_bearing)));
        self.direction = Direction::Idle;
        self.awaiting_feedback = false;
    }

    /// Optimistic update for a relative move of `delta_deg`.
    pub fn command_relative(&mut self, delta_deg: f64, steps: i32) {
        self.target_bearing = Some(self.absolute_bearing + delta_deg);
        self.direction = Direction::of_steps(steps);
        self.awaiting_feedback = true;
    }

    /// Optimistic update for a reset: unwind to zero.
    pub fn command_reset(&mut self) {
        self.target_bearing = Some(0.0);
        self.direction = Direction::of_delta(-self.absolute_bearing);
        self.awaiting_feedback = true;
    }

    /// Authoritative correction from a reconciled reading.
    pub fn settle(&mut self, reconciled: f64) {
        self.absolute_bearing = reconciled;
        self.target_bearing = Some(reconciled);
        self.direction = Direction::Idle;
        self.awaiting_feedback = false;
    }
}

impl Default for AxisState {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// One configured axis.
#[derive(Debug, Clone)]
pub struct AxisEntry {
    pub name: String,
    /// Cumulative coupling from the motor shaft.
    pub coupling: GearCoupling,
    pub state: AxisState,
}

/// Rendered bearing of one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisBearing {
    pub name: String,
    /// Unwrapped bearing in this axis's own frame.
    pub absolute: f64,
    /// Bearing in `[0, 360)`, projected from the motor's unwrapped bearing.
    pub display: f64,
}

/// Axis store.
///
/// The first entry is always the motor axis (ratio 1).
#[derive(Debug, Clone)]
pub struct AxisStore {
    axes: HVec<AxisEntry, MAX_AXES>,
}

impl AxisStore {
    /// Build the store from the configured axes, every axis at `initial_bearing`.
    pub fn from_config(config: &TrackerConfig, initial_bearing: f64) -> Result<Self, ConfigError> {
        let ratios = config.resolved_ratios()?;
        let mut axes = HVec::new();
        for (axis, ratio) in config.axes.iter().zip(ratios) {
            let entry = AxisEntry {
                name: axis.name.clone(),
                coupling: GearCoupling::new(ratio),
                state: AxisState::new(initial_bearing),
            };
            if axes.push(entry).is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "at most {MAX_AXES} axes supported"
                )));
            }
        }
        Ok(Self { axes })
    }

    /// Number of axes (motor included).
    #[inline]
    pub fn len(&self) -> usize {
        self.axes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Motor axis state.
    pub fn motor(&self) -> AxisState {
        self.axes.first().map(|a| a.state).unwrap_or_default()
    }

    /// Axis entry by name.
    pub fn get(&self, name: &str) -> Option<&AxisEntry> {
        self.axes.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AxisEntry> {
        self.axes.iter()
    }

    /// Apply the same mutation to every axis.
    ///
    /// Dependent axes are mechanically slaved to the motor, so a motor
    /// update is always an update of the whole train.
    pub fn update_all(&mut self, mut f: impl FnMut(&mut AxisState)) {
        for entry in self.axes.iter_mut() {
            f(&mut entry.state);
        }
    }

    /// Rendered bearings for every axis, motor first.
    pub fn bearings(&self) -> Vec<AxisBearing> {
        self.axes
            .iter()
            .map(|entry| AxisBearing {
                name: entry.name.clone(),
                absolute: entry.state.absolute_bearing() * entry.coupling.ratio(),
                display: entry.coupling.project(entry.state.absolute_bearing()),
            })
            .collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AxisStore {
        AxisStore::from_config(&TrackerConfig::default(), 0.0).unwrap()
    }

    #[test]
    fn direction_from_sign() {
        assert_eq!(Direction::of_steps(5), Direction::Forward);
        assert_eq!(Direction::of_steps(-5), Direction::Reverse);
        assert_eq!(Direction::of_steps(0), Direction::Idle);
        assert_eq!(Direction::Reverse.as_i8(), -1);
    }

    #[test]
    fn absolute_command_targets_nearest_branch() {
        let mut axis = AxisState::new(355.0);
        axis.command_absolute(10.0);
        assert_eq!(axis.target_bearing(), Some(370.0));
        assert_eq!(axis.direction(), Direction::Idle);
        assert!(!axis.awaiting_feedback());
        // The bearing itself waits for feedback.
        assert_eq!(axis.absolute_bearing(), 355.0);
    }

    #[test]
    fn relative_command_locks_direction() {
        let mut axis = AxisState::new(90.0);
        axis.command_relative(-45.0, -200);
        assert_eq!(axis.target_bearing(), Some(45.0));
        assert_eq!(axis.direction(), Direction::Reverse);
        assert!(axis.awaiting_feedback());
        assert_eq!(axis.reference(), 45.0);
    }

    #[test]
    fn reset_unwinds_to_zero() {
        let mut axis = AxisState::new(725.0);
        axis.command_reset();
        assert_eq!(axis.target_bearing(), Some(0.0));
        assert_eq!(axis.direction(), Direction::Reverse);
        assert!(axis.awaiting_feedback());
    }

    #[test]
    fn settle_clears_motion() {
        let mut axis = AxisState::new(0.0);
        axis.command_relative(90.0, 400);
        axis.settle(89.5);
        assert_eq!(axis.absolute_bearing(), 89.5);
        assert_eq!(axis.target_bearing(), Some(89.5));
        assert_eq!(axis.direction(), Direction::Idle);
        assert!(!axis.awaiting_feedback());
    }

    #[test]
    fn display_is_modulo_of_unwrapped() {
        assert_eq!(AxisState::new(370.0).display_bearing(), 10.0);
        assert_eq!(AxisState::new(-10.0).display_bearing(), 350.0);
    }

    #[test]
    fn store_mirrors_motor_updates() {
        let mut store = store();
        assert_eq!(store.len(), 2);
        store.update_all(|s| s.settle(300.0));
        let bearings = store.bearings();
        assert_eq!(bearings[0].name, "motor");
        assert_eq!(bearings[0].display, 300.0);
        assert_eq!(bearings[1].name, "dish");
        assert!((bearings[1].display - 100.0).abs() < 1e-9);
        assert!((bearings[1].absolute - 100.0).abs() < 1e-9);
    }

    #[test]
    fn store_lookup_by_name() {
        let store = store();
        assert!(store.get("dish").is_some());
        assert!(store.get("mast").is_none());
        assert_eq!(store.motor().absolute_bearing(), 0.0);
    }
}
