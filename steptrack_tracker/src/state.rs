//! Axis state store root.
//!
//! Per-axis unwrapped bearing records and the gear projection used to
//! render dependent axes.

pub mod axis;
pub mod gear;

pub use axis::{AxisBearing, AxisEntry, AxisState, AxisStore, Direction};
pub use gear::{GearCoupling, project};
