//! # StepTrack Tracker
//!
//! Bearing reconciliation and command-dispatch engine for a stepper-driven
//! antenna mount.
//!
//! # Module Structure
//!
//! - [`knob`] - Jog-wheel accumulator with non-linear gain
//! - [`command`] - Operator input parsing and optimistic dispatch
//! - [`state`] - Axis state store and gear projection
//! - [`reconcile`] - Sensor reading unwrapping
//! - [`calibration`] - Calibration stores (file, memory)
//! - [`tracker`] - Synchronous engine tying the above together
//! - [`runtime`] - Actor task, handle, knob timer
//! - [`link`] - Line link to one actuator stream
//! - [`drivers`] - Simulated and TCP actuator drivers
//! - [`sources`] - Console and remote command sources
//! - [`telemetry`] - Observer events
//!
//! # Architecture
//!
//! ```text
//!  knob ─┐                     ┌──────────── actor ─────────────┐
//!  console ─┼── TrackerHandle ──►│ Tracker (store, knob, phase)  │──► link ──► actuator
//!  remote ─┘                     │ tick timer, calibration store │◄── link ◄── feedback
//!                                └──────────────┬────────────────┘
//!                                               ▼
//!                                        telemetry (broadcast)
//! ```

pub mod calibration;
pub mod command;
pub mod drivers;
pub mod error;
pub mod knob;
pub mod link;
pub mod reconcile;
pub mod runtime;
pub mod sources;
pub mod state;
pub mod telemetry;
pub mod tracker;

pub use error::TrackerError;
pub use runtime::{TrackerHandle, spawn};
pub use tracker::Tracker;
