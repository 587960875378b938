//! StepTrack Common Library
//!
//! Shared types for every StepTrack crate: the line protocol spoken with the
//! actuator controller, the tracker configuration and its loader, the
//! calibration data model, and the error types used at the boundaries.
//!
//! # Module Structure
//!
//! - [`protocol`] - Outbound command lines and inbound feedback lines
//! - [`config`] - Configuration loading traits and tracker configuration
//! - [`calibration`] - Raw-sensor ↔ bearing calibration record
//! - [`error`] - Boundary error types (rejections, spurious feedback)
//! - [`consts`] - Numeric limits and defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use steptrack_common::prelude::*;
//!
//! let reading: FeedbackReading = "S,1024,90.00".parse().unwrap();
//! assert_eq!(reading.label, FeedbackLabel::Steps);
//! ```

pub mod calibration;
pub mod config;
pub mod consts;
pub mod error;
pub mod prelude;
pub mod protocol;
