//! Line protocol spoken with the actuator controller.
//!
//! One newline-terminated ASCII line per message in each direction:
//! commands go out as `<prefix><payload>`, feedback comes back as
//! `<label>,<raw_count>,<bearing_degrees>`.

pub mod command;
pub mod feedback;

pub use command::{CommandEnvelope, CommandKind};
pub use feedback::{FeedbackLabel, FeedbackReading, normalize_bearing};
