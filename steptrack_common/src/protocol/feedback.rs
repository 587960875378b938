//! Inbound feedback line: `<label>,<raw_count>,<bearing_degrees>`.
//!
//! The label echoes the command that produced the reading (`K`, `S`, `D`,
//! `C`, `Q`), or `SENSOR` for unsolicited readings. `D-SKIP` and `S-SKIP`
//! mean the actuator refused the command and did not move.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::command::CommandKind;
use crate::consts::FULL_TURN_DEG;
use crate::error::FeedbackError;

/// Feedback line label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedbackLabel {
    Knob,
    Steps,
    Degree,
    Reset,
    Sensor,
    Query,
    DegreeSkip,
    StepsSkip,
}

impl FeedbackLabel {
    /// Wire spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Knob => "K",
            Self::Steps => "S",
            Self::Degree => "D",
            Self::Reset => "C",
            Self::Sensor => "SENSOR",
            Self::Query => "Q",
            Self::DegreeSkip => "D-SKIP",
            Self::StepsSkip => "S-SKIP",
        }
    }

    /// Returns true if the actuator rejected the command without moving.
    #[inline]
    pub const fn is_skip(self) -> bool {
        matches!(self, Self::DegreeSkip | Self::StepsSkip)
    }

    /// Label the actuator uses to acknowledge a completed command.
    pub const fn echo_of(kind: CommandKind) -> Self {
        match kind {
            CommandKind::AbsoluteDegree => Self::Degree,
            CommandKind::RelativeSteps => Self::Steps,
            CommandKind::Reset => Self::Reset,
            CommandKind::Query => Self::Query,
            CommandKind::KnobSteps => Self::Knob,
        }
    }

    /// Label the actuator uses to refuse a command, if it can refuse it.
    pub const fn skip_of(kind: CommandKind) -> Option<Self> {
        match kind {
            CommandKind::AbsoluteDegree => Some(Self::DegreeSkip),
            CommandKind::RelativeSteps | CommandKind::KnobSteps => Some(Self::StepsSkip),
            CommandKind::Reset | CommandKind::Query => None,
        }
    }
}

impl FromStr for FeedbackLabel {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "K" => Ok(Self::Knob),
            "S" => Ok(Self::Steps),
            "D" => Ok(Self::Degree),
            "C" => Ok(Self::Reset),
            "SENSOR" => Ok(Self::Sensor),
            "Q" => Ok(Self::Query),
            "D-SKIP" => Ok(Self::DegreeSkip),
            "S-SKIP" => Ok(Self::StepsSkip),
            other => Err(FeedbackError::InvalidLabel(other.to_string())),
        }
    }
}

impl fmt::Display for FeedbackLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a bearing to `[0, 360)`.
#[inline]
pub fn normalize_bearing(deg: f64) -> f64 {
    let n = deg.rem_euclid(FULL_TURN_DEG);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if n >= FULL_TURN_DEG { 0.0 } else { n }
}

/// One decoded feedback reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReading {
    pub label: FeedbackLabel,
    /// Raw angle-sensor count.
    pub raw_count: i32,
    /// Sensor bearing, normalized to `[0, 360)`.
    pub bearing_deg: f64,
}

impl FeedbackReading {
    pub fn new(label: FeedbackLabel, raw_count: i32, bearing_deg: f64) -> Self {
        Self {
            label,
            raw_count,
            bearing_deg: normalize_bearing(bearing_deg),
        }
    }

    /// Newline-terminated wire form.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl FromStr for FeedbackReading {
    type Err = FeedbackError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        let [label, raw, bearing] = fields.as_slice() else {
            return Err(FeedbackError::FieldCount(fields.len()));
        };

        let label: FeedbackLabel = label.parse()?;
        let raw_count: i32 = raw
            .parse()
            .map_err(|_| FeedbackError::InvalidNumber(raw.to_string()))?;
        let bearing_deg: f64 = bearing
            .parse()
            .map_err(|_| FeedbackError::InvalidNumber(bearing.to_string()))?;
        if !bearing_deg.is_finite() {
            return Err(FeedbackError::InvalidNumber(bearing.to_string()));
        }

        Ok(Self::new(label, raw_count, bearing_deg))
    }
}

impl fmt::Display for FeedbackReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{:.2}", self.label, self.raw_count, self.bearing_deg)
    }
}
