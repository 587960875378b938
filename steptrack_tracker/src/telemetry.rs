//! Observer surface.
//!
//! The engine records one [`TelemetryEvent`] per outbound command,
//! reconciliation, skip, rejection and link transition. The runtime fans
//! them out on a broadcast channel; the remote source forwards the
//! rendered lines to its clients.

use std::fmt::Write as _;

use steptrack_common::calibration::CalibrationRecord;
use steptrack_common::error::Rejection;
use steptrack_common::protocol::{CommandEnvelope, FeedbackReading};

use crate::command::CommandSource;
use crate::knob::KnobTick;
use crate::reconcile::ReconcileReport;
use crate::state::AxisBearing;

/// What caused the motion a reading confirms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionOrigin {
    /// Accumulated jog-wheel tick.
    Knob(KnobTick),
    /// Operator or engine command.
    Manual(CommandEnvelope),
    /// Unsolicited sensor reading, or an echo with no matching command.
    Sensor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    CommandSent {
        source: CommandSource,
        envelope: CommandEnvelope,
    },
    Rejected {
        source: CommandSource,
        input: String,
        reason: Rejection,
    },
    Reconciled {
        report: ReconcileReport,
        origin: MotionOrigin,
        axes: Vec<AxisBearing>,
    },
    /// The actuator refused a command without moving.
    Skipped {
        reading: FeedbackReading,
        command: Option<CommandEnvelope>,
    },
    /// First reading after startup or link loss re-aligned the bearing.
    Aligned {
        record: CalibrationRecord,
        reading: FeedbackReading,
        bearing: f64,
        axes: Vec<AxisBearing>,
    },
    LinkUp,
    LinkDown {
        reason: String,
    },
}

impl TelemetryEvent {
    /// Single-line operator rendering.
    pub fn to_line(&self) -> String {
        match self {
            Self::CommandSent { source, envelope } => format!("> {envelope} ({source})"),
            Self::Rejected {
                source,
                input,
                reason,
            } => format!("[Rejected] {input} ({source}) | {reason}"),
            Self::Reconciled {
                report,
                origin,
                axes,
            } => {
                let raw = report.reading.raw_count;
                let bearing = report.reading.bearing_deg;
                let mut line = match origin {
                    MotionOrigin::Knob(tick) => format!(
                        "Knob {} | Scale {} | Move {} | Raw {} | Bearing {:.2}",
                        tick.raw_delta, tick.scale, tick.steps, raw, bearing
                    ),
                    MotionOrigin::Manual(envelope) => format!(
                        "[Manual] {} | Scale 0 | Move {} | Raw {} | Bearing {:.2}",
                        envelope,
                        envelope.payload().unwrap_or(0),
                        raw,
                        bearing
                    ),
                    MotionOrigin::Sensor => format!(
                        "[Manual] {} | Scale 0 | Move 0 | Raw {} | Bearing {:.2}",
                        report.reading.label, raw, bearing
                    ),
                };
                push_axes(&mut line, axes);
                line
            }
            Self::Skipped { reading, command } => match command {
                Some(envelope) => format!(
                    "[Skipped] {} -> {} | Raw {} | Bearing {:.2}",
                    envelope, reading.label, reading.raw_count, reading.bearing_deg
                ),
                None => format!(
                    "[Skipped] {} | Raw {} | Bearing {:.2}",
                    reading.label, reading.raw_count, reading.bearing_deg
                ),
            },
            Self::Aligned {
                record,
                reading,
                bearing,
                axes,
            } => {
                let mut line = format!(
                    "[Aligned] Raw {} | Stored {} @ {:.2} | Bearing {:.2}",
                    reading.raw_count, record.raw_sensor_value, record.bearing_at_that_raw, bearing
                );
                push_axes(&mut line, axes);
                line
            }
            Self::LinkUp => "[Link] up".to_string(),
            Self::LinkDown { reason } => format!("[Link] down: {reason}"),
        }
    }
}

/// Append ` | <axis> <deg>` for every projected (non-motor) axis.
fn push_axes(line: &mut String, axes: &[AxisBearing]) {
    for axis in axes.iter().skip(1) {
        let _ = write!(line, " | {} {:.2}", axis.name, axis.display);
    }
}
