//! Tracker engine.
//!
//! Single owner of the axis store and the knob accumulator. Every
//! mutation goes through `&mut self`, so whoever holds the engine holds
//! the exclusive-access boundary; the runtime actor is that holder. The
//! engine performs no I/O: commands it accepts are returned to the caller
//! for transmission and calibration saves are handed out through
//! [`Tracker::take_record_to_save`].

use std::collections::VecDeque;

use steptrack_common::calibration::CalibrationRecord;
use steptrack_common::config::{ConfigError, EngineConfig, TrackerConfig};
use steptrack_common::error::Rejection;
use steptrack_common::protocol::{CommandEnvelope, FeedbackLabel, FeedbackReading};
use tracing::{debug, info, warn};

use crate::command::{self, CommandSource, parse_operator_input};
use crate::knob::{GainCurve, KnobAccumulator};
use crate::reconcile::{ReconcileReport, reconcile};
use crate::state::{AxisBearing, AxisStore};
use crate::telemetry::{MotionOrigin, TelemetryEvent};

/// Commands remembered while waiting for their echo.
const IN_FLIGHT_DEPTH: usize = 32;

/// Engine phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    /// Waiting for the first reading to carry `record` into the bearing.
    /// Only queries are accepted.
    Aligning(CalibrationRecord),
    Tracking,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    envelope: CommandEnvelope,
    origin: MotionOrigin,
}

/// Bearing reconciliation and command-dispatch engine.
#[derive(Debug)]
pub struct Tracker {
    engine: EngineConfig,
    store: AxisStore,
    knob: KnobAccumulator,
    phase: Phase,
    /// Last raw sensor count seen on any non-skip reading.
    last_raw: Option<i32>,
    /// True once a calibration record exists (loaded or seeded).
    seeded: bool,
    in_flight: VecDeque<InFlight>,
    save_due: Option<CalibrationRecord>,
    events: Vec<TelemetryEvent>,
}

impl Tracker {
    /// Build the engine.
    ///
    /// With a stored record every axis starts at the stored bearing and the
    /// engine waits in [`Phase::Aligning`] for the first reading. Without
    /// one the bearing starts at 0 and the first reading seeds a record.
    pub fn new(config: &TrackerConfig, record: Option<CalibrationRecord>) -> Result<Self, ConfigError> {
        config.validate()?;
        let initial = record.map_or(0.0, |r| r.bearing_at_that_raw);
        let phase = match record {
            Some(r) => Phase::Aligning(r),
            None => Phase::Tracking,
        };
        Ok(Self {
            engine: config.tracker.clone(),
            store: AxisStore::from_config(config, initial)?,
            knob: KnobAccumulator::new(GainCurve::from(&config.knob)),
            phase,
            last_raw: None,
            seeded: record.is_some(),
            in_flight: VecDeque::with_capacity(IN_FLIGHT_DEPTH),
            save_due: None,
            events: Vec::new(),
        })
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn is_aligned(&self) -> bool {
        matches!(self.phase, Phase::Tracking)
    }

    #[inline]
    pub fn store(&self) -> &AxisStore {
        &self.store
    }

    #[inline]
    pub fn knob(&self) -> &KnobAccumulator {
        &self.knob
    }

    #[inline]
    pub fn last_raw(&self) -> Option<i32> {
        self.last_raw
    }

    /// Rendered bearings, motor first.
    pub fn bearings(&self) -> Vec<AxisBearing> {
        self.store.bearings()
    }

    // ─── Command Path ───────────────────────────────────────────────

    /// Parse and accept one line of operator input.
    ///
    /// Returns `Ok(None)` for blank input. A rejected line never reaches
    /// the axis store.
    pub fn submit(
        &mut self,
        source: CommandSource,
        input: &str,
    ) -> Result<Option<CommandEnvelope>, Rejection> {
        match self.parse(source, input)? {
            Some(envelope) => self.accept(source, envelope).map(Some),
            None => Ok(None),
        }
    }

    /// Parse operator input without dispatching it. Rejections are recorded.
    pub fn parse(
        &mut self,
        source: CommandSource,
        input: &str,
    ) -> Result<Option<CommandEnvelope>, Rejection> {
        parse_operator_input(input).inspect_err(|reason| {
            self.reject(source, input.trim().to_string(), reason.clone());
        })
    }

    /// Accept an already-built command and apply it optimistically.
    pub fn accept(
        &mut self,
        source: CommandSource,
        envelope: CommandEnvelope,
    ) -> Result<CommandEnvelope, Rejection> {
        if !self.is_aligned() && envelope.is_motion() {
            self.reject(source, envelope.to_string(), Rejection::NotAligned);
            return Err(Rejection::NotAligned);
        }
        self.dispatch(source, envelope, MotionOrigin::Manual(envelope));
        Ok(envelope)
    }

    /// One jog-wheel report. A press resets before the delta is accumulated.
    pub fn knob_event(&mut self, delta: i32, pressed: bool) -> Option<CommandEnvelope> {
        let reset = if pressed {
            self.accept(CommandSource::Knob, CommandEnvelope::reset()).ok()
        } else {
            None
        };
        self.knob.accumulate(delta);
        reset
    }

    /// Periodic knob drain.
    ///
    /// When `can_send` is false, or while aligning, the tick is deferred:
    /// pending deltas and the remainder are kept for the next tick.
    pub fn tick(&mut self, can_send: bool) -> Option<CommandEnvelope> {
        if !can_send || !self.is_aligned() || self.knob.pending_delta() == 0 {
            return None;
        }
        let tick = self.knob.drain_pending()?;
        if tick.steps == 0 {
            debug!(raw_delta = tick.raw_delta, remainder = self.knob.remainder(), "Knob tick below one step");
            return None;
        }
        let envelope = CommandEnvelope::knob_steps(tick.steps);
        self.dispatch(CommandSource::Knob, envelope, MotionOrigin::Knob(tick));
        Some(envelope)
    }

    fn dispatch(&mut self, source: CommandSource, envelope: CommandEnvelope, origin: MotionOrigin) {
        command::apply(&mut self.store, &envelope, self.engine.steps_per_revolution);
        if self.in_flight.len() == IN_FLIGHT_DEPTH {
            self.in_flight.pop_front();
        }
        self.in_flight.push_back(InFlight { envelope, origin });
        debug!(%source, command = %envelope, "Command accepted");
        self.events.push(TelemetryEvent::CommandSent { source, envelope });
    }

    fn reject(&mut self, source: CommandSource, input: String, reason: Rejection) {
        warn!(%source, input = %input, "Command rejected: {}", reason);
        self.events.push(TelemetryEvent::Rejected {
            source,
            input,
            reason,
        });
    }

    // ─── Feedback Path ──────────────────────────────────────────────

    /// Reconcile one decoded feedback reading.
    pub fn ingest(&mut self, reading: FeedbackReading) {
        let matched = self.match_in_flight(reading.label);

        if reading.label.is_skip() {
            info!(label = %reading.label, "Actuator skipped command");
            self.events.push(TelemetryEvent::Skipped {
                reading,
                command: matched.map(|m| m.envelope),
            });
            return;
        }
        self.last_raw = Some(reading.raw_count);

        if let Phase::Aligning(record) = self.phase {
            self.align(record, reading);
            return;
        }

        let reference = if self.seeded {
            Some(self.store.motor().reference())
        } else {
            None
        };
        let reconciled = reconcile(reading.bearing_deg, reference);
        self.store.update_all(|axis| axis.settle(reconciled));

        if !self.seeded {
            self.seeded = true;
            let record = CalibrationRecord::new(reading.raw_count, reconciled);
            info!(raw = record.raw_sensor_value, bearing = reconciled, "Seeded calibration record");
            self.save_due = Some(record);
        }

        let report = ReconcileReport {
            reading,
            reference: reference.unwrap_or(reading.bearing_deg),
            reconciled,
        };
        debug!(
            label = %reading.label,
            raw = reading.raw_count,
            reconciled,
            correction = report.correction(),
            "Feedback reconciled"
        );
        self.events.push(TelemetryEvent::Reconciled {
            report,
            origin: matched.map_or(MotionOrigin::Sensor, |m| m.origin),
            axes: self.store.bearings(),
        });
    }

    fn align(&mut self, record: CalibrationRecord, reading: FeedbackReading) {
        let bearing = record.aligned_bearing(reading.raw_count, self.engine.raw_counts_per_revolution);
        self.store.update_all(|axis| axis.settle(bearing));
        self.phase = Phase::Tracking;
        self.in_flight.clear();
        self.save_due = Some(CalibrationRecord::new(reading.raw_count, bearing));
        info!(
            stored_raw = record.raw_sensor_value,
            stored_bearing = record.bearing_at_that_raw,
            raw = reading.raw_count,
            bearing,
            "Bearing aligned from calibration record"
        );
        self.events.push(TelemetryEvent::Aligned {
            record,
            reading,
            bearing,
            axes: self.store.bearings(),
        });
    }

    /// Oldest in-flight command this label answers, removed from the queue.
    fn match_in_flight(&mut self, label: FeedbackLabel) -> Option<InFlight> {
        if label == FeedbackLabel::Sensor {
            return None;
        }
        let idx = self.in_flight.iter().position(|f| {
            let kind = f.envelope.kind();
            FeedbackLabel::echo_of(kind) == label || FeedbackLabel::skip_of(kind) == Some(label)
        })?;
        self.in_flight.remove(idx)
    }

    // ─── Link Transitions ───────────────────────────────────────────

    /// The actuator link dropped.
    ///
    /// The in-memory bearing is kept and snapshotted as a calibration
    /// record; the engine realigns from it on the next reading.
    pub fn link_lost(&mut self, reason: &str) {
        warn!("Actuator link lost: {}", reason);
        self.in_flight.clear();
        if let (Phase::Tracking, Some(raw)) = (self.phase, self.last_raw) {
            let record = CalibrationRecord::new(raw, self.store.motor().absolute_bearing());
            self.store.update_all(|axis| axis.settle(record.bearing_at_that_raw));
            self.phase = Phase::Aligning(record);
        }
        self.events.push(TelemetryEvent::LinkDown {
            reason: reason.to_string(),
        });
    }

    /// A link is attached. Returns the query that starts (re)alignment.
    pub fn link_restored(&mut self) -> CommandEnvelope {
        info!("Actuator link up");
        self.events.push(TelemetryEvent::LinkUp);
        let query = CommandEnvelope::query();
        self.dispatch(CommandSource::Engine, query, MotionOrigin::Manual(query));
        query
    }

    // ─── Calibration ────────────────────────────────────────────────

    /// Record due for saving after an alignment or the first reconciliation.
    pub fn take_record_to_save(&mut self) -> Option<CalibrationRecord> {
        self.save_due.take()
    }

    /// Record to persist at shutdown.
    ///
    /// `None` when no raw count was ever observed and nothing was loaded.
    pub fn final_record(&self) -> Option<CalibrationRecord> {
        match self.phase {
            Phase::Aligning(record) => Some(record),
            Phase::Tracking => self
                .last_raw
                .map(|raw| CalibrationRecord::new(raw, self.store.motor().absolute_bearing())),
        }
    }

    /// Telemetry recorded since the last call.
    pub fn drain_events(&mut self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut self.events)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
