//! Integration test: engine scenarios without I/O.
//!
//! Knob gain, rejection, wrap continuity, gear projection and first-run
//! calibration, each driven through the public `Tracker` API.

use steptrack_common::calibration::CalibrationRecord;
use steptrack_common::config::{AxisConfig, TrackerConfig};
use steptrack_common::error::Rejection;
use steptrack_common::protocol::{CommandEnvelope, FeedbackLabel, FeedbackReading};

use steptrack_tracker::command::CommandSource;
use steptrack_tracker::reconcile::{normalize_bearing, reconcile};
use steptrack_tracker::state::project;
use steptrack_tracker::telemetry::TelemetryEvent;
use steptrack_tracker::tracker::Tracker;

// ── Helpers ─────────────────────────────────────────────────────────

fn aligned_tracker_at(deg: f64) -> Tracker {
    let mut t = Tracker::new(&TrackerConfig::default(), None).unwrap();
    t.ingest(FeedbackReading::new(FeedbackLabel::Sensor, 0, deg));
    t.take_record_to_save();
    t.drain_events();
    t
}

fn sent(events: &[TelemetryEvent]) -> Vec<CommandEnvelope> {
    events
        .iter()
        .filter_map(|e| match e {
            TelemetryEvent::CommandSent { envelope, .. } => Some(*envelope),
            _ => None,
        })
        .collect()
}

// ── Scenarios ───────────────────────────────────────────────────────

#[test]
fn knob_burst_is_scaled_by_tick_total() {
    let mut t = aligned_tracker_at(0.0);
    for delta in [2, 2, 5] {
        t.knob_event(delta, false);
    }
    assert_eq!(t.tick(true), Some(CommandEnvelope::knob_steps(18)));
    assert_eq!(t.knob().remainder(), 0.0);
    assert_eq!(t.knob().pending_delta(), 0);
    assert_eq!(sent(&t.drain_events()), vec![CommandEnvelope::knob_steps(18)]);
}

#[test]
fn out_of_range_degree_never_dispatches() {
    let mut t = aligned_tracker_at(42.0);
    let before = t.store().motor();
    assert_eq!(
        t.submit(CommandSource::Console, "D400"),
        Err(Rejection::OutOfRange(400))
    );
    assert_eq!(t.store().motor(), before);
    assert!(sent(&t.drain_events()).is_empty());
}

#[test]
fn feedback_past_north_stays_continuous() {
    assert_eq!(reconcile(10.0, Some(355.0)), 370.0);

    let mut t = aligned_tracker_at(355.0);
    t.submit(CommandSource::Console, "D10").unwrap();
    assert_eq!(t.store().motor().target_bearing(), Some(370.0));
    t.ingest(FeedbackReading::new(FeedbackLabel::Degree, 114, 10.0));
    assert_eq!(t.store().motor().absolute_bearing(), 370.0);
    assert_eq!(t.store().motor().display_bearing(), 10.0);
}

#[test]
fn dish_follows_motor_through_gear() {
    let projected = project(300.0, 76.0 / 228.0);
    assert!((projected - 100.0).abs() < 1e-9);

    let t = aligned_tracker_at(300.0);
    let bearings = t.bearings();
    assert_eq!(bearings[1].name, "dish");
    assert!((bearings[1].display - 100.0).abs() < 1e-9);
}

#[test]
fn first_reading_creates_calibration() {
    let mut t = Tracker::new(&TrackerConfig::default(), None).unwrap();
    t.ingest(FeedbackReading::new(FeedbackLabel::Query, 1024, 90.0));
    assert_eq!(
        t.take_record_to_save(),
        Some(CalibrationRecord::new(1024, 90.0))
    );
    assert_eq!(t.store().motor().absolute_bearing(), 90.0);
}

// ── Properties ──────────────────────────────────────────────────────

#[test]
fn reconcile_is_idempotent() {
    let cases = [(0.0, 0.0), (10.0, 355.0), (359.9, 0.1), (180.0, -900.0), (45.0, 7245.0)];
    for (f, r) in cases {
        let once = reconcile(f, Some(r));
        let again = reconcile(normalize_bearing(once), Some(once));
        assert!((again - once).abs() < 1e-9, "f={f} r={r}");
    }
}

#[test]
fn projection_ignores_whole_driven_turns() {
    let ratio = 76.0 / 228.0;
    for d in [0.0, 45.5, 300.0, -123.0] {
        let base = project(d, ratio);
        for k in 1..=4 {
            let p = project(d + f64::from(k) * 360.0 / ratio, ratio);
            let diff = (p - base).abs();
            assert!(diff < 1e-6 || (360.0 - diff) < 1e-6, "d={d} k={k}");
        }
    }
}

#[test]
fn chained_gears_multiply() {
    let mut config = TrackerConfig::default();
    config.axes.push(AxisConfig::geared("pointer", "dish", 2, 1));
    let mut t = Tracker::new(&config, None).unwrap();
    t.ingest(FeedbackReading::new(FeedbackLabel::Sensor, 0, 90.0));
    let bearings = t.bearings();
    assert_eq!(bearings.len(), 3);
    assert!((bearings[1].display - 30.0).abs() < 1e-9);
    assert!((bearings[2].display - 60.0).abs() < 1e-9);
}

#[test]
fn unwrapped_bearing_survives_many_turns() {
    let mut t = aligned_tracker_at(0.0);
    // Ten full turns forward in quarter-turn steps.
    for i in 1..=40 {
        t.submit(CommandSource::Remote, "S400").unwrap();
        let deg = f64::from(i % 4) * 90.0;
        t.ingest(FeedbackReading::new(FeedbackLabel::Steps, 0, deg));
    }
    assert_eq!(t.store().motor().absolute_bearing(), 3600.0);
    // 3600 / 3 = 1200 = 3 dish turns + 120.
    assert!((t.bearings()[1].display - 120.0).abs() < 1e-6);
}

#[test]
fn aligning_blocks_motion_until_first_reading() {
    let record = CalibrationRecord::new(1024, 450.0);
    let mut t = Tracker::new(&TrackerConfig::default(), Some(record)).unwrap();
    assert_eq!(
        t.submit(CommandSource::Console, "D90"),
        Err(Rejection::NotAligned)
    );
    assert_eq!(t.final_record(), Some(record));

    // Same raw count: the stored bearing wins over the sensor's 90.
    t.ingest(FeedbackReading::new(FeedbackLabel::Query, 1024, 90.0));
    assert_eq!(t.store().motor().absolute_bearing(), 450.0);
    assert!(t.submit(CommandSource::Console, "D90").is_ok());
}
