//! Integration test: runtime actor against live streams.
//!
//! Simulated actuator sessions, hand-driven duplex links for link loss,
//! remote clients, and calibration persistence across restarts.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use steptrack_common::calibration::CalibrationRecord;
use steptrack_common::config::TrackerConfig;
use steptrack_common::error::Rejection;
use steptrack_common::protocol::CommandEnvelope;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use steptrack_tracker::calibration::{
    CalibrationError, CalibrationStore, FileCalibrationStore, MemoryCalibrationStore,
};
use steptrack_tracker::command::CommandSource;
use steptrack_tracker::drivers::{
    self, ActuatorDriver, LinkStreams, simulation::SimulatedActuator, simulation::SimulationDriver,
};
use steptrack_tracker::runtime::{TrackerHandle, TrackerSnapshot};
use steptrack_tracker::telemetry::{MotionOrigin, TelemetryEvent};
use steptrack_tracker::tracker::Phase;
use steptrack_tracker::{TrackerError, link, sources, spawn};

// ── Helpers ─────────────────────────────────────────────────────────

const WAIT: Duration = Duration::from_secs(5);

async fn wait_for<F>(handle: &TrackerHandle, pred: F) -> TrackerSnapshot
where
    F: Fn(&TrackerSnapshot) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let snapshot = handle.snapshot().await.unwrap();
            if pred(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

fn motor_at(snapshot: &TrackerSnapshot, deg: f64) -> bool {
    (snapshot.bearings[0].absolute - deg).abs() < 1e-9 && !snapshot.awaiting_feedback
}

fn simulator(steps: i64) -> SimulationDriver {
    SimulationDriver::new(SimulatedActuator::new(1600, 4096).with_position_steps(steps))
}

// ── Simulated actuator ──────────────────────────────────────────────

#[tokio::test]
async fn commands_round_trip_through_simulator() {
    let store = Arc::new(MemoryCalibrationStore::new());
    let (handle, actor) = spawn(TrackerConfig::default(), store.clone()).await.unwrap();
    let driver = simulator(0);
    let actuator = driver.actuator();
    tokio::spawn(drivers::run(driver, handle.clone()));

    // Link-up query seeds the calibration record.
    wait_for(&handle, |s| s.last_raw.is_some()).await;
    wait_until(|| store.save_count() == 1).await;
    assert_eq!(store.record(), Some(CalibrationRecord::new(0, 0.0)));

    let sent = handle.submit(CommandSource::Console, "S400").await.unwrap();
    assert_eq!(sent, Some(CommandEnvelope::relative_steps(400)));
    wait_for(&handle, |s| motor_at(s, 90.0)).await;
    assert_eq!(actuator.lock().position_steps(), 400);

    let err = handle.submit(CommandSource::Console, "D400").await.unwrap_err();
    assert!(matches!(err, TrackerError::InvalidCommand(Rejection::OutOfRange(400))));
    assert_eq!(actuator.lock().position_steps(), 400);

    handle.shutdown();
    let report = actor.await.unwrap();
    assert_eq!(report.final_record, Some(CalibrationRecord::new(1024, 90.0)));
    assert!(report.saved);
    assert_eq!(store.save_count(), 2);
    assert_eq!(store.record(), Some(CalibrationRecord::new(1024, 90.0)));
}

#[tokio::test]
async fn knob_ticks_reach_the_actuator() {
    let store = Arc::new(MemoryCalibrationStore::new());
    let (handle, actor) = spawn(TrackerConfig::default(), store).await.unwrap();
    let driver = simulator(0);
    let actuator = driver.actuator();
    tokio::spawn(drivers::run(driver, handle.clone()));
    wait_for(&handle, |s| s.last_raw.is_some()).await;

    let mut telemetry = handle.subscribe();
    handle.knob(9, false).await.unwrap();
    wait_for(&handle, |s| motor_at(s, 4.05)).await;
    assert_eq!(actuator.lock().position_steps(), 18);

    let line = tokio::time::timeout(WAIT, async {
        loop {
            let event = telemetry.recv().await.unwrap();
            if matches!(event, TelemetryEvent::Reconciled { origin: MotionOrigin::Knob(_), .. }) {
                break event.to_line();
            }
        }
    })
    .await
    .unwrap();
    assert!(
        line.starts_with("Knob 9 | Scale 2 | Move 18 | Raw 46 | Bearing 4.05 | dish "),
        "{line}"
    );

    handle.shutdown();
    actor.await.unwrap();
}

#[tokio::test]
async fn knob_press_resets_to_zero() {
    let store = Arc::new(MemoryCalibrationStore::new());
    let (handle, actor) = spawn(TrackerConfig::default(), store).await.unwrap();
    let driver = simulator(400);
    let actuator = driver.actuator();
    tokio::spawn(drivers::run(driver, handle.clone()));
    wait_for(&handle, |s| motor_at(s, 90.0)).await;

    handle.knob(0, true).await.unwrap();
    wait_for(&handle, |s| motor_at(s, 0.0)).await;
    assert_eq!(actuator.lock().position_steps(), 0);

    handle.shutdown();
    actor.await.unwrap();
}

// ── Link loss ───────────────────────────────────────────────────────

#[tokio::test]
async fn realigns_from_record_after_link_loss() {
    let record = CalibrationRecord::new(1024, 450.0);
    let store = Arc::new(MemoryCalibrationStore::with_record(record));
    let (handle, actor) = spawn(TrackerConfig::default(), store.clone()).await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, Phase::Aligning(record));
    let err = handle.submit(CommandSource::Console, "S10").await.unwrap_err();
    assert!(matches!(err, TrackerError::TransportUnavailable(_)));

    // First link: the stored bearing wins over the sensor's modulo value.
    let (tracker_side, device_side) = tokio::io::duplex(1024);
    let (r, w) = tokio::io::split(tracker_side);
    let first = tokio::spawn(link::run(r, w, handle.clone()));
    let (dr, mut dw) = tokio::io::split(device_side);
    let mut device = BufReader::new(dr).lines();
    assert_eq!(device.next_line().await.unwrap().unwrap(), "Q");

    let err = handle.submit(CommandSource::Console, "S10").await.unwrap_err();
    assert!(matches!(err, TrackerError::InvalidCommand(Rejection::NotAligned)));

    dw.write_all(b"Q,1024,90.00\n").await.unwrap();
    let snapshot = wait_for(&handle, |s| s.phase == Phase::Tracking).await;
    assert_eq!(snapshot.bearings[0].absolute, 450.0);

    drop(device);
    drop(dw);
    let result = first.await.unwrap();
    assert!(matches!(result, Err(TrackerError::TransportUnavailable(_))));
    let snapshot = wait_for(&handle, |s| !s.link_attached).await;
    assert_eq!(snapshot.phase, Phase::Aligning(CalibrationRecord::new(1024, 450.0)));

    // Second link: the mount moved a quarter turn while disconnected.
    let (tracker_side, device_side) = tokio::io::duplex(1024);
    let (r, w) = tokio::io::split(tracker_side);
    tokio::spawn(link::run(r, w, handle.clone()));
    let (dr, mut dw) = tokio::io::split(device_side);
    let mut device = BufReader::new(dr).lines();
    assert_eq!(device.next_line().await.unwrap().unwrap(), "Q");
    dw.write_all(b"Q,2048,180.00\n").await.unwrap();
    wait_for(&handle, |s| s.phase == Phase::Tracking && motor_at(s, 540.0)).await;

    handle.shutdown();
    let report = actor.await.unwrap();
    assert_eq!(report.final_record, Some(CalibrationRecord::new(2048, 540.0)));
    assert_eq!(store.save_count(), 3);
}

#[tokio::test]
async fn spurious_feedback_is_discarded() {
    let store = Arc::new(MemoryCalibrationStore::new());
    let (handle, actor) = spawn(TrackerConfig::default(), store).await.unwrap();
    let (tracker_side, device_side) = tokio::io::duplex(1024);
    let (r, w) = tokio::io::split(tracker_side);
    tokio::spawn(link::run(r, w, handle.clone()));
    let (dr, mut dw) = tokio::io::split(device_side);
    let mut device = BufReader::new(dr).lines();
    assert_eq!(device.next_line().await.unwrap().unwrap(), "Q");

    dw.write_all(b"garbage\nQ,12\nD-SKIP,5,5.00\nQ,512,45.00\n").await.unwrap();
    let snapshot = wait_for(&handle, |s| s.last_raw.is_some()).await;
    assert_eq!(snapshot.last_raw, Some(512));
    assert!(motor_at(&snapshot, 45.0));

    handle.shutdown();
    actor.await.unwrap();
}

#[tokio::test]
async fn invalid_utf8_on_the_link_is_discarded() {
    let store = Arc::new(MemoryCalibrationStore::new());
    let (handle, actor) = spawn(TrackerConfig::default(), store).await.unwrap();
    let (tracker_side, device_side) = tokio::io::duplex(1024);
    let (r, w) = tokio::io::split(tracker_side);
    let session = tokio::spawn(link::run(r, w, handle.clone()));
    let (dr, mut dw) = tokio::io::split(device_side);
    let mut device = BufReader::new(dr).lines();
    assert_eq!(device.next_line().await.unwrap().unwrap(), "Q");

    dw.write_all(b"Q,512,45.00\n\xff\xfe noise\nQ,600,50.00\n").await.unwrap();
    let snapshot = wait_for(&handle, |s| s.last_raw == Some(600)).await;
    assert!(motor_at(&snapshot, 50.0));
    assert!(snapshot.link_attached);
    assert_eq!(snapshot.phase, Phase::Tracking);
    assert!(!session.is_finished());

    handle.shutdown();
    actor.await.unwrap();
}

// ── Reconnect ───────────────────────────────────────────────────────

/// Refuses the first `failures` connections, then hands out the simulator.
struct FlakyDriver {
    inner: SimulationDriver,
    failures: usize,
    attempts: Arc<AtomicUsize>,
}

impl ActuatorDriver for FlakyDriver {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn connect(&mut self) -> io::Result<LinkStreams> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "bridge not ready"));
        }
        self.inner.connect().await
    }
}

#[tokio::test]
async fn driver_reconnects_and_realigns() {
    let record = CalibrationRecord::new(1024, 450.0);
    let store = Arc::new(MemoryCalibrationStore::with_record(record));
    let (handle, actor) = spawn(TrackerConfig::default(), store).await.unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let driver = FlakyDriver {
        inner: simulator(400),
        failures: 1,
        attempts: attempts.clone(),
    };
    let task = tokio::spawn(drivers::run(driver, handle.clone()));

    let snapshot = wait_for(&handle, |s| s.phase == Phase::Tracking).await;
    assert_eq!(snapshot.bearings[0].absolute, 450.0);
    assert!(snapshot.link_attached);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    handle.shutdown();
    actor.await.unwrap();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

// ── Slow calibration store ──────────────────────────────────────────

/// Memory store whose saves block for `delay`.
struct SlowStore {
    inner: MemoryCalibrationStore,
    delay: Duration,
}

impl CalibrationStore for SlowStore {
    fn load(&self) -> Result<Option<CalibrationRecord>, CalibrationError> {
        self.inner.load()
    }

    fn save(&self, record: &CalibrationRecord) -> Result<(), CalibrationError> {
        std::thread::sleep(self.delay);
        self.inner.save(record)
    }

    fn location(&self) -> String {
        "slow memory".to_string()
    }
}

#[tokio::test]
async fn slow_calibration_save_does_not_stall_commands() {
    let store = Arc::new(SlowStore {
        inner: MemoryCalibrationStore::new(),
        delay: Duration::from_millis(800),
    });
    let (handle, actor) = spawn(TrackerConfig::default(), store.clone()).await.unwrap();
    tokio::spawn(drivers::run(simulator(0), handle.clone()));

    // The first reading queues the seed save.
    wait_for(&handle, |s| s.last_raw.is_some()).await;
    let started = Instant::now();
    let sent = handle.submit(CommandSource::Console, "S10").await.unwrap();
    let elapsed = started.elapsed();
    assert_eq!(sent, Some(CommandEnvelope::relative_steps(10)));
    assert!(elapsed < Duration::from_millis(300), "submit took {elapsed:?}");
    wait_for(&handle, |s| motor_at(s, 2.25)).await;

    handle.shutdown();
    let report = actor.await.unwrap();
    assert!(report.saved);
    // Seed save finishes before the final one overwrites it.
    assert_eq!(store.inner.save_count(), 2);
    assert_eq!(store.inner.record(), report.final_record);
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_without_readings_saves_nothing() {
    let store = Arc::new(MemoryCalibrationStore::new());
    let (handle, actor) = spawn(TrackerConfig::default(), store.clone()).await.unwrap();
    handle.shutdown();
    let report = actor.await.unwrap();
    assert_eq!(report.final_record, None);
    assert!(!report.saved);
    assert_eq!(store.save_count(), 0);

    let err = handle.submit(CommandSource::Console, "Q").await.unwrap_err();
    assert!(matches!(err, TrackerError::ShutDown));
}

#[tokio::test]
async fn unaligned_shutdown_keeps_loaded_record() {
    let record = CalibrationRecord::new(77, 1234.5);
    let store = Arc::new(MemoryCalibrationStore::with_record(record));
    let (handle, actor) = spawn(TrackerConfig::default(), store.clone()).await.unwrap();
    handle.shutdown();
    let report = actor.await.unwrap();
    assert_eq!(report.final_record, Some(record));
    assert_eq!(store.save_count(), 1);
    assert_eq!(store.record(), Some(record));
}

#[tokio::test]
async fn calibration_file_carries_bearing_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("steptrack/calibration.bin");

    let store = Arc::new(FileCalibrationStore::new(&path, 4096));
    let (handle, actor) = spawn(TrackerConfig::default(), store).await.unwrap();
    tokio::spawn(drivers::run(simulator(0), handle.clone()));
    wait_for(&handle, |s| s.last_raw.is_some()).await;
    handle.submit(CommandSource::Console, "S1800").await.unwrap();
    wait_for(&handle, |s| motor_at(s, 405.0)).await;
    handle.shutdown();
    actor.await.unwrap();

    let reloaded = FileCalibrationStore::new(&path, 4096).load().unwrap().unwrap();
    assert_eq!(reloaded.bearing_at_that_raw, 405.0);

    // Restart against an actuator that drifted 40 steps further.
    let store = Arc::new(FileCalibrationStore::new(&path, 4096));
    let (handle, actor) = spawn(TrackerConfig::default(), store).await.unwrap();
    tokio::spawn(drivers::run(simulator(1840), handle.clone()));
    let snapshot = wait_for(&handle, |s| s.phase == Phase::Tracking).await;
    let motor = snapshot.bearings[0].absolute;
    assert!((motor - 414.0).abs() < 0.1, "motor at {motor}");
    handle.shutdown();
    actor.await.unwrap();
}

// ── Remote source ───────────────────────────────────────────────────

#[tokio::test]
async fn remote_client_gets_replies_and_telemetry() {
    let store = Arc::new(MemoryCalibrationStore::new());
    let (handle, actor) = spawn(TrackerConfig::default(), store).await.unwrap();
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(sources::serve_client(server, handle.clone()));

    let (cr, mut cw) = tokio::io::split(client);
    cw.write_all(b"D400\n\nS10\n").await.unwrap();
    let mut lines = BufReader::new(cr).lines();

    let mut out_of_range = false;
    let mut no_link = false;
    let mut telemetry = false;
    tokio::time::timeout(WAIT, async {
        while !(out_of_range && no_link && telemetry) {
            let line = lines.next_line().await.unwrap().unwrap();
            out_of_range |= line == "ERR Invalid command: out of range: 400 (expected 0..=360)";
            no_link |= line.starts_with("ERR Transport unavailable");
            telemetry |= line.starts_with("[Rejected] D400 (remote)");
        }
    })
    .await
    .unwrap();

    handle.shutdown();
    actor.await.unwrap();
}
