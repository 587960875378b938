//! Async runtime around the tracker engine.
//!
//! One actor task owns the [`Tracker`]. Producers (knob, console, remote)
//! and actuator links talk to it through channels held by a cloneable
//! [`TrackerHandle`], so every state mutation is serialized without a
//! shared lock. The actor also owns the knob drain timer. Calibration
//! saves go to a saver task and run on the blocking pool, so the actor
//! never waits on store I/O until the final save at shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use steptrack_common::calibration::CalibrationRecord;
use steptrack_common::config::TrackerConfig;
use steptrack_common::protocol::{CommandEnvelope, FeedbackReading};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::calibration::{CalibrationError, CalibrationStore};
use crate::command::CommandSource;
use crate::error::TrackerError;
use crate::state::AxisBearing;
use crate::telemetry::TelemetryEvent;
use crate::tracker::{Phase, Tracker};

/// Request queue depth.
const REQUEST_QUEUE: usize = 256;
/// Telemetry broadcast buffer; slow observers lag past this.
const TELEMETRY_BUFFER: usize = 256;
/// Saves waiting behind the one in progress.
const SAVE_QUEUE: usize = 4;

/// Identifier of one attached actuator link.
pub type LinkId = u64;

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSnapshot {
    pub phase: Phase,
    pub bearings: Vec<AxisBearing>,
    pub last_raw: Option<i32>,
    pub pending_knob_delta: i32,
    pub awaiting_feedback: bool,
    pub link_attached: bool,
}

/// What the actor did on its way out.
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    /// Record written at shutdown, if any.
    pub final_record: Option<CalibrationRecord>,
    pub saved: bool,
    pub bearings: Vec<AxisBearing>,
}

enum Request {
    Submit {
        source: CommandSource,
        input: String,
        reply: oneshot::Sender<Result<Option<CommandEnvelope>, TrackerError>>,
    },
    Knob {
        delta: i32,
        pressed: bool,
    },
    Snapshot {
        reply: oneshot::Sender<TrackerSnapshot>,
    },
}

enum LinkEvent {
    Up {
        id: LinkId,
        outbound: mpsc::Sender<CommandEnvelope>,
    },
    Feedback {
        id: LinkId,
        reading: FeedbackReading,
    },
    Down {
        id: LinkId,
        reason: String,
    },
}

// ─── Handle ─────────────────────────────────────────────────────────

/// Cloneable entry point to the running tracker.
#[derive(Clone)]
pub struct TrackerHandle {
    requests: mpsc::Sender<Request>,
    links: mpsc::Sender<LinkEvent>,
    telemetry: broadcast::Sender<TelemetryEvent>,
    shutdown: Arc<watch::Sender<bool>>,
    next_link: Arc<AtomicU64>,
    outbound_queue: usize,
}

impl TrackerHandle {
    /// Parse and dispatch one line of operator input.
    pub async fn submit(
        &self,
        source: CommandSource,
        input: &str,
    ) -> Result<Option<CommandEnvelope>, TrackerError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Submit {
                source,
                input: input.to_string(),
                reply,
            })
            .await
            .map_err(|_| TrackerError::ShutDown)?;
        rx.await.map_err(|_| TrackerError::ShutDown)?
    }

    /// Forward one jog-wheel report.
    pub async fn knob(&self, delta: i32, pressed: bool) -> Result<(), TrackerError> {
        self.requests
            .send(Request::Knob { delta, pressed })
            .await
            .map_err(|_| TrackerError::ShutDown)
    }

    pub async fn snapshot(&self) -> Result<TrackerSnapshot, TrackerError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Snapshot { reply })
            .await
            .map_err(|_| TrackerError::ShutDown)?;
        rx.await.map_err(|_| TrackerError::ShutDown)
    }

    /// Subscribe to telemetry.
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.telemetry.subscribe()
    }

    /// Ask every loop to stop. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Receiver that flips to `true` on shutdown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Outbound queue capacity for new links.
    pub fn outbound_queue(&self) -> usize {
        self.outbound_queue
    }

    // ─── Link side ──────────────────────────────────────────────────

    pub fn next_link_id(&self) -> LinkId {
        self.next_link.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn link_up(
        &self,
        id: LinkId,
        outbound: mpsc::Sender<CommandEnvelope>,
    ) -> Result<(), TrackerError> {
        self.links
            .send(LinkEvent::Up { id, outbound })
            .await
            .map_err(|_| TrackerError::ShutDown)
    }

    pub async fn feedback(&self, id: LinkId, reading: FeedbackReading) -> Result<(), TrackerError> {
        self.links
            .send(LinkEvent::Feedback { id, reading })
            .await
            .map_err(|_| TrackerError::ShutDown)
    }

    pub async fn link_down(&self, id: LinkId, reason: String) -> Result<(), TrackerError> {
        self.links
            .send(LinkEvent::Down { id, reason })
            .await
            .map_err(|_| TrackerError::ShutDown)
    }
}

// ─── Spawn ──────────────────────────────────────────────────────────

/// Load calibration, build the engine and start the actor.
///
/// The returned join handle resolves once the actor has stopped and the
/// final calibration record has been saved.
pub async fn spawn(
    config: TrackerConfig,
    store: Arc<dyn CalibrationStore>,
) -> Result<(TrackerHandle, JoinHandle<ShutdownReport>), TrackerError> {
    let record = load_record(&store).await;
    let tracker = Tracker::new(&config, record)?;

    let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
    let (links_tx, links_rx) = mpsc::channel(REQUEST_QUEUE);
    let (telemetry_tx, _) = broadcast::channel(TELEMETRY_BUFFER);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = TrackerHandle {
        requests: requests_tx,
        links: links_tx,
        telemetry: telemetry_tx.clone(),
        shutdown: Arc::new(shutdown_tx),
        next_link: Arc::new(AtomicU64::new(1)),
        outbound_queue: config.tracker.outbound_queue,
    };

    let actor = Actor {
        tracker,
        saver: Some(Saver::spawn(Arc::clone(&store))),
        store,
        requests: requests_rx,
        links: links_rx,
        telemetry: telemetry_tx,
        shutdown: shutdown_rx,
        link: None,
        tick_interval: Duration::from_millis(config.tracker.tick_interval_ms),
    };
    info!(
        "Tracker started ({} axes, tick {} ms)",
        config.axes.len(),
        config.tracker.tick_interval_ms
    );
    Ok((handle, tokio::spawn(actor.run())))
}

async fn load_record(store: &Arc<dyn CalibrationStore>) -> Option<CalibrationRecord> {
    let store = Arc::clone(store);
    let location = store.location();
    match tokio::task::spawn_blocking(move || store.load()).await {
        Ok(Ok(Some(record))) => {
            info!(
                "Calibration record found in {} (raw={}, bearing={:.2}); aligning on first reading",
                location, record.raw_sensor_value, record.bearing_at_that_raw
            );
            Some(record)
        }
        Ok(Ok(None)) => {
            info!("No calibration record in {}; bearing starts at 0", location);
            None
        }
        Ok(Err(e)) => {
            warn!("Failed to load calibration from {}, starting fresh: {}", location, e);
            None
        }
        Err(e) => {
            error!("Calibration load task failed: {}", e);
            None
        }
    }
}

// ─── Actor ──────────────────────────────────────────────────────────

struct ActiveLink {
    id: LinkId,
    outbound: mpsc::Sender<CommandEnvelope>,
}

struct Actor {
    tracker: Tracker,
    store: Arc<dyn CalibrationStore>,
    saver: Option<Saver>,
    requests: mpsc::Receiver<Request>,
    links: mpsc::Receiver<LinkEvent>,
    telemetry: broadcast::Sender<TelemetryEvent>,
    shutdown: watch::Receiver<bool>,
    link: Option<ActiveLink>,
    tick_interval: Duration,
}

impl Actor {
    async fn run(mut self) -> ShutdownReport {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                Some(event) = self.links.recv() => self.on_link(event),
                Some(request) = self.requests.recv() => self.on_request(request),
                _ = ticker.tick() => self.on_tick(),
            }
            self.flush();
        }

        info!("Tracker stopping");
        // Dropping the outbound sender ends the link writer.
        self.link = None;
        if let Some(saver) = self.saver.take() {
            saver.drain().await;
        }
        let final_record = self.tracker.final_record();
        let saved = match final_record {
            Some(record) => persist(&self.store, record).await,
            None => {
                info!("No sensor reading observed; calibration left unchanged");
                false
            }
        };
        self.publish();
        ShutdownReport {
            final_record,
            saved,
            bearings: self.tracker.bearings(),
        }
    }

    fn on_request(&mut self, request: Request) {
        match request {
            Request::Submit {
                source,
                input,
                reply,
            } => {
                let result = self.submit(source, &input);
                let _ = reply.send(result);
            }
            Request::Knob { delta, pressed } => {
                let pressed = if pressed && !self.can_send() {
                    warn!("Knob press ignored: actuator link unavailable");
                    false
                } else {
                    pressed
                };
                if let Some(reset) = self.tracker.knob_event(delta, pressed) {
                    self.send(reset);
                }
            }
            Request::Snapshot { reply } => {
                let motor = self.tracker.store().motor();
                let _ = reply.send(TrackerSnapshot {
                    phase: self.tracker.phase(),
                    bearings: self.tracker.bearings(),
                    last_raw: self.tracker.last_raw(),
                    pending_knob_delta: self.tracker.knob().pending_delta(),
                    awaiting_feedback: motor.awaiting_feedback(),
                    link_attached: self.link.is_some(),
                });
            }
        }
    }

    fn submit(
        &mut self,
        source: CommandSource,
        input: &str,
    ) -> Result<Option<CommandEnvelope>, TrackerError> {
        let Some(envelope) = self.tracker.parse(source, input)? else {
            return Ok(None);
        };
        if !self.can_send() {
            let reason = if self.link.is_some() {
                "outbound queue full"
            } else {
                "no actuator link"
            };
            warn!(%source, command = %envelope, "Command not dispatched: {}", reason);
            return Err(TrackerError::TransportUnavailable(reason.to_string()));
        }
        let envelope = self.tracker.accept(source, envelope)?;
        self.send(envelope);
        Ok(Some(envelope))
    }

    fn on_tick(&mut self) {
        let can_send = self.can_send();
        if let Some(envelope) = self.tracker.tick(can_send) {
            self.send(envelope);
        }
    }

    fn on_link(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Up { id, outbound } => {
                if let Some(old) = self.link.replace(ActiveLink { id, outbound }) {
                    debug!(old = old.id, new = id, "Replacing actuator link");
                }
                let query = self.tracker.link_restored();
                self.send(query);
            }
            LinkEvent::Feedback { id, reading } => {
                if self.link.as_ref().is_some_and(|l| l.id == id) {
                    self.tracker.ingest(reading);
                } else {
                    debug!(link = id, "Dropping feedback from detached link");
                }
            }
            LinkEvent::Down { id, reason } => {
                if self.link.as_ref().is_some_and(|l| l.id == id) {
                    self.link = None;
                    self.tracker.link_lost(&reason);
                }
            }
        }
    }

    fn can_send(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|l| !l.outbound.is_closed() && l.outbound.capacity() > 0)
    }

    /// Hand a command to the link writer. Never waits.
    fn send(&mut self, envelope: CommandEnvelope) {
        let Some(link) = self.link.as_ref() else {
            warn!(command = %envelope, "No actuator link, command dropped");
            return;
        };
        match link.outbound.try_send(envelope) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(command = %envelope, "Outbound queue full, command dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.link = None;
                self.tracker.link_lost("outbound channel closed");
            }
        }
    }

    /// Publish telemetry and queue any record the engine asked to save.
    fn flush(&mut self) {
        self.publish();
        if let Some(record) = self.tracker.take_record_to_save() {
            match self.saver.as_ref() {
                Some(saver) => saver.queue(record),
                None => warn!("Calibration saver stopped, record dropped"),
            }
        }
    }

    fn publish(&mut self) {
        for event in self.tracker.drain_events() {
            // No subscribers is fine.
            let _ = self.telemetry.send(event);
        }
    }
}

// ─── Saver ──────────────────────────────────────────────────────────

/// Background writer for intermediate calibration saves, in queue order.
struct Saver {
    queue: mpsc::Sender<CalibrationRecord>,
    task: JoinHandle<()>,
}

impl Saver {
    fn spawn(store: Arc<dyn CalibrationStore>) -> Self {
        let (queue, mut rx) = mpsc::channel::<CalibrationRecord>(SAVE_QUEUE);
        let task = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                persist(&store, record).await;
            }
        });
        Self { queue, task }
    }

    /// Never waits. A record dropped here is superseded by the final save.
    fn queue(&self, record: CalibrationRecord) {
        match self.queue.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Calibration save queue full, skipping save (raw={}, bearing={:.2})",
                    record.raw_sensor_value, record.bearing_at_that_raw
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Calibration saver stopped, record dropped");
            }
        }
    }

    /// Finish queued saves.
    async fn drain(self) {
        drop(self.queue);
        if let Err(e) = self.task.await {
            error!("Calibration saver failed: {}", e);
        }
    }
}

/// Save on the blocking pool. Failures are logged, never fatal.
async fn persist(store: &Arc<dyn CalibrationStore>, record: CalibrationRecord) -> bool {
    let location = store.location();
    let store = Arc::clone(store);
    let result = tokio::task::spawn_blocking(move || store.save(&record))
        .await
        .unwrap_or_else(|e| Err(CalibrationError::Io(format!("save task failed: {e}"))));
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to save calibration to {}: {}", location, e);
            false
        }
    }
}
