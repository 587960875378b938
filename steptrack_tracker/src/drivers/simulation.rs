//! Simulated actuator.
//!
//! Speaks the actuator line protocol over an in-process duplex stream so
//! the tracker can run, and be tested, without hardware. Position is kept
//! as an unwrapped step count; the sensor view is derived from it.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use steptrack_common::config::EngineConfig;
use steptrack_common::consts::{ABSOLUTE_DEGREE_MAX, ABSOLUTE_DEGREE_MIN, FULL_TURN_DEG};
use steptrack_common::protocol::{CommandKind, FeedbackLabel, FeedbackReading};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tracing::debug;

use super::{ActuatorDriver, LinkStreams};

const DUPLEX_BUFFER: usize = 4096;

/// Software stand-in for the actuator firmware.
#[derive(Debug, Clone)]
pub struct SimulatedActuator {
    /// Unwrapped motor position [steps].
    position_steps: i64,
    steps_per_revolution: u32,
    raw_counts_per_revolution: u32,
}

impl SimulatedActuator {
    pub fn new(steps_per_revolution: u32, raw_counts_per_revolution: u32) -> Self {
        Self {
            position_steps: 0,
            steps_per_revolution: steps_per_revolution.max(1),
            raw_counts_per_revolution: raw_counts_per_revolution.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.steps_per_revolution, config.raw_counts_per_revolution)
    }

    /// Start at `steps` instead of zero.
    pub fn with_position_steps(mut self, steps: i64) -> Self {
        self.position_steps = steps;
        self
    }

    #[inline]
    pub fn position_steps(&self) -> i64 {
        self.position_steps
    }

    /// Sensor bearing in `[0, 360)`.
    pub fn bearing(&self) -> f64 {
        (self.position_steps as f64 * FULL_TURN_DEG / f64::from(self.steps_per_revolution))
            .rem_euclid(FULL_TURN_DEG)
    }

    /// Raw sensor count.
    pub fn raw(&self) -> i32 {
        let counts = i64::from(self.raw_counts_per_revolution);
        let spr = i64::from(self.steps_per_revolution);
        (self.position_steps.rem_euclid(spr) * counts / spr) as i32
    }

    /// Execute one command line and produce its feedback.
    ///
    /// Blank lines and unknown prefixes get no answer.
    pub fn respond(&mut self, line: &str) -> Option<FeedbackReading> {
        let line = line.trim();
        let first = line.chars().next()?;
        let kind = CommandKind::from_prefix(first)?;
        let payload = line[first.len_utf8()..].trim().parse::<i64>().ok();

        let label = match (kind, payload) {
            (CommandKind::AbsoluteDegree, Some(deg))
                if (ABSOLUTE_DEGREE_MIN..=ABSOLUTE_DEGREE_MAX).contains(&deg) =>
            {
                self.move_to_degree(deg);
                FeedbackLabel::Degree
            }
            (CommandKind::AbsoluteDegree, _) => FeedbackLabel::DegreeSkip,
            (CommandKind::RelativeSteps | CommandKind::KnobSteps, Some(steps)) => {
                self.position_steps = self.position_steps.saturating_add(steps);
                FeedbackLabel::echo_of(kind)
            }
            (CommandKind::RelativeSteps | CommandKind::KnobSteps, None) => FeedbackLabel::StepsSkip,
            (CommandKind::Reset, _) => {
                self.position_steps = 0;
                FeedbackLabel::Reset
            }
            (CommandKind::Query, _) => FeedbackLabel::Query,
        };
        Some(FeedbackReading::new(label, self.raw(), self.bearing()))
    }

    /// Unsolicited reading.
    pub fn sensor(&self) -> FeedbackReading {
        FeedbackReading::new(FeedbackLabel::Sensor, self.raw(), self.bearing())
    }

    /// Move to `deg` along the shorter way round.
    fn move_to_degree(&mut self, deg: i64) {
        let spr = i64::from(self.steps_per_revolution);
        let target = (deg as f64 * spr as f64 / FULL_TURN_DEG).round() as i64;
        let mut delta = (target - self.position_steps).rem_euclid(spr);
        if delta * 2 > spr {
            delta -= spr;
        }
        self.position_steps += delta;
    }
}

/// Driver that spawns a fresh duplex session per connection against a
/// shared simulated actuator.
#[derive(Debug, Clone)]
pub struct SimulationDriver {
    actuator: Arc<Mutex<SimulatedActuator>>,
}

impl SimulationDriver {
    pub fn new(actuator: SimulatedActuator) -> Self {
        Self {
            actuator: Arc::new(Mutex::new(actuator)),
        }
    }

    /// Shared actuator state, for inspection.
    pub fn actuator(&self) -> Arc<Mutex<SimulatedActuator>> {
        Arc::clone(&self.actuator)
    }

    /// Open a session and return the tracker-side stream.
    pub fn open(&self) -> DuplexStream {
        let (tracker_side, device_side) = tokio::io::duplex(DUPLEX_BUFFER);
        tokio::spawn(serve(Arc::clone(&self.actuator), device_side));
        tracker_side
    }
}

impl ActuatorDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        "simulation"
    }

    async fn connect(&mut self) -> io::Result<LinkStreams> {
        let (reader, writer) = tokio::io::split(self.open());
        Ok(LinkStreams {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }
}

/// Answer every command line on `stream` until it closes.
pub async fn serve(actuator: Arc<Mutex<SimulatedActuator>>, stream: DuplexStream) -> io::Result<()> {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let reply = actuator.lock().respond(&line);
        if let Some(reading) = reply {
            debug!(command = line.trim(), reply = %reading, "Simulated actuator");
            writer.write_all(reading.to_line().as_bytes()).await?;
            writer.flush().await?;
        }
    }
    Ok(())
}
