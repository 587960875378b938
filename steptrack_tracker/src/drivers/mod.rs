//! Actuator drivers.
//!
//! - [`simulation`] - In-process actuator over a duplex stream
//! - [`tcp`] - Line stream to a serial-to-network bridge
//!
//! A driver only opens streams. Framing and reconciliation belong to
//! [`link`](crate::link); reconnection is handled by [`run`].

pub mod simulation;
pub mod tcp;

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::error::TrackerError;
use crate::link;
use crate::runtime::TrackerHandle;

const RECONNECT_MIN: Duration = Duration::from_millis(100);
const RECONNECT_MAX: Duration = Duration::from_secs(5);

pub type LinkReader = Box<dyn AsyncRead + Unpin + Send>;
pub type LinkWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Read and write halves of one actuator connection.
pub struct LinkStreams {
    pub reader: LinkReader,
    pub writer: LinkWriter,
}

/// Source of actuator connections.
pub trait ActuatorDriver: Send {
    /// Driver name for logs.
    fn name(&self) -> &'static str;

    /// Open a fresh connection to the actuator.
    fn connect(&mut self) -> impl Future<Output = io::Result<LinkStreams>> + Send;
}

/// Keep a link attached until shutdown, reconnecting with backoff.
pub async fn run<D: ActuatorDriver>(mut driver: D, handle: TrackerHandle) {
    let mut shutdown = handle.shutdown_signal();
    let mut backoff = RECONNECT_MIN;

    while !handle.is_shutting_down() {
        match driver.connect().await {
            Ok(streams) => {
                backoff = RECONNECT_MIN;
                match link::run(streams.reader, streams.writer, handle.clone()).await {
                    Ok(()) | Err(TrackerError::ShutDown) => break,
                    Err(e) => warn!("{} link lost: {}", driver.name(), e),
                }
            }
            Err(e) => warn!("Failed to connect to {} actuator: {}", driver.name(), e),
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => {}
        }
        backoff = (backoff * 2).min(RECONNECT_MAX);
    }
    info!("{} driver stopped", driver.name());
}
