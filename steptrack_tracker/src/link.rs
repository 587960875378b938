//! Line link between the tracker and one actuator stream.
//!
//! Commands go out as newline-terminated lines from a writer task fed by
//! a bounded queue; feedback lines are decoded and forwarded to the actor.
//! Lines that are not valid UTF-8 count as spurious feedback, not as a
//! transport failure. A link lives until either half fails or the tracker
//! shuts down.

use steptrack_common::protocol::{CommandEnvelope, FeedbackReading};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::TrackerError;
use crate::runtime::{LinkId, TrackerHandle};

/// Drive one actuator stream until it closes.
///
/// Returns `Ok(())` when the tracker shut down, and
/// `Err(TrackerError::TransportUnavailable)` once the stream failed and the
/// tracker has been told.
pub async fn run<R, W>(reader: R, writer: W, handle: TrackerHandle) -> Result<(), TrackerError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let id = handle.next_link_id();
    let (tx, rx) = mpsc::channel(handle.outbound_queue());
    let mut writer_task = tokio::spawn(write_commands(id, writer, rx));
    handle.link_up(id, tx).await?;
    info!(link = id, "Actuator link attached");

    let mut shutdown = handle.shutdown_signal();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    let reason = loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    writer_task.abort();
                    return Ok(());
                }
            }
            // Partial reads stay in `line` if another branch wins.
            read = reader.read_until(b'\n', &mut line) => match read {
                Ok(0) => break "actuator closed the stream".to_string(),
                Ok(_) => {
                    let reading = decode(id, &String::from_utf8_lossy(&line));
                    line.clear();
                    if let Some(reading) = reading {
                        handle.feedback(id, reading).await?;
                    }
                }
                Err(e) => break format!("read failed: {e}"),
            },
            result = &mut writer_task => {
                break match result {
                    Ok(reason) => reason,
                    Err(e) => format!("writer task failed: {e}"),
                };
            }
        }
    };

    writer_task.abort();
    handle.link_down(id, reason.clone()).await?;
    Err(TrackerError::TransportUnavailable(reason))
}

/// Decode one inbound line. Blank lines are skipped, malformed lines logged.
fn decode(id: LinkId, line: &str) -> Option<FeedbackReading> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.parse::<FeedbackReading>() {
        Ok(reading) => Some(reading),
        Err(e) => {
            warn!(link = id, line, "Spurious feedback discarded: {}", e);
            None
        }
    }
}

async fn write_commands<W>(id: LinkId, mut writer: W, mut rx: mpsc::Receiver<CommandEnvelope>) -> String
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        debug!(link = id, command = %envelope, "-> actuator");
        if let Err(e) = writer.write_all(envelope.to_line().as_bytes()).await {
            return format!("write failed: {e}");
        }
        if let Err(e) = writer.flush().await {
            return format!("flush failed: {e}");
        }
    }
    "link detached".to_string()
}
