//! Operator command sources.
//!
//! - Console: one command per stdin line.
//! - Remote: TCP clients send one command per line and receive `OK <cmd>`
//!   or `ERR <reason>` replies, interleaved with telemetry lines.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::command::CommandSource;
use crate::error::TrackerError;
use crate::runtime::TrackerHandle;

/// Submit every line of `reader` as `source` until EOF or shutdown.
pub async fn run_lines<R>(reader: R, source: CommandSource, handle: TrackerHandle)
where
    R: AsyncRead + Unpin,
{
    let mut shutdown = handle.shutdown_signal();
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    // Rejections and transport errors are logged by the actor.
                    if let Err(TrackerError::ShutDown) = handle.submit(source, &line).await {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(%source, "Input closed");
                    break;
                }
                Err(e) => {
                    warn!(%source, "Input read failed: {}", e);
                    break;
                }
            },
        }
    }
}

/// Console source on stdin.
pub async fn run_console(handle: TrackerHandle) {
    info!("Console ready: D<deg>, S<steps>, C, Q or a bare step count");
    run_lines(tokio::io::stdin(), CommandSource::Console, handle).await;
}

/// Accept remote clients until shutdown.
pub async fn run_remote(listener: TcpListener, handle: TrackerHandle) -> io::Result<()> {
    info!("Remote command source listening on {}", listener.local_addr()?);
    let mut shutdown = handle.shutdown_signal();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
            }
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                info!("Remote client connected: {}", peer);
                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_client(socket, handle).await {
                        debug!("Remote client {} ended: {}", peer, e);
                    }
                    info!("Remote client disconnected: {}", peer);
                });
            }
        }
    }
}

/// Serve one remote client: commands in, replies and telemetry out.
pub async fn serve_client<S>(stream: S, handle: TrackerHandle) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    let mut telemetry = handle.subscribe();
    let mut shutdown = handle.shutdown_signal();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                let reply = match handle.submit(CommandSource::Remote, &line).await {
                    Ok(Some(envelope)) => format!("OK {envelope}\n"),
                    Ok(None) => continue,
                    Err(TrackerError::ShutDown) => return Ok(()),
                    Err(e) => format!("ERR {e}\n"),
                };
                writer.write_all(reply.as_bytes()).await?;
            }
            event = telemetry.recv() => match event {
                Ok(event) => {
                    writer.write_all(event.to_line().as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Remote client lagging, {} telemetry events dropped", skipped);
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}
