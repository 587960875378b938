//! TCP actuator driver.
//!
//! Connects to a serial-to-network bridge that relays the actuator's line
//! protocol unchanged.

use std::io;

use tokio::net::TcpStream;
use tracing::info;

use super::{ActuatorDriver, LinkStreams};

#[derive(Debug, Clone)]
pub struct TcpActuator {
    addr: String,
}

impl TcpActuator {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl ActuatorDriver for TcpActuator {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn connect(&mut self) -> io::Result<LinkStreams> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to actuator bridge at {}", self.addr);
        let (reader, writer) = stream.into_split();
        Ok(LinkStreams {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }
}
