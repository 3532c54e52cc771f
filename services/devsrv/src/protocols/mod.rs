//! Per-instrument protocol handlers.
//!
//! One handler per instrument family. TCP handlers own a connection from
//! accept to close; serial handlers own the port's read loop. Every handler
//! keeps its assembly buffer as local state inside `run`, so two connections
//! to the same family can never corrupt each other.

pub mod abbott;
pub mod alifax;
pub mod cbs400;
pub mod coax;
pub mod diestro;
pub mod hlseven;
pub mod ncc3300;
pub mod response911;
pub mod verify_u120;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_serial::SerialStream;

use crate::error::Result;

/// Handles one accepted TCP connection to completion.
#[async_trait]
pub trait TcpDeviceHandler: Send + Sync {
    async fn handle(&self, stream: TcpStream) -> Result<()>;
}

/// Owns the read loop of one opened serial port.
#[async_trait]
pub trait SerialDeviceHandler: Send + Sync {
    async fn handle(&self, port: SerialStream) -> Result<()>;
}
