//! MLLP framing: `0x0B` + payload + `0x1C` + `0x0D`.
//!
//! The envelope is bit-exact on write. On read, a missing start block is
//! logged and treated as no data (instruments occasionally leak stray bytes
//! between frames), while a missing trailing carriage return is a hard
//! framing error.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::{Hl7Error, Result};

pub const START_BLOCK: u8 = 0x0B;
pub const END_BLOCK: u8 = 0x1C;
pub const CARRIAGE_RETURN: u8 = 0x0D;

/// Reads and writes MLLP-framed messages over one stream.
pub struct MllpConnection<S> {
    stream: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> MllpConnection<S> {
    pub fn new(stream: S) -> Self {
        MllpConnection {
            stream: BufReader::new(stream),
        }
    }

    /// Write one framed message. A partial write is not retried; the
    /// connection is considered broken and the error propagates.
    pub async fn write_message(&mut self, payload: &[u8]) -> Result<()> {
        self.stream.write_all(&[START_BLOCK]).await?;
        self.stream.write_all(payload).await?;
        self.stream.write_all(&[END_BLOCK, CARRIAGE_RETURN]).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one framed message. Returns `Ok(None)` on clean peer close so
    /// callers can tell normal shutdown from a framing failure, and after a
    /// logged protocol desync (first byte is not the start block).
    pub async fn read_message(&mut self) -> Result<Option<Vec<u8>>> {
        let first = match self.read_byte().await? {
            Some(b) => b,
            None => return Ok(None),
        };
        if first != START_BLOCK {
            warn!(byte = first, "invalid mllp start block");
            return Ok(None);
        }

        let mut payload = Vec::new();
        loop {
            match self.read_byte().await? {
                Some(END_BLOCK) => break,
                Some(b) => payload.push(b),
                None => {
                    return Err(Hl7Error::Framing(
                        "connection closed before mllp end block".into(),
                    ))
                }
            }
        }

        match self.read_byte().await? {
            Some(CARRIAGE_RETURN) => Ok(Some(payload)),
            Some(b) => Err(Hl7Error::Framing(format!(
                "missing end carriage return, got 0x{b:02X}"
            ))),
            None => Err(Hl7Error::Framing(
                "connection closed before end carriage return".into(),
            )),
        }
    }

    /// Read until the peer closes, collecting every framed message.
    pub async fn read_all_messages(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut messages = Vec::new();
        while let Some(message) = self.read_message().await? {
            if message.is_empty() {
                break;
            }
            messages.push(message);
        }
        Ok(messages)
    }

    async fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.stream.read(&mut buf).await? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    /// The underlying stream, for callers that need to drop or shut it down.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}
