//! Neomedica NCC-3300 hematology analyzer (HL7 over a raw serial line).
//!
//! The instrument streams HL7 without MLLP framing and without reliable
//! segment separators, so assembly is time-based: printable bytes accumulate
//! in a handler-local buffer and a quiet gap of 300 ms marks the end of a
//! transmission. The assembled text is then re-split into segments on the
//! `|OBX` / `|OBR` / `MSH|` markers, histogram OBX lines are dropped, and the
//! result is parsed as a regular HL7 message. The device never reads back, so
//! no acknowledgment is written.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_serial::SerialStream;
use tracing::{debug, error, info};

use labwire_hl7::{Hl7Message, MessageKind};

use crate::analyzer::Analyzer;
use crate::error::{DevSrvError, Result};
use crate::hl7::{map_orm_o01, map_oru_r01};
use crate::protocols::SerialDeviceHandler;

/// Quiet gap after which the accumulated bytes are treated as one message.
const QUIET_WINDOW: Duration = Duration::from_millis(300);

pub struct Ncc3300Handler {
    analyzer: Arc<dyn Analyzer>,
}

impl Ncc3300Handler {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Ncc3300Handler { analyzer }
    }

    pub async fn run<S: AsyncRead + Unpin + Send>(&self, mut port: S) -> Result<()> {
        let mut chunk = [0u8; 1024];
        let mut raw = String::new();
        loop {
            let n = if raw.is_empty() {
                match port.read(&mut chunk).await? {
                    0 => return Ok(()),
                    n => n,
                }
            } else {
                match tokio::time::timeout(QUIET_WINDOW, port.read(&mut chunk)).await {
                    Ok(Ok(0)) => {
                        self.process(&std::mem::take(&mut raw)).await;
                        return Ok(());
                    }
                    Ok(Ok(n)) => n,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => {
                        self.process(&std::mem::take(&mut raw)).await;
                        continue;
                    }
                }
            };
            raw.extend(chunk[..n].iter().filter(|b| (32..=126).contains(*b)).map(|&b| b as char));
        }
    }

    async fn process(&self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        info!(length = raw.len(), "assembling hl7 transmission");
        if let Err(e) = self.dispatch(&reassemble(raw)).await {
            error!(error = %e, "failed to handle hl7 message");
        }
    }

    async fn dispatch(&self, raw: &str) -> Result<()> {
        debug!(message = %raw.replace('\r', "\n"), "reassembled hl7 message");
        let msg = Hl7Message::parse(raw)?;
        match msg.kind()? {
            MessageKind::OruR01 => {
                self.analyzer.process_oru_r01(map_oru_r01(&msg)?).await?;
            }
            MessageKind::OrmO01 => {
                self.analyzer.process_orm_o01(map_orm_o01(&msg)?).await?;
            }
            other => return Err(DevSrvError::UnknownMessageType(format!("{other:?}"))),
        }
        Ok(())
    }
}

/// Re-splits a run-together transmission into CR-separated segments, keeping
/// only MSH, OBR and non-histogram OBX lines.
fn reassemble(raw: &str) -> String {
    let split = raw
        .replace("|OBX", "\nOBX")
        .replace("|OBR", "\nOBR")
        .replace("MSH|", "\nMSH|");

    let segments: Vec<&str> = split
        .lines()
        .filter(|line| {
            if line.starts_with("OBX") {
                !line.contains("Histogram")
            } else {
                line.starts_with("MSH") || line.starts_with("OBR")
            }
        })
        .collect();
    segments.join("\r")
}

#[async_trait]
impl SerialDeviceHandler for Ncc3300Handler {
    async fn handle(&self, port: SerialStream) -> Result<()> {
        self.run(port).await
    }
}
