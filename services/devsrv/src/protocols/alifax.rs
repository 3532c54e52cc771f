//! Alifax ESR analyzer (fixed-width records framed in STX/ETX over serial).
//!
//! Record layout, 29 characters: command(1) workstation(2) patientID(15)
//! rack(2) position(2) cycle(2) result(4) checksum(1). Only `R` records are
//! accepted. The XOR checksum is verified but a mismatch is logged, never
//! rejected; the serial line is noisy and the payload is usually intact.
//!
//! Results convert to a single-ESR ORU: barcode `WBL` + patient ID, test
//! code `ELD` in mm/h. A result with a leading zero is numeric (left zeros
//! stripped); otherwise it is a sentinel code (`-001` not found, `-002` and
//! `-004` not processed) carried as a comment.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_serial::SerialStream;
use tracing::{error, info, warn};

use labwire_model::vendor::AlifaxRecord;
use labwire_model::{ObservationResult, OruR01, Specimen};

use crate::analyzer::Analyzer;
use crate::error::{DevSrvError, Result};
use crate::protocols::SerialDeviceHandler;

const STX: u8 = 0x02;
const ETX: u8 = 0x03;
const RECORD_LEN: usize = 29;

pub struct AlifaxHandler {
    analyzer: Arc<dyn Analyzer>,
}

impl AlifaxHandler {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        AlifaxHandler { analyzer }
    }

    pub async fn run<S: AsyncRead + Unpin + Send>(&self, mut port: S) -> Result<()> {
        let mut chunk = [0u8; 128];
        let mut buffer: Vec<u8> = Vec::new();
        loop {
            let n = port.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buffer.extend_from_slice(&chunk[..n]);

            while let Some(message) = next_stx_etx(&mut buffer) {
                match parse_alifax(&message) {
                    Ok(record) => {
                        info!(
                            patient_id = %record.patient_id,
                            rack = %record.rack,
                            position = %record.position,
                            result = %record.result,
                            "parsed alifax record"
                        );
                        if let Err(e) = self.analyzer.process_oru_r01(to_oru(&record)).await {
                            error!(error = %e, "failed to process alifax result");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, raw = %String::from_utf8_lossy(&message), "bad alifax record")
                    }
                }
            }
        }
    }
}

/// Pop the next STX..ETX payload, discarding noise before the STX. Returns
/// `None` when the buffer holds no complete message yet.
fn next_stx_etx(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let stx = match buffer.iter().position(|&b| b == STX) {
        Some(i) => i,
        None => {
            buffer.clear();
            return None;
        }
    };
    let etx = match buffer[stx + 1..].iter().position(|&b| b == ETX) {
        Some(i) => stx + 1 + i,
        None => {
            buffer.drain(..stx);
            return None;
        }
    };
    let message = buffer[stx + 1..etx].to_vec();
    buffer.drain(..=etx);
    Some(message)
}

pub fn parse_alifax(message: &[u8]) -> Result<AlifaxRecord> {
    if message.len() < RECORD_LEN {
        return Err(DevSrvError::ParseError(format!(
            "alifax record too short: expected {RECORD_LEN} bytes, got {}",
            message.len()
        )));
    }
    // positional byte offsets, so the record must be plain ascii
    if !message[..RECORD_LEN].is_ascii() {
        return Err(DevSrvError::parse("alifax record is not ascii"));
    }

    let field = |range: std::ops::Range<usize>| String::from_utf8_lossy(&message[range]).into_owned();
    let record = AlifaxRecord {
        command: field(0..1),
        workstation: field(1..3),
        patient_id: field(3..18).trim().to_owned(),
        rack: field(18..20),
        position: field(20..22),
        cycle: field(22..24),
        result: field(24..28),
        checksum: field(28..29),
    };

    if record.command != "R" {
        return Err(DevSrvError::ParseError(format!(
            "invalid alifax command: expected 'R', got '{}'",
            record.command
        )));
    }

    if !verify_checksum(&message[..RECORD_LEN - 1], &record.checksum) {
        // lenient on purpose, see module docs
        let mismatch = DevSrvError::ChecksumMismatch(record.patient_id.clone());
        warn!(error = %mismatch, "alifax checksum verification failed");
    }

    Ok(record)
}

fn verify_checksum(data: &[u8], expected: &str) -> bool {
    let checksum = data.iter().fold(0u8, |acc, &b| acc ^ b);
    expected.as_bytes() == [checksum]
}

/// Widen one record into the canonical single-result ORU.
pub fn to_oru(record: &AlifaxRecord) -> OruR01 {
    let mut value = "0".to_owned();
    let mut comment = String::new();
    if record.result.starts_with('0') {
        value = record.result.trim_start_matches('0').to_owned();
        if value.is_empty() {
            value = "0".to_owned();
        }
    } else {
        comment = match record.result.as_str() {
            "-001" => "NF".to_owned(),
            "-002" | "-004" => "NP".to_owned(),
            _ => String::new(),
        };
    }

    OruR01::from_specimen(Specimen {
        barcode: format!("WBL{}", record.patient_id),
        received_at: Some(chrono::Utc::now()),
        observation_results: vec![ObservationResult {
            test_code: "ELD".to_owned(),
            description: comment.clone(),
            values: vec![value],
            value_type: "ELD".to_owned(),
            unit: "mm/h".to_owned(),
            observed_at: Some(chrono::Utc::now()),
            comment,
            ..ObservationResult::default()
        }],
        ..Specimen::default()
    })
}

#[async_trait]
impl SerialDeviceHandler for AlifaxHandler {
    async fn handle(&self, port: SerialStream) -> Result<()> {
        self.run(port).await
    }
}
