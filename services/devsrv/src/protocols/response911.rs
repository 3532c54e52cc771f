//! Response 911 coagulation analyzer (ASTM-like framing over plain TCP).
//!
//! Frames are STX + payload + ETX (checksum and trailing CR after the ETX
//! are skipped). Frame payloads accumulate until a terminator record (second
//! character `L`) arrives, then the assembled message is parsed. The
//! instrument reports one test per message, so parsed results go through the
//! per-barcode aggregator instead of straight downstream. Every read is
//! answered with a single 0x06 ACK byte.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use labwire_model::{ObservationResult, OruR01, Specimen};

use crate::aggregate::ResultAggregator;
use crate::error::{DevSrvError, Result};
use crate::protocols::TcpDeviceHandler;

const STX: char = '\x02';
const ETX: char = '\x03';
const ACK: u8 = 0x06;

pub struct Response911Handler {
    aggregator: ResultAggregator,
}

impl Response911Handler {
    pub fn new(aggregator: ResultAggregator) -> Self {
        Response911Handler { aggregator }
    }

    pub async fn run<S: AsyncRead + AsyncWrite + Unpin + Send>(&self, mut stream: S) -> Result<()> {
        let mut chunk = [0u8; 4096];
        // raw socket bytes, may hold partial frames
        let mut conn_buf = String::new();
        // assembled frame payloads waiting for the terminator record
        let mut message = String::new();

        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                info!("response911 connection closed");
                return Ok(());
            }
            conn_buf.push_str(&String::from_utf8_lossy(&chunk[..n]));
            debug!(bytes = n, "response911 received data");

            while let Some(frame) = next_frame(&mut conn_buf) {
                message.push_str(&frame);
                if !frame.ends_with('\r') {
                    message.push('\r');
                }

                if !has_terminator_record(&message) {
                    continue;
                }
                let raw = message.trim_matches(['\r', '\n']).to_owned();
                message.clear();

                match parse_response911(&raw) {
                    Ok(oru) => {
                        if let Some(spec) = oru.first_specimen() {
                            if let Some(first) = spec.observation_results.first() {
                                info!(
                                    barcode = %spec.barcode,
                                    test_code = %first.test_code,
                                    value = %first.first_value(),
                                    "response911 result queued"
                                );
                            }
                        }
                        self.aggregator.add(oru).await;
                    }
                    Err(e) => error!(error = %e, %raw, "failed to parse response911 message"),
                }
            }

            stream.write_all(&[ACK]).await?;
            stream.flush().await?;
        }
    }
}

/// Pop the next complete STX..ETX frame payload off the buffer, or `None`
/// when only a partial frame remains.
fn next_frame(buf: &mut String) -> Option<String> {
    let stx = buf.find(STX)?;
    let etx_rel = buf[stx + 1..].find(ETX)?;
    let etx = stx + 1 + etx_rel;
    let frame = buf[stx + 1..etx].to_owned();
    // checksum and CR after the ETX are left behind and skipped as noise
    buf.drain(..=etx);
    Some(frame)
}

fn has_terminator_record(assembled: &str) -> bool {
    assembled
        .split('\r')
        .map(str::trim)
        .any(|line| line.len() >= 2 && line.as_bytes()[1] == b'L')
}

/// Parse an assembled ASTM-like message. Record examples:
/// `4O|1|<barcode>|...`, `5R|1|^^^^UA|4.21|mg/dL|...`, `4L|1|N`.
pub fn parse_response911(raw: &str) -> Result<OruR01> {
    if raw.trim().is_empty() {
        return Err(DevSrvError::parse("empty message"));
    }

    let mut barcode = String::new();
    let mut results = Vec::new();

    for line in raw.split(['\r', '\n']) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('|').collect();
        let record_id = parts[0];
        if record_id.len() < 2 {
            continue;
        }

        match record_id.as_bytes()[1] {
            b'O' => {
                // order record carries the barcode in field 3
                if parts.len() > 2 && barcode.is_empty() {
                    barcode = parts[2].trim().to_owned();
                }
            }
            b'R' => {
                if parts.len() > 3 {
                    let test_field = parts[2];
                    let value = parts[3].trim();
                    let unit = parts.get(4).copied().unwrap_or("");

                    // test code is the last non-empty component (^^^^UA)
                    let mut code = labwire_hl7::message::last_component(test_field);
                    if code.is_empty() {
                        code = test_field;
                    }

                    results.push(ObservationResult {
                        test_code: code.to_owned(),
                        values: vec![value.to_owned()],
                        value_type: code.to_owned(),
                        unit: unit.to_owned(),
                        observed_at: Some(chrono::Utc::now()),
                        ..ObservationResult::default()
                    });
                }
            }
            _ => {}
        }
    }

    if barcode.is_empty() {
        warn!(%raw, "response911 message has no barcode");
    }
    if results.is_empty() {
        return Err(DevSrvError::parse("no results found in message"));
    }

    Ok(OruR01::from_specimen(Specimen {
        barcode,
        received_at: Some(chrono::Utc::now()),
        observation_results: results,
        ..Specimen::default()
    }))
}

#[async_trait]
impl TcpDeviceHandler for Response911Handler {
    async fn handle(&self, stream: TcpStream) -> Result<()> {
        self.run(stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::CaptureAnalyzer;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::duplex;

    #[test]
    fn parses_barcode_test_and_value() {
        let raw = "1H|\\^&\r4O|1|BC555||^^^^UA\r5R|1|^^^^UA|4.21|mg/dL||N\r4L|1|N";
        let oru = parse_response911(raw).unwrap();
        let spec = oru.first_specimen().unwrap();
        assert_eq!(spec.barcode, "BC555");
        assert_eq!(spec.observation_results.len(), 1);
        let result = &spec.observation_results[0];
        assert_eq!(result.test_code, "UA");
        assert_eq!(result.first_value(), "4.21");
        assert_eq!(result.unit, "mg/dL");
    }

    #[test]
    fn message_without_results_is_parse_error() {
        let raw = "1H|\\^&\r4O|1|BC1\r4L|1|N";
        assert!(matches!(
            parse_response911(raw),
            Err(DevSrvError::ParseError(_))
        ));
    }

    #[test]
    fn frame_extraction_skips_checksum_noise() {
        let mut buf = "\x024O|1|BC9\x03A7\r\x025R|1|^^^^PT|12.1|s\x03".to_owned();
        assert_eq!(next_frame(&mut buf).as_deref(), Some("4O|1|BC9"));
        assert_eq!(next_frame(&mut buf).as_deref(), Some("5R|1|^^^^PT|12.1|s"));
        assert_eq!(next_frame(&mut buf), None);
    }

    #[tokio::test]
    async fn assembles_fragmented_frames_and_acks() {
        let analyzer = Arc::new(CaptureAnalyzer::default());
        let aggregator = ResultAggregator::new(analyzer.clone(), Duration::from_millis(30));
        let handler = Response911Handler::new(aggregator);

        let (mut client, server) = duplex(8192);
        let task = tokio::spawn(async move { handler.run(server).await });

        // one frame split across two writes, then the terminator frame
        client.write_all(b"\x024O|1|BC777\x03\r\x025R|1|^^").await.unwrap();
        let mut ack = [0u8; 1];
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], ACK);

        client
            .write_all(b"^^GLU|99|mg/dL\x03\r\x024L|1|N\x03\r")
            .await
            .unwrap();
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], ACK);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let orus = analyzer.oru_messages();
        assert_eq!(orus.len(), 1);
        let spec = orus[0].first_specimen().unwrap();
        assert_eq!(spec.barcode, "BC777");
        assert_eq!(spec.observation_results[0].test_code, "GLU");

        drop(client);
        task.await.unwrap().unwrap();
    }
}
