//! Coax coagulation analyzer (whitespace-delimited result lines over serial).
//!
//! One result per line, positional fields:
//! `R 0202001465 1 2025/05/28 15:46 1 1 APTT 69.7 s 57 NR 24`
//! Field 7 is a constant `1` and is skipped; everything past the flags
//! column is kept verbatim in `extra`.
//!
//! Lines are split per read; the instrument sends line-at-a-time, so no
//! bytes are carried between reads.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_serial::SerialStream;
use tracing::{debug, error};

use labwire_model::vendor::CoaxResult;

use crate::analyzer::Analyzer;
use crate::error::Result;
use crate::protocols::SerialDeviceHandler;

pub struct CoaxHandler {
    analyzer: Arc<dyn Analyzer>,
}

impl CoaxHandler {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        CoaxHandler { analyzer }
    }

    pub async fn run<S: AsyncRead + Unpin + Send>(&self, mut port: S) -> Result<()> {
        let mut chunk = [0u8; 1024];
        loop {
            let n = port.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            let data = String::from_utf8_lossy(&chunk[..n]);
            for line in data.split('\n') {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let result = parse_line(line);
                debug!(?result, "parsed coax result");
                if let Err(e) = self.analyzer.process_coax(result).await {
                    error!(error = %e, "failed to process coax result");
                }
            }
        }
    }
}

pub fn parse_line(line: &str) -> CoaxResult {
    let cleaned = line.trim_matches(['\x02', '\x03']);
    let fields: Vec<&str> = cleaned.split_whitespace().collect();

    let take = |i: usize| fields.get(i).map(|&f| f.to_owned()).unwrap_or_default();

    CoaxResult {
        record_type: take(0),
        device_id: take(1),
        status: take(2),
        date: take(3),
        time: take(4),
        test_type: take(5),
        test_name: take(7),
        value: take(8),
        unit: take(9),
        reference: take(10),
        flags: take(11),
        extra: fields
            .get(12..)
            .unwrap_or_default()
            .iter()
            .map(|&f| f.to_owned())
            .collect(),
    }
}

#[async_trait]
impl SerialDeviceHandler for CoaxHandler {
    async fn handle(&self, port: SerialStream) -> Result<()> {
        self.run(port).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::CaptureAnalyzer;
    use tokio::io::{duplex, AsyncWriteExt};

    const LINE: &str = "\x02R 0202001465 1 2025/05/28 15:46 1 1 APTT 69.7 s 57 NR 24\x03";

    #[test]
    fn parses_positional_fields() {
        let result = parse_line(LINE);
        assert_eq!(result.record_type, "R");
        assert_eq!(result.device_id, "0202001465");
        assert_eq!(result.status, "1");
        assert_eq!(result.date, "2025/05/28");
        assert_eq!(result.time, "15:46");
        assert_eq!(result.test_name, "APTT");
        assert_eq!(result.value, "69.7");
        assert_eq!(result.unit, "s");
        assert_eq!(result.reference, "57");
        assert_eq!(result.flags, "NR");
        assert_eq!(result.extra, vec!["24"]);
    }

    #[test]
    fn short_lines_fill_what_they_have() {
        let result = parse_line("R 0202001465 1");
        assert_eq!(result.record_type, "R");
        assert_eq!(result.status, "1");
        assert!(result.test_name.is_empty());
        assert!(result.extra.is_empty());
    }

    #[tokio::test]
    async fn forwards_each_line() {
        let analyzer = Arc::new(CaptureAnalyzer::default());
        let handler = CoaxHandler::new(analyzer.clone());

        let (mut tx, rx) = duplex(1024);
        let task = tokio::spawn(async move { handler.run(rx).await });

        tx.write_all(format!("{LINE}\n").as_bytes()).await.unwrap();
        drop(tx);

        task.await.unwrap().unwrap();
        let results = analyzer.coax.lock();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].test_name, "APTT");
    }
}
