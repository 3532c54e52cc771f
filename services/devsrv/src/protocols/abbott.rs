//! Abbott hematology analyzer (semicolon-delimited report over plain TCP).
//!
//! The instrument pushes one whole report per transmission. Labeled lines
//! (`DATE;`, `SID;`, `PID;`...) fill the sample header; any other line with
//! at least eight semicolon fields is a test result. Every read is answered
//! with a 0x06 ACK byte.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use labwire_model::vendor::{AbbottReport, AbbottTestResult};

use crate::analyzer::Analyzer;
use crate::error::Result;
use crate::protocols::TcpDeviceHandler;

const ACK: u8 = 0x06;

pub struct AbbottHandler {
    analyzer: Arc<dyn Analyzer>,
}

impl AbbottHandler {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        AbbottHandler { analyzer }
    }

    pub async fn run<S: AsyncRead + AsyncWrite + Unpin + Send>(&self, mut stream: S) -> Result<()> {
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                info!("abbott connection closed");
                return Ok(());
            }

            let raw = String::from_utf8_lossy(&chunk[..n]);
            debug!(bytes = n, "abbott received data");

            let report = parse_abbott(&raw);
            if report.results.is_empty() {
                warn!("abbott data contained no test results");
            } else {
                let sample_id = report.sample.sample_id.clone();
                let count = report.results.len();
                if let Err(e) = self.analyzer.process_abbott(report).await {
                    error!(error = %e, "failed to process abbott report");
                } else {
                    info!(%sample_id, results = count, "processed abbott report");
                }
            }

            stream.write_all(&[ACK]).await?;
            stream.flush().await?;
        }
    }
}

/// Parse one raw Abbott transmission.
pub fn parse_abbott(raw: &str) -> AbbottReport {
    let mut report = AbbottReport::default();
    let mut date = String::new();
    let mut time = String::new();

    for line in raw.split(['\r', '\n']) {
        let line = line.trim();
        if line.is_empty() || line == "RESULT" {
            continue;
        }

        let parts: Vec<&str> = line.split(';').collect();
        let key = parts[0].trim();
        let value = parts.get(1).map(|v| v.trim()).unwrap_or("");

        match key {
            "DATE" => date = value.to_owned(),
            "TIME" => time = value.to_owned(),
            "MODE" => report.sample.mode = value.to_owned(),
            "UNIT" => report.sample.unit_system = value.to_owned(),
            "SEQ" => report.sample.sequence = value.to_owned(),
            "SID" => report.sample.sample_id = value.to_owned(),
            "PID" => report.sample.patient_id = value.to_owned(),
            "ID" => report.sample.patient_name = value.to_owned(),
            "TYPE" => report.sample.sample_type = value.to_owned(),
            "OPERATOR" => report.sample.operator = value.to_owned(),
            "TEST" => {}
            _ => {
                // device banner, curves and histograms carry no results
                if key.contains("CURVE")
                    || key.contains("HISTOGRAM")
                    || key.contains("EMERALD")
                    || key == "FSE"
                {
                    continue;
                }
                // TestCode;Value;Extra;Flag;RefMin1;RefMin2;RefMax1;RefMax2
                if parts.len() >= 8 {
                    let result = AbbottTestResult {
                        test_code: key.to_owned(),
                        value: parts[1].trim().to_owned(),
                        unit: String::new(),
                        flag: parts[3].trim().to_owned(),
                        ref_min: parts[4].trim().to_owned(),
                        ref_max: parts[6].trim().to_owned(),
                    };
                    if !result.value.is_empty() {
                        report.results.push(result);
                    }
                }
            }
        }
    }

    if !date.is_empty() && !time.is_empty() {
        match parse_abbott_timestamp(&date, &time) {
            Some(ts) => report.timestamp = Some(ts),
            None => warn!(%date, %time, "failed to parse abbott timestamp"),
        }
    }

    report
}

/// `DD/MM/YYYY` + `HH:MM:SS`, taken as instrument-local wall time.
fn parse_abbott_timestamp(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let naive =
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%d/%m/%Y %H:%M:%S").ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[async_trait]
impl TcpDeviceHandler for AbbottHandler {
    async fn handle(&self, stream: TcpStream) -> Result<()> {
        self.run(stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::CaptureAnalyzer;
    use chrono::Datelike;
    use tokio::io::duplex;

    const REPORT: &str = "EMERALD 22\r\nRESULT\r\nDATE;28/05/2025\r\nTIME;14:32:05\r\n\
                          MODE;CBC\r\nSEQ;0042\r\nSID;S-9981\r\nPID;12007\r\nID;DOE JOHN\r\n\
                          TYPE;WB\r\nOPERATOR;tech1\r\n\
                          WBC;7.25;x;H;4.0;;10.0;\r\n\
                          HGB;13.4;x;N;12.0;;16.0;\r\n\
                          WBC CURVE;1;2;3;4;5;6;7;8\r\n";

    #[test]
    fn parses_sample_header_and_results() {
        let report = parse_abbott(REPORT);
        assert_eq!(report.sample.sample_id, "S-9981");
        assert_eq!(report.sample.patient_id, "12007");
        assert_eq!(report.sample.sample_type, "WB");
        assert_eq!(report.results.len(), 2);

        let wbc = &report.results[0];
        assert_eq!(wbc.test_code, "WBC");
        assert_eq!(wbc.value, "7.25");
        assert_eq!(wbc.flag, "H");
        assert_eq!(wbc.ref_min, "4.0");
        assert_eq!(wbc.ref_max, "10.0");

        let ts = report.timestamp.unwrap();
        assert_eq!(ts.year(), 2025);
        assert_eq!(ts.day(), 28);
    }

    #[test]
    fn bad_timestamp_degrades_but_results_survive() {
        let raw = "DATE;2025-05-28\r\nTIME;now\r\nRBC;4.51;x;N;3.8;;5.8;\r\n";
        let report = parse_abbott(raw);
        assert!(report.timestamp.is_none());
        assert_eq!(report.results.len(), 1);
    }

    #[test]
    fn short_lines_and_curves_are_ignored() {
        let raw = "WBC;7.2\r\nPLT HISTOGRAM;1;2;3;4;5;6;7;8\r\n";
        let report = parse_abbott(raw);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn forwards_report_and_acks() {
        let analyzer = Arc::new(CaptureAnalyzer::default());
        let handler = AbbottHandler::new(analyzer.clone());

        let (mut client, server) = duplex(8192);
        let task = tokio::spawn(async move { handler.run(server).await });

        client.write_all(REPORT.as_bytes()).await.unwrap();
        let mut ack = [0u8; 1];
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], ACK);

        drop(client);
        task.await.unwrap().unwrap();
        assert_eq!(analyzer.abbott.lock().len(), 1);
        assert_eq!(analyzer.abbott.lock()[0].sample.patient_id, "12007");
    }
}
