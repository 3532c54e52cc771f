//! CBS400 electrolyte analyzer (fixed-order result lines over serial).
//!
//! A result line is `r<patient-digits>` followed by seven decimal values in
//! fixed order: K, Na, Cl, iCa, nCa, TCa, pH. Each parameter has a plausible
//! range used as a soft validity signal only; out-of-range values are still
//! delivered with `in_range` cleared. Partial lines stay in the buffer until
//! the terminating newline arrives.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_serial::SerialStream;
use tracing::{debug, error, warn};

use labwire_model::vendor::Cbs400Result;

use crate::analyzer::Analyzer;
use crate::error::{DevSrvError, Result};
use crate::protocols::SerialDeviceHandler;

/// Parameter order and units as the instrument prints them.
const PARAMETERS: [(&str, &str); 7] = [
    ("K", "mmol/L"),
    ("Na", "mmol/L"),
    ("Cl", "mmol/L"),
    ("iCa", "mmol/L"),
    ("nCa", "mmol/L"),
    ("TCa", "mmol/L"),
    ("pH", ""),
];

pub struct Cbs400Handler {
    analyzer: Arc<dyn Analyzer>,
    result_line: Regex,
    number: Regex,
}

impl Cbs400Handler {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Cbs400Handler {
            analyzer,
            // "r371                   3.91 141.2 106.5  1.21  1.23  2.46  7.44"
            result_line: Regex::new(r"^r(\d+)\s+([\d\s.]+)$").unwrap(),
            number: Regex::new(r"\d+(?:\.\d+)?").unwrap(),
        }
    }

    pub async fn run<S: AsyncRead + Unpin + Send>(&self, mut port: S) -> Result<()> {
        let mut chunk = [0u8; 1024];
        let mut buffer = String::new();
        loop {
            let n = port.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buffer.push_str(&String::from_utf8_lossy(&chunk[..n]));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_owned();
                buffer.drain(..=newline);
                if line.is_empty() {
                    continue;
                }
                match self.parse_line(&line) {
                    Ok(results) => {
                        for result in results {
                            if let Err(e) = self.analyzer.process_cbs400(result).await {
                                error!(error = %e, "failed to process cbs400 result");
                            }
                        }
                    }
                    Err(e) => debug!(%line, error = %e, "skipping non-result line"),
                }
            }
        }
    }

    pub fn parse_line(&self, line: &str) -> Result<Vec<Cbs400Result>> {
        let captures = self
            .result_line
            .captures(line)
            .ok_or_else(|| DevSrvError::parse("line does not match cbs400 result pattern"))?;
        let patient_id = &captures[1];
        let values_str = &captures[2];

        let numbers: Vec<&str> = self.number.find_iter(values_str).map(|m| m.as_str()).collect();
        if numbers.len() < PARAMETERS.len() {
            return Err(DevSrvError::ParseError(format!(
                "insufficient values: expected {}, got {}",
                PARAMETERS.len(),
                numbers.len()
            )));
        }

        let timestamp = Some(chrono::Utc::now());
        let mut results = Vec::with_capacity(PARAMETERS.len());
        for ((name, unit), raw) in PARAMETERS.iter().zip(&numbers) {
            let value: f64 = match raw.parse() {
                Ok(v) => v,
                Err(_) => {
                    warn!(value = raw, parameter = name, "unparseable cbs400 value");
                    continue;
                }
            };
            let in_range = plausible(name, value);
            if !in_range {
                warn!(parameter = name, value, "cbs400 value out of expected range");
            }
            results.push(Cbs400Result {
                patient_id: patient_id.to_owned(),
                test_name: (*name).to_owned(),
                sample_type: "SER".to_owned(),
                value,
                unit: (*unit).to_owned(),
                in_range,
                timestamp,
            });
        }

        if results.is_empty() {
            return Err(DevSrvError::parse("no values parsed from result line"));
        }
        Ok(results)
    }
}

fn plausible(parameter: &str, value: f64) -> bool {
    match parameter {
        "K" => (1.0..=10.0).contains(&value),
        "Na" => (100.0..=200.0).contains(&value),
        "Cl" => (50.0..=150.0).contains(&value),
        "iCa" | "nCa" => (0.5..=3.0).contains(&value),
        "TCa" => (1.0..=5.0).contains(&value),
        "pH" => (6.0..=8.0).contains(&value),
        _ => true,
    }
}

#[async_trait]
impl SerialDeviceHandler for Cbs400Handler {
    async fn handle(&self, port: SerialStream) -> Result<()> {
        self.run(port).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::CaptureAnalyzer;
    use tokio::io::{duplex, AsyncWriteExt};

    const LINE: &str = "r371                   3.91 141.2 106.5  1.21  1.23  2.46  7.44";

    fn handler() -> Cbs400Handler {
        Cbs400Handler::new(Arc::new(CaptureAnalyzer::default()))
    }

    #[test]
    fn parses_seven_parameters_in_order() {
        let results = handler().parse_line(LINE).unwrap();
        assert_eq!(results.len(), 7);
        assert!(results.iter().all(|r| r.patient_id == "371"));
        assert!(results.iter().all(|r| r.in_range));

        assert_eq!(results[0].test_name, "K");
        assert_eq!(results[0].value, 3.91);
        assert_eq!(results[1].test_name, "Na");
        assert_eq!(results[1].value, 141.2);
        assert_eq!(results[6].test_name, "pH");
        assert_eq!(results[6].value, 7.44);
        assert_eq!(results[6].unit, "");
    }

    #[test]
    fn out_of_range_value_is_flagged_not_dropped() {
        let line = "r12  0.20 141.2 106.5  1.21  1.23  2.46  7.44";
        let results = handler().parse_line(line).unwrap();
        assert_eq!(results.len(), 7);
        assert!(!results[0].in_range); // K = 0.20
        assert!(results[1].in_range);
    }

    #[test]
    fn non_result_lines_are_rejected() {
        let h = handler();
        assert!(h.parse_line("CBS400 READY").is_err());
        assert!(h.parse_line("r12  3.91 141.2").is_err()); // too few values
    }

    #[tokio::test]
    async fn partial_line_waits_for_newline() {
        let analyzer = Arc::new(CaptureAnalyzer::default());
        let handler = Cbs400Handler::new(analyzer.clone());

        let (mut tx, rx) = duplex(1024);
        let task = tokio::spawn(async move { handler.run(rx).await });

        let (head, tail) = LINE.split_at(20);
        tx.write_all(head.as_bytes()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(analyzer.cbs400.lock().is_empty());

        tx.write_all(tail.as_bytes()).await.unwrap();
        tx.write_all(b"\n").await.unwrap();
        drop(tx);

        task.await.unwrap().unwrap();
        assert_eq!(analyzer.cbs400.lock().len(), 7);
    }
}
