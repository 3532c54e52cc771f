//! VerifyU120 urine strip analyzer (labeled report lines over serial).
//!
//! `ID:` and `Date:` lines set the patient and timestamp; every other
//! non-header line is a strip parameter. Results are frequently qualitative
//! (`neg`, `1+`, `3+`): the literal text is preserved in `value_str` while
//! the numeric value falls back to 0.
//!
//! Each read is parsed on its own; the instrument prints one complete report
//! per transmission, so no bytes are carried across reads.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_serial::SerialStream;
use tracing::{debug, error};

use labwire_model::vendor::VerifyResult;

use crate::analyzer::Analyzer;
use crate::error::Result;
use crate::protocols::SerialDeviceHandler;

pub struct VerifyU120Handler {
    analyzer: Arc<dyn Analyzer>,
    id_line: Regex,
    date_line: Regex,
    result_line: Regex,
}

impl VerifyU120Handler {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        VerifyU120Handler {
            analyzer,
            id_line: Regex::new(r"ID\s*:\s*(\d+)").unwrap(),
            date_line: Regex::new(r"Date\s*:\s*(.+)").unwrap(),
            // strip parameters, optionally starred: "*BLD  1+   0.3 g/L"
            result_line: Regex::new(r"^\s*\*?([A-Z]{2,4}|pH)\s+(.+)$").unwrap(),
        }
    }

    pub async fn run<S: AsyncRead + Unpin + Send>(&self, mut port: S) -> Result<()> {
        let mut chunk = [0u8; 1024];
        loop {
            let n = port.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            let data = String::from_utf8_lossy(&chunk[..n]);
            for result in self.parse_report(&data) {
                if let Err(e) = self.analyzer.process_verify_u120(result).await {
                    error!(error = %e, "failed to process verify u120 result");
                }
            }
        }
    }

    pub fn parse_report(&self, data: &str) -> Vec<VerifyResult> {
        let mut patient_id = String::new();
        let mut timestamp: Option<DateTime<Utc>> = None;
        let mut results = Vec::new();

        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(captures) = self.id_line.captures(line) {
                patient_id = captures[1].to_owned();
                continue;
            }

            if let Some(captures) = self.date_line.captures(line) {
                timestamp = parse_date(captures[1].trim());
                continue;
            }

            if line.starts_with("Operator:")
                || line.starts_with("No.")
                || line.contains("param |")
                || line.contains("hasil |")
            {
                continue;
            }

            if let Some(captures) = self.result_line.captures(line) {
                let test_name = captures[1].to_owned();
                let (value, value_str, unit) = parse_result_value(captures[2].trim());
                debug!(%test_name, %value_str, value, %unit, "parsed urine result");
                results.push(VerifyResult {
                    patient_id: patient_id.clone(),
                    test_name,
                    sample_type: "URI".to_owned(),
                    value,
                    value_str,
                    unit,
                    timestamp,
                });
            }
        }

        results
    }
}

/// `DD-MM-YYYY HH:MM`, with an optional trailing meridiem marker.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    for layout in ["%d-%m-%Y %H:%M %p", "%d-%m-%Y %H:%M", "%m-%d-%Y %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    None
}

/// Split a result cell into numeric value, display string and unit.
///
/// Shapes seen on the wire: `6.0` (pH), `-` / `- neg` (negative), `1+ 0.3`
/// (qualitative with concentration), `3.5 umol/L`, `1+ 0.3 g/L`.
fn parse_result_value(raw: &str) -> (f64, String, String) {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.is_empty() {
        return (0.0, String::new(), String::new());
    }

    // "-" followed by a number: negative marker with trailing concentration
    if parts[0] == "-" && parts.len() > 1 {
        for i in 1..parts.len() {
            if let Ok(value) = parts[i].parse::<f64>() {
                let unit = parts
                    .get(i + 1)
                    .filter(|&&u| u != "neg")
                    .map(|&u| u.to_owned())
                    .unwrap_or_default();
                return (value, parts[i].to_owned(), unit);
            }
        }
    }

    // purely negative
    if parts[0] == "-" && (parts.len() == 1 || parts.last() == Some(&"neg")) {
        return (0.0, "neg".to_owned(), String::new());
    }

    if parts.len() == 1 {
        return match parts[0].parse::<f64>() {
            Ok(value) => (value, parts[0].to_owned(), String::new()),
            Err(_) => (0.0, parts[0].to_owned(), String::new()),
        };
    }

    if parts.len() == 2 {
        let qualitative = parts[0].contains('+') || parts[0].contains('-');
        if qualitative {
            return match parts[1].parse::<f64>() {
                Ok(value) => (value, parts[0].to_owned(), String::new()),
                Err(_) => (0.0, parts[0].to_owned(), String::new()),
            };
        }
        if let Ok(value) = parts[0].parse::<f64>() {
            return (value, parts[0].to_owned(), parts[1].to_owned());
        }
        return (0.0, parts.join(" "), String::new());
    }

    // three or more tokens: first numeric wins, qualitative prefix kept
    for (i, part) in parts.iter().enumerate() {
        if let Ok(value) = part.parse::<f64>() {
            let unit = parts
                .get(i + 1)
                .filter(|&&u| u != "neg")
                .map(|&u| u.to_owned())
                .unwrap_or_default();
            let value_str = if i > 0 && (parts[0].contains('+') || parts[0].contains('-')) {
                parts[0].to_owned()
            } else {
                (*part).to_owned()
            };
            return (value, value_str, unit);
        }
    }
    (0.0, parts[0].to_owned(), String::new())
}

#[async_trait]
impl SerialDeviceHandler for VerifyU120Handler {
    async fn handle(&self, port: SerialStream) -> Result<()> {
        self.run(port).await
    }
}
