//! Diestro electrolyte analyzer (printer-style report blocks over serial).
//!
//! Reports are delimited by runs of five or more `=` characters. The text
//! between delimiters is a dot-matrix printout: banner lines, a starred test
//! header, a patient number, a date line and the measurements, with layout
//! that drifts between firmware revisions. Each block is cleaned (control
//! characters to spaces, stray symbols stripped, whitespace collapsed) and
//! parsed by three fallback strategies per line:
//!
//! 1. `NAME=VALUE UNIT` (also `NAME = VALUE UNIT`)
//! 2. `NAME VALUE UNIT`
//! 3. bare `VALUE UNIT`, assigned in order to header test names not already
//!    matched, or to synthesized `ANON01, ANON02, ...` names.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_serial::SerialStream;
use tracing::{debug, error};

use labwire_model::vendor::DiestroResult;

use crate::analyzer::Analyzer;
use crate::error::Result;
use crate::protocols::SerialDeviceHandler;

/// Lines containing any of these are never measurements.
const SKIP_WORDS: [&str; 9] = [
    "analyzer",
    "laboratorio",
    "electrolyte",
    "report",
    "mem",
    "patient",
    "sn:",
    "====",
    "-----",
];

struct Patterns {
    delimiter: Regex,
    named_eq: Regex,
    named_prefix: Regex,
    value_line: Regex,
    date: Regex,
    time: Regex,
    short_time: Regex,
    only_digits: Regex,
    rule_runs: Regex,
    bad_chars: Regex,
    spaces: Regex,
}

impl Patterns {
    fn new() -> Self {
        Patterns {
            delimiter: Regex::new(r"={5,}").unwrap(),
            named_eq: Regex::new(r"(?i)^([A-Za-z]{1,8})\s*=\s*([0-9]+(?:\.[0-9]+)?)\s*([a-zA-Zμ%/]+)$").unwrap(),
            named_prefix: Regex::new(r"(?i)^([A-Za-z]{1,8})\s+([0-9]+(?:\.[0-9]+)?)\s*([a-zA-Zμ%/]+)$").unwrap(),
            value_line: Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*([a-zA-Zμ%/]+)$").unwrap(),
            date: Regex::new(r"\d{4}/\d{2}/\d{2}").unwrap(),
            time: Regex::new(r"\d{2}:\d{2}:\d{2}").unwrap(),
            short_time: Regex::new(r"\d{2}:\d{2}").unwrap(),
            only_digits: Regex::new(r"^\d{3,10}$").unwrap(),
            rule_runs: Regex::new(r"(?:=|-){3,}").unwrap(),
            bad_chars: Regex::new(r"[^\p{L}\p{N}\s=./:%μ+\-()]").unwrap(),
            spaces: Regex::new(r"\s+").unwrap(),
        }
    }
}

pub struct DiestroHandler {
    analyzer: Arc<dyn Analyzer>,
    patterns: Patterns,
}

impl DiestroHandler {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        DiestroHandler {
            analyzer,
            patterns: Patterns::new(),
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
            self.drain_buffer(&mut buffer).await;
        }
    }

    /// Process every delimiter-terminated report in the buffer; bytes after
    /// the last delimiter stay for the next read.
    async fn drain_buffer(&self, buffer: &mut String) {
        let Some(last) = self.patterns.delimiter.find_iter(buffer).last() else {
            return;
        };
        let reports = buffer[..last.end()].to_owned();
        let remainder = buffer[last.end()..].to_owned();
        *buffer = remainder;

        for part in self.patterns.delimiter.split(&reports) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let cleaned = self.clean_report(part);
            let results = self.parse_report(&cleaned);
            if results.is_empty() {
                debug!(report = part, "diestro report yielded no results");
            }
            for result in results {
                if let Err(e) = self.analyzer.process_diestro(result).await {
                    error!(error = %e, "failed to process diestro result");
                }
            }
        }
    }

    /// Normalize one report block into trimmed, single-spaced lines.
    fn clean_report(&self, report: &str) -> String {
        let s = report.replace("\r\n", "\n").replace('\r', "\n");
        let s = self.patterns.rule_runs.replace_all(&s, "\n");

        let s: String = s
            .chars()
            .map(|c| {
                if c == '\n' || !c.is_control() {
                    c
                } else {
                    ' '
                }
            })
            .collect();
        let s = self.patterns.bad_chars.replace_all(&s, " ");

        s.split('\n')
            .map(|line| self.patterns.spaces.replace_all(line, " ").trim().to_owned())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn parse_report(&self, cleaned: &str) -> Vec<DiestroResult> {
        let lines: Vec<&str> = cleaned.split('\n').collect();
        let header_tests = self.parse_header(&lines);
        let patient_id = self.find_patient_id(&lines);
        let timestamp = self.find_timestamp(&lines);

        let mut results = Vec::new();
        let mut found_names: Vec<String> = Vec::new();
        let mut unnamed: Vec<(f64, String)> = Vec::new();

        for raw in &lines {
            let line = raw.trim();
            if line.is_empty() || self.should_skip(line) {
                continue;
            }

            if let Some(captures) = self.patterns.named_eq.captures(line) {
                if let Ok(value) = captures[2].parse::<f64>() {
                    let name = captures[1].trim().to_uppercase();
                    results.push(self.result(&patient_id, &name, value, captures[3].trim(), timestamp));
                    found_names.push(name);
                }
                continue;
            }

            if let Some(captures) = self.patterns.named_prefix.captures(line) {
                if let Ok(value) = captures[2].parse::<f64>() {
                    let name = captures[1].trim().to_uppercase();
                    results.push(self.result(&patient_id, &name, value, captures[3].trim(), timestamp));
                    found_names.push(name);
                }
                continue;
            }

            if let Some(captures) = self.patterns.value_line.captures(line) {
                if let Ok(value) = captures[1].parse::<f64>() {
                    unnamed.push((value, captures[2].trim().to_owned()));
                }
            }
            // anything else is serial noise, firmware banners or versions
        }

        // hand unnamed values the header names not already matched
        let remaining: Vec<String> = header_tests
            .iter()
            .map(|name| name.trim().to_uppercase())
            .filter(|name| !name.is_empty() && !found_names.contains(name))
            .collect();

        for (i, (value, unit)) in unnamed.into_iter().enumerate() {
            let name = remaining
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("ANON{:02}", i + 1));
            results.push(self.result(&patient_id, &name, value, &unit, timestamp));
        }

        results
    }

    fn result(
        &self,
        patient_id: &str,
        test_name: &str,
        value: f64,
        unit: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> DiestroResult {
        DiestroResult {
            patient_id: patient_id.to_owned(),
            test_name: test_name.to_owned(),
            sample_type: "SER".to_owned(),
            value,
            unit: unit.to_owned(),
            timestamp,
        }
    }

    fn should_skip(&self, line: &str) -> bool {
        let lowered = line.to_lowercase();
        SKIP_WORDS.iter().any(|word| lowered.contains(word))
    }

    /// Patient ID is either labeled (`Patient: 12345`, possibly on the next
    /// line) or the first bare 3-10 digit line that is not a `mem` counter.
    fn find_patient_id(&self, lines: &[&str]) -> String {
        for (i, line) in lines.iter().enumerate() {
            if !line.to_lowercase().starts_with("patient") {
                continue;
            }
            if let Some(colon) = line.find(':') {
                let candidate = line[colon + 1..].trim();
                if self.patterns.only_digits.is_match(candidate) {
                    return candidate.to_owned();
                }
            }
            if let Some(next) = lines.get(i + 1) {
                let candidate = next.trim();
                if self.patterns.only_digits.is_match(candidate) {
                    return candidate.to_owned();
                }
            }
        }

        for line in lines {
            let trimmed = line.trim();
            if trimmed.to_lowercase().starts_with("mem") {
                continue;
            }
            if self.patterns.only_digits.is_match(trimmed) {
                return trimmed.to_owned();
            }
        }
        String::new()
    }

    /// First `YYYY/MM/DD` token, paired with an adjacent `HH:MM[:SS]` (same
    /// line or the next), seconds defaulting to zero.
    fn find_timestamp(&self, lines: &[&str]) -> Option<DateTime<Utc>> {
        for (i, line) in lines.iter().enumerate() {
            let Some(date) = self.patterns.date.find(line) else {
                continue;
            };
            let time = if let Some(m) = self.patterns.time.find(line) {
                m.as_str().to_owned()
            } else if let Some(m) = self.patterns.short_time.find(line) {
                format!("{}:00", m.as_str())
            } else if let Some(m) = lines.get(i + 1).and_then(|l| self.patterns.short_time.find(l)) {
                format!("{}:00", m.as_str())
            } else {
                "00:00:00".to_owned()
            };

            let parsed = NaiveDateTime::parse_from_str(
                &format!("{} {}", date.as_str(), time),
                "%Y/%m/%d %H:%M:%S",
            )
            .ok()?;
            return Some(DateTime::from_naive_utc_and_offset(parsed, Utc));
        }
        None
    }

    /// Test names come from a starred header (`*Na* *K* *Cl*`) or, failing
    /// that, a short line of 2-6 short words.
    fn parse_header(&self, lines: &[&str]) -> Vec<String> {
        for line in lines {
            if !line.contains('*') {
                continue;
            }
            let names: Vec<String> = line
                .split('*')
                .filter_map(|part| {
                    let prefix: String = part
                        .trim()
                        .chars()
                        .take_while(|c| c.is_alphanumeric())
                        .collect();
                    (!prefix.is_empty()).then_some(prefix)
                })
                .collect();
            if !names.is_empty() {
                return names;
            }
        }

        for line in lines {
            let words: Vec<&str> = line.split_whitespace().collect();
            if (2..=6).contains(&words.len())
                && words.iter().all(|w| {
                    let word = w.trim_matches([' ', '*']);
                    (1..=6).contains(&word.len()) && word.chars().all(char::is_alphabetic)
                })
            {
                return words
                    .iter()
                    .map(|w| w.trim_matches([' ', '*']).to_owned())
                    .collect();
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl SerialDeviceHandler for DiestroHandler {
    async fn handle(&self, port: SerialStream) -> Result<()> {
        self.run(port).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::CaptureAnalyzer;
    use tokio::io::{duplex, AsyncWriteExt};

    fn handler() -> DiestroHandler {
        DiestroHandler::new(Arc::new(CaptureAnalyzer::default()))
    }

    #[test]
    fn named_equals_lines_parse_directly() {
        let h = handler();
        let report = "ELECTROLYTE REPORT\nPatient: 12345\n2025/03/10 09:41\nNa=141.7mmol\nK = 4.2 mmol\nCl=106.4 mmol";
        let results = h.parse_report(&h.clean_report(report));
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.patient_id == "12345"));
        assert_eq!(results[0].test_name, "NA");
        assert_eq!(results[0].value, 141.7);
        assert_eq!(results[1].test_name, "K");
        assert_eq!(results[2].unit, "mmol");
        assert!(results[0].timestamp.is_some());
    }

    #[test]
    fn name_prefix_lines_parse_without_equals() {
        let h = handler();
        let report = "Patient: 60042\nNa 141.7 mmol\nK 4.2 mmol";
        let results = h.parse_report(&h.clean_report(report));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].test_name, "NA");
        assert_eq!(results[0].value, 141.7);
        assert_eq!(results[0].unit, "mmol");
        assert_eq!(results[1].test_name, "K");
        assert!(results.iter().all(|r| r.patient_id == "60042"));
    }

    #[test]
    fn bare_values_take_header_names_in_order() {
        let h = handler();
        let report = "*Na* *K* *Cl*\n887766\n141.7 mmol\n4.2 mmol\n106.4 mmol";
        let results = h.parse_report(&h.clean_report(report));
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].test_name, "NA");
        assert_eq!(results[1].test_name, "K");
        assert_eq!(results[2].test_name, "CL");
        assert!(results.iter().all(|r| r.patient_id == "887766"));
    }

    #[test]
    fn surplus_bare_values_get_anon_names() {
        let h = handler();
        let report = "555123\n141.7 mmol\n4.2 mmol";
        let results = h.parse_report(&h.clean_report(report));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].test_name, "ANON01");
        assert_eq!(results[1].test_name, "ANON02");
    }

    #[test]
    fn mem_counter_is_not_a_patient_id() {
        let h = handler();
        let lines = vec!["mem 004", "0042", "771234"];
        // "0042" is bare digits and wins; "mem 004" is excluded
        assert_eq!(h.find_patient_id(&lines), "0042");
        let lines = vec!["mem", "771234"];
        assert_eq!(h.find_patient_id(&lines), "771234");
    }

    #[test]
    fn date_without_seconds_defaults_them() {
        let h = handler();
        let ts = h.find_timestamp(&["2025/03/10 09:41"]).unwrap();
        assert_eq!(ts.format("%Y%m%d%H%M%S").to_string(), "20250310094100");
        assert!(h.find_timestamp(&["no date here"]).is_none());
    }

    #[tokio::test]
    async fn partial_report_waits_for_delimiter() {
        let analyzer = Arc::new(CaptureAnalyzer::default());
        let handler = DiestroHandler::new(analyzer.clone());

        let (mut tx, rx) = duplex(2048);
        let task = tokio::spawn(async move { handler.run(rx).await });

        tx.write_all(b"Patient: 400100\nNa=141.7mmol\n").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(analyzer.diestro.lock().is_empty());

        tx.write_all(b"K=4.2mmol\n========\n").await.unwrap();
        drop(tx);

        task.await.unwrap().unwrap();
        let results = analyzer.diestro.lock();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].patient_id, "400100");
    }
}
