//! Values produced by the non-HL7 vendor parsers.
//!
//! Each parser emits its own narrow result type; the analyzer boundary (or
//! the aggregator, for fragment-per-connection instruments) widens these into
//! canonical [`crate::ObservationResult`] values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One measurement from a Diestro electrolyte analyzer report block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiestroResult {
    pub patient_id: String,
    pub test_name: String,
    pub sample_type: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One parameter from a CBS400 electrolyte result line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cbs400Result {
    pub patient_id: String,
    pub test_name: String,
    pub sample_type: String,
    pub value: f64,
    pub unit: String,
    /// Soft plausibility signal; out-of-range values are still delivered.
    pub in_range: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One strip parameter from a VerifyU120 urine analyzer report.
///
/// Qualitative results (`neg`, `1+`, `3+`) keep their literal text in
/// `value_str` while `value` falls back to 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub patient_id: String,
    pub test_name: String,
    pub sample_type: String,
    pub value: f64,
    pub value_str: String,
    pub unit: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One coagulation result line from a Coax analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoaxResult {
    pub record_type: String,
    pub device_id: String,
    pub status: String,
    pub date: String,
    pub time: String,
    pub test_type: String,
    pub test_name: String,
    pub value: String,
    pub unit: String,
    pub reference: String,
    pub flags: String,
    pub extra: Vec<String>,
}

/// Header fields of an Abbott hematology report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbbottSample {
    pub sequence: String,
    pub sample_id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub sample_type: String,
    pub mode: String,
    pub unit_system: String,
    pub operator: String,
}

/// One captured test line from an Abbott report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbbottTestResult {
    pub test_code: String,
    pub value: String,
    pub unit: String,
    pub flag: String,
    pub ref_min: String,
    pub ref_max: String,
}

/// A complete parsed Abbott report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbbottReport {
    pub sample: AbbottSample,
    pub results: Vec<AbbottTestResult>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One fixed-width ESR record from an Alifax analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlifaxRecord {
    pub command: String,
    pub workstation: String,
    pub patient_id: String,
    pub rack: String,
    pub position: String,
    pub cycle: String,
    pub result: String,
    pub checksum: String,
}
