//! Specimens and the observations ordered on / reported for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A physical specimen identified by its barcode.
///
/// The barcode is the only correlation key that survives fragmented delivery:
/// instruments frequently report one test per connection, and everything the
/// engine later merges back together hangs off this field. It is unique only
/// within a correlation window, never globally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Specimen {
    pub barcode: String,
    /// Specimen type code (SPM-4 identifier, e.g. `SER`, `URI`).
    pub specimen_type: String,
    pub collected_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub observation_requests: Vec<ObservationRequest>,
    pub observation_results: Vec<ObservationResult>,
}

/// One ordered test (OBR).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationRequest {
    pub test_code: String,
    pub description: String,
    pub requested_at: Option<DateTime<Utc>>,
    pub result_status: String,
}

/// One reported observation (OBX).
///
/// `values` is ordered; multi-valued observations (OBX-5 repetitions) keep
/// their wire order. `picked` marks the value selected by downstream QC.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationResult {
    pub test_code: String,
    pub description: String,
    pub values: Vec<String>,
    pub value_type: String,
    pub unit: String,
    pub reference_range: String,
    pub abnormal_flags: Vec<String>,
    pub observed_at: Option<DateTime<Utc>>,
    pub comment: String,
    pub picked: bool,
}

impl ObservationResult {
    /// First reported value, or empty when the instrument sent none.
    pub fn first_value(&self) -> &str {
        self.values.first().map(String::as_str).unwrap_or("")
    }
}
