//! Patient identification as carried in PID segments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::specimen::Specimen;

/// Administrative sex from PID-8.
///
/// Anything other than `M`/`F` collapses to `Unknown`; instruments routinely
/// send `U`, `O` or an empty field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Sex {
    pub fn from_hl7(code: &str) -> Self {
        match code {
            "M" | "m" => Sex::Male,
            "F" | "f" => Sex::Female,
            _ => Sex::Unknown,
        }
    }

    pub fn as_hl7(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Unknown => "U",
        }
    }
}

/// A patient as reconstructed from an inbound message.
///
/// `id` is numeric where the instrument sends a numeric PID-3; alphanumeric
/// identifiers are preserved in `external_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub external_id: String,
    pub first_name: String,
    pub last_name: String,
    pub birthdate: Option<DateTime<Utc>>,
    pub sex: Sex,
    /// Free-text address assembled from PID-11 components.
    pub address: String,
    pub specimens: Vec<Specimen>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sex_mapping_is_lenient() {
        assert_eq!(Sex::from_hl7("M"), Sex::Male);
        assert_eq!(Sex::from_hl7("f"), Sex::Female);
        assert_eq!(Sex::from_hl7("O"), Sex::Unknown);
        assert_eq!(Sex::from_hl7(""), Sex::Unknown);
    }
}
