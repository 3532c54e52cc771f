//! HL7-level message envelopes and acknowledgments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::patient::Patient;
use crate::specimen::Specimen;

/// Decoded MSH content used to correlate requests with acknowledgments.
///
/// `control_id` must round-trip: the value received on an inbound message is
/// echoed, unmodified, as MSA-2 in the acknowledgment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageHeader {
    pub control_id: String,
    pub sending_application: String,
    pub sending_facility: String,
    pub receiving_application: String,
    pub receiving_facility: String,
    /// Message code from MSH-9.1, e.g. `ORU`.
    pub message_type: String,
    /// Trigger event from MSH-9.2, e.g. `R01`.
    pub trigger_event: String,
    pub version: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// MSA-1 acknowledgment codes.
///
/// Commit-mode codes (`CA`/`CE`/`CR`) are folded into their application-mode
/// counterparts; the BA400 replies with `CA` on enhanced-mode accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckCode {
    Accept,
    ApplicationError,
    Reject,
}

impl AckCode {
    pub fn from_hl7(code: &str) -> Self {
        match code {
            "AA" | "CA" => AckCode::Accept,
            "AR" | "CR" => AckCode::Reject,
            _ => AckCode::ApplicationError,
        }
    }

    pub fn as_hl7(&self) -> &'static str {
        match self {
            AckCode::Accept => "AA",
            AckCode::ApplicationError => "AE",
            AckCode::Reject => "AR",
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, AckCode::Accept)
    }
}

/// Canonical acknowledgment (ACK / MSA pair).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub code: AckCode,
    /// Control ID of the message being acknowledged (MSA-2).
    pub control_id: String,
    pub text: String,
}

/// Unsolicited observation result message (ORU_R01).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OruR01 {
    pub header: MessageHeader,
    pub patients: Vec<Patient>,
}

impl OruR01 {
    /// Convenience constructor for single-specimen results, the shape every
    /// vendor parser produces.
    pub fn from_specimen(specimen: Specimen) -> Self {
        OruR01 {
            header: MessageHeader::default(),
            patients: vec![Patient {
                specimens: vec![specimen],
                ..Patient::default()
            }],
        }
    }

    /// First specimen in the message, if any.
    pub fn first_specimen(&self) -> Option<&Specimen> {
        self.patients.first().and_then(|p| p.specimens.first())
    }
}

/// Unsolicited lab observation message (OUL_R22).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OulR22 {
    pub header: MessageHeader,
    pub patient: Patient,
    pub specimens: Vec<Specimen>,
}

/// General order message (ORM_O01).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrmO01 {
    pub header: MessageHeader,
    pub patient: Patient,
    pub specimens: Vec<Specimen>,
}

/// Query-by-parameter (QBP_Q11): an instrument asking which tests are
/// ordered for a barcode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QbpQ11 {
    pub header: MessageHeader,
    pub query: QueryParameters,
}

/// QPD content. The user-parameter field carries the specimen barcode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryParameters {
    pub query_tag: String,
    pub barcode: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_code_folds_commit_variants() {
        assert_eq!(AckCode::from_hl7("AA"), AckCode::Accept);
        assert_eq!(AckCode::from_hl7("CA"), AckCode::Accept);
        assert_eq!(AckCode::from_hl7("CR"), AckCode::Reject);
        assert_eq!(AckCode::from_hl7("AE"), AckCode::ApplicationError);
        assert_eq!(AckCode::from_hl7(""), AckCode::ApplicationError);
    }

    #[test]
    fn oru_from_specimen_wraps_one_patient() {
        let oru = OruR01::from_specimen(Specimen {
            barcode: "BC9".into(),
            ..Specimen::default()
        });
        assert_eq!(oru.first_specimen().map(|s| s.barcode.as_str()), Some("BC9"));
    }
}
