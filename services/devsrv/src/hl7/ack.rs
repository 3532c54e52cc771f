//! Acknowledgment construction.

use chrono::Utc;
use labwire_hl7::segments::{Msa, Msh};
use labwire_hl7::{format_ts, serialize_message, serialize_segment};
use labwire_model::MessageHeader;

use crate::config::Hl7Identity;

/// Build the serialized ACK for an inbound message.
///
/// Sending and receiving application/facility are swapped relative to the
/// request, and the control ID is copied through unchanged into both MSH-10
/// and MSA-2 so the instrument can correlate the reply.
pub fn build_ack(identity: &Hl7Identity, request: &MessageHeader) -> String {
    let mut msh = Msh::default();
    msh.field_separator = "|".to_owned();
    msh.encoding_characters = "^~\\&".to_owned();
    msh.sending_application = identity.application.clone();
    msh.sending_facility = identity.facility.clone();
    msh.receiving_application = request.sending_application.clone();
    msh.receiving_facility = request.sending_facility.clone();
    msh.datetime_of_message = format_ts(Utc::now());
    msh.message_type = if request.trigger_event.is_empty() {
        "ACK".to_owned()
    } else {
        format!("ACK^{}^ACK", request.trigger_event)
    };
    msh.message_control_id = request.control_id.clone();
    msh.processing_id = "P".to_owned();
    msh.version_id = identity.version.clone();
    msh.accept_ack_type = "ER".to_owned();
    msh.application_ack_type = "AL".to_owned();
    msh.country_code = identity.country_code.clone();
    msh.character_set = "UNICODE UTF-8".to_owned();
    msh.message_profile_identifier = "LAB-28^IHE".to_owned();

    let mut msa = Msa::default();
    msa.acknowledgment_code = "AA".to_owned();
    msa.message_control_id = request.control_id.clone();
    msa.text_message = "Message accepted".to_owned();

    serialize_message(&[serialize_segment(&msh), serialize_segment(&msa)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_header() -> MessageHeader {
        MessageHeader {
            control_id: "CTRL-42".into(),
            sending_application: "BA400".into(),
            sending_facility: "BioLab".into(),
            receiving_application: "LIS".into(),
            receiving_facility: "Lab01".into(),
            message_type: "OUL".into(),
            trigger_event: "R22".into(),
            version: "2.5.1".into(),
            timestamp: None,
        }
    }

    #[test]
    fn ack_swaps_endpoints_and_echoes_control_id() {
        let ack = build_ack(&Hl7Identity::default(), &request_header());
        let mut lines = ack.split('\r');
        let msh = lines.next().unwrap();
        let msa = lines.next().unwrap();

        let fields: Vec<&str> = msh.split('|').collect();
        // MSH|^~\&|LIS|Lab01|BA400|BioLab|...
        assert_eq!(fields[2], "LIS");
        assert_eq!(fields[3], "Lab01");
        assert_eq!(fields[4], "BA400");
        assert_eq!(fields[5], "BioLab");
        assert_eq!(fields[8], "ACK^R22^ACK");
        assert_eq!(fields[9], "CTRL-42");

        assert!(msa.starts_with("MSA|AA|CTRL-42|Message accepted"));
    }

    #[test]
    fn ack_without_trigger_uses_bare_type() {
        let mut header = request_header();
        header.trigger_event.clear();
        let ack = build_ack(&Hl7Identity::default(), &header);
        let msh = ack.split('\r').next().unwrap();
        assert_eq!(msh.split('|').nth(8), Some("ACK"));
    }
}
