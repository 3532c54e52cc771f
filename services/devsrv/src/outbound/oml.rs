//! OML_O33 order message encoding.
//!
//! One message carries one patient, one specimen and up to thirty ordered
//! tests (the instrument's per-message capacity; the dispatcher does the
//! splitting). Control IDs are fresh UUIDs so acknowledgments can be
//! correlated back to the message that triggered them.

use chrono::Utc;
use uuid::Uuid;

use labwire_hl7::segments::{Msh, Obr, Orc, Pid, Spm};
use labwire_hl7::{format_ts, serialize_message, serialize_segment};
use labwire_model::{Device, ObservationRequest, Patient, Specimen};

use crate::config::Hl7Identity;

/// Serum, the only specimen type the BA400 order path carries.
const SPECIMEN_TYPE_SERUM: &str = "SER^Serum^HL70369";

/// An encoded order message plus the control ID it was stamped with.
#[derive(Debug, Clone)]
pub struct OrderMessage {
    pub control_id: String,
    pub payload: String,
}

/// Encode one OML_O33 for a single specimen's chunk of ordered tests.
pub fn encode_oml_o33(
    identity: &Hl7Identity,
    device: &Device,
    patient: &Patient,
    specimen: &Specimen,
    requests: &[ObservationRequest],
) -> OrderMessage {
    let control_id = Uuid::new_v4().to_string();
    let now = format_ts(Utc::now());

    let mut msh = Msh::default();
    msh.field_separator = "|".to_owned();
    msh.encoding_characters = "^~\\&".to_owned();
    msh.sending_application = identity.application.clone();
    msh.sending_facility = identity.facility.clone();
    msh.receiving_application = device.name.clone();
    msh.receiving_facility = identity.facility.clone();
    msh.datetime_of_message = now.clone();
    msh.message_type = "OML^O33^OML_O33".to_owned();
    msh.message_control_id = control_id.clone();
    msh.processing_id = "P".to_owned();
    msh.version_id = identity.version.clone();
    msh.accept_ack_type = "ER".to_owned();
    msh.application_ack_type = "AL".to_owned();
    msh.country_code = identity.country_code.clone();
    msh.character_set = "UNICODE UTF-8".to_owned();
    msh.message_profile_identifier = "LAB-28^IHE".to_owned();

    let mut pid = Pid::default();
    pid.set_id = "1".to_owned();
    pid.patient_id = format!(
        "{}-{} {}",
        patient.id, patient.first_name, patient.last_name
    );
    pid.patient_name = format!("{}^{}", patient.last_name, patient.first_name);
    if let Some(birthdate) = patient.birthdate {
        pid.datetime_of_birth = format_ts(birthdate);
    }
    pid.administrative_sex = patient.sex.as_hl7().to_owned();

    let mut spm = Spm::default();
    spm.set_id = "1".to_owned();
    spm.specimen_id = specimen.barcode.clone();
    spm.specimen_type = SPECIMEN_TYPE_SERUM.to_owned();
    spm.specimen_role = "P".to_owned();

    let mut segments = vec![
        serialize_segment(&msh),
        serialize_segment(&pid),
        serialize_segment(&spm),
    ];
    for (i, request) in requests.iter().enumerate() {
        let mut orc = Orc::default();
        orc.order_control = "NW".to_owned();
        orc.datetime_of_transaction = now.clone();

        let mut obr = Obr::default();
        obr.set_id = (i + 1).to_string();
        obr.placer_order_number = "1".to_owned();
        obr.universal_service_identifier = format!(
            "{code}^{code}^{device}",
            code = request.test_code,
            device = device.device_type.as_str(),
        );

        segments.push(serialize_segment(&orc));
        segments.push(serialize_segment(&obr));
    }

    OrderMessage {
        control_id,
        payload: serialize_message(&segments),
    }
}
