//! Segment-tree to entity mappers.
//!
//! Each mapper is total over a successfully parsed message: missing optional
//! segments map to zero-value sub-entities, and only a message whose MSH-9
//! names a different type fails the call. Instruments omit segments freely,
//! so nothing below unwraps.

use labwire_hl7::segments::{Obr, Obx, Pid, Qpd, Spm};
use labwire_hl7::{component, parse_ts, Hl7Message, MessageKind, RawSegment};
use labwire_model::{
    MessageHeader, ObservationRequest, ObservationResult, OrmO01, OruR01, OulR22, Patient, QbpQ11,
    QueryParameters, Sex, Specimen,
};

use crate::error::{DevSrvError, Result};

/// Decode MSH into the canonical header.
pub fn map_header(msg: &Hl7Message) -> Result<MessageHeader> {
    let msh = msg.header()?;
    let mut msh9 = msh.message_type.split('^');
    Ok(MessageHeader {
        control_id: msh.message_control_id.clone(),
        sending_application: component(&msh.sending_application, 1).to_owned(),
        sending_facility: component(&msh.sending_facility, 1).to_owned(),
        receiving_application: component(&msh.receiving_application, 1).to_owned(),
        receiving_facility: component(&msh.receiving_facility, 1).to_owned(),
        message_type: msh9.next().unwrap_or("").to_owned(),
        trigger_event: msh9.next().unwrap_or("").to_owned(),
        version: msh.version_id,
        timestamp: parse_ts(&msh.datetime_of_message),
    })
}

/// PID to patient. `None` (message without a PID) maps to the zero patient.
pub fn map_pid(segment: Option<&RawSegment>) -> Patient {
    let Some(segment) = segment else {
        return Patient::default();
    };
    let pid: Pid = segment.decode();

    let external_id = component(&pid.patient_id, 1).to_owned();
    let id = external_id.parse().unwrap_or(0);

    // PID-11 components in display order: street, city, state, zip, country
    let address = [1, 3, 4, 5, 6]
        .iter()
        .map(|&i| component(&pid.patient_address, i))
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Patient {
        id,
        external_id,
        first_name: component(&pid.patient_name, 2).to_owned(),
        last_name: component(&pid.patient_name, 1).to_owned(),
        birthdate: parse_ts(&pid.datetime_of_birth),
        sex: Sex::from_hl7(&pid.administrative_sex),
        address,
        specimens: Vec::new(),
    }
}

fn map_spm(segment: &RawSegment) -> Specimen {
    let spm: Spm = segment.decode();
    Specimen {
        barcode: component(&spm.specimen_id, 1).to_owned(),
        specimen_type: component(&spm.specimen_type, 1).to_owned(),
        collected_at: parse_ts(&spm.collection_datetime),
        received_at: parse_ts(&spm.received_datetime),
        observation_requests: Vec::new(),
        observation_results: Vec::new(),
    }
}

fn map_obr(segment: &RawSegment) -> ObservationRequest {
    let obr: Obr = segment.decode();
    ObservationRequest {
        test_code: component(&obr.universal_service_identifier, 1).to_owned(),
        description: component(&obr.universal_service_identifier, 2).to_owned(),
        requested_at: parse_ts(&obr.requested_datetime),
        result_status: obr.result_status,
    }
}

fn map_obx(segment: &RawSegment) -> ObservationResult {
    let obx: Obx = segment.decode();
    ObservationResult {
        test_code: component(&obx.observation_identifier, 1).to_owned(),
        description: component(&obx.observation_identifier, 2).to_owned(),
        values: obx
            .observation_value
            .split('~')
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .collect(),
        value_type: obx.value_type,
        unit: component(&obx.units, 1).to_owned(),
        reference_range: obx.references_range,
        abnormal_flags: obx
            .abnormal_flags
            .split('~')
            .filter(|f| !f.is_empty())
            .map(str::to_owned)
            .collect(),
        observed_at: parse_ts(&obx.datetime_of_observation),
        comment: obx.observation_result_status,
        picked: false,
    }
}

/// Walk the segment tree in wire order, grouping OBR/OBX under the nearest
/// preceding SPM. Messages without SPM (hematology analyzers often skip it)
/// get one implicit specimen whose barcode falls back to OBR-2.
fn collect_specimens(msg: &Hl7Message) -> Vec<Specimen> {
    let mut specimens: Vec<Specimen> = Vec::new();
    for segment in &msg.segments {
        match segment.name.as_str() {
            "SPM" => specimens.push(map_spm(segment)),
            "OBR" => {
                if specimens.is_empty() {
                    specimens.push(Specimen::default());
                }
                if let Some(current) = specimens.last_mut() {
                    if current.barcode.is_empty() {
                        current.barcode = component(segment.field(2), 1).to_owned();
                    }
                    current.observation_requests.push(map_obr(segment));
                }
            }
            "OBX" => {
                if specimens.is_empty() {
                    specimens.push(Specimen::default());
                }
                if let Some(current) = specimens.last_mut() {
                    current.observation_results.push(map_obx(segment));
                }
            }
            _ => {}
        }
    }
    specimens
}

fn expect_kind(msg: &Hl7Message, expected: MessageKind) -> Result<()> {
    let kind = msg.kind()?;
    if kind != expected {
        return Err(DevSrvError::DecodeError(format!(
            "expected {expected:?}, got {kind:?}"
        )));
    }
    Ok(())
}

pub fn map_oru_r01(msg: &Hl7Message) -> Result<OruR01> {
    expect_kind(msg, MessageKind::OruR01)?;
    let mut patient = map_pid(msg.segment("PID"));
    patient.specimens = collect_specimens(msg);
    Ok(OruR01 {
        header: map_header(msg)?,
        patients: vec![patient],
    })
}

pub fn map_oul_r22(msg: &Hl7Message) -> Result<OulR22> {
    expect_kind(msg, MessageKind::OulR22)?;
    Ok(OulR22 {
        header: map_header(msg)?,
        patient: map_pid(msg.segment("PID")),
        specimens: collect_specimens(msg),
    })
}

pub fn map_orm_o01(msg: &Hl7Message) -> Result<OrmO01> {
    expect_kind(msg, MessageKind::OrmO01)?;
    Ok(OrmO01 {
        header: map_header(msg)?,
        patient: map_pid(msg.segment("PID")),
        specimens: collect_specimens(msg),
    })
}

pub fn map_qbp_q11(msg: &Hl7Message) -> Result<QbpQ11> {
    expect_kind(msg, MessageKind::QbpQ11)?;
    let query = msg
        .segment("QPD")
        .map(|segment| {
            let qpd: Qpd = segment.decode();
            QueryParameters {
                query_tag: qpd.query_tag,
                barcode: component(&qpd.user_parameters, 1).to_owned(),
            }
        })
        .unwrap_or_default();
    Ok(QbpQ11 {
        header: map_header(msg)?,
        query,
    })
}
