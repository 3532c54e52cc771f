//! Segment schemas for the message types the engine speaks.
//!
//! Only the fields the engine actually reads or writes are declared; the
//! codec skips everything else by construction.

use crate::hl7_segment;

hl7_segment! {
    /// Message header. Field 1 is the field separator itself; the message
    /// parser injects it so downstream indices line up with the standard.
    pub struct Msh("MSH") {
        1 => field_separator,
        2 => encoding_characters,
        3 => sending_application,
        4 => sending_facility,
        5 => receiving_application,
        6 => receiving_facility,
        7 => datetime_of_message,
        9 => message_type,
        10 => message_control_id,
        11 => processing_id,
        12 => version_id,
        15 => accept_ack_type,
        16 => application_ack_type,
        17 => country_code,
        18 => character_set,
        21 => message_profile_identifier,
    }
}

hl7_segment! {
    /// Patient identification.
    pub struct Pid("PID") {
        1 => set_id,
        3 => patient_id,
        5 => patient_name,
        7 => datetime_of_birth,
        8 => administrative_sex,
        11 => patient_address,
    }
}

hl7_segment! {
    /// Observation request.
    pub struct Obr("OBR") {
        1 => set_id,
        2 => placer_order_number,
        4 => universal_service_identifier,
        6 => requested_datetime,
        25 => result_status,
    }
}

hl7_segment! {
    /// Observation result.
    pub struct Obx("OBX") {
        1 => set_id,
        2 => value_type,
        3 => observation_identifier,
        5 => observation_value,
        6 => units,
        7 => references_range,
        8 => abnormal_flags,
        11 => observation_result_status,
        14 => datetime_of_observation,
    }
}

hl7_segment! {
    /// Specimen.
    pub struct Spm("SPM") {
        1 => set_id,
        2 => specimen_id,
        4 => specimen_type,
        11 => specimen_role,
        17 => collection_datetime,
        18 => received_datetime,
    }
}

hl7_segment! {
    /// Common order.
    pub struct Orc("ORC") {
        1 => order_control,
        9 => datetime_of_transaction,
    }
}

hl7_segment! {
    /// Message acknowledgment.
    pub struct Msa("MSA") {
        1 => acknowledgment_code,
        2 => message_control_id,
        3 => text_message,
    }
}

hl7_segment! {
    /// Query parameter definition. Instruments put the queried barcode in
    /// the user-parameter field.
    pub struct Qpd("QPD") {
        1 => message_query_name,
        2 => query_tag,
        3 => user_parameters,
    }
}

hl7_segment! {
    /// Notes and comments.
    pub struct Nte("NTE") {
        1 => set_id,
        3 => comment,
    }
}
