//! Labwire Model Library
//!
//! Canonical domain entities exchanged between the device protocol engine and
//! the analyzer boundary. This crate carries no I/O: everything here is a
//! plain value type constructed by a transport handler or vendor parser and
//! handed downstream.
//!
//! # Modules
//!
//! - `message`: HL7-level envelopes (message header, acknowledgments, the
//!   canonical per-message-type payloads)
//! - `patient`: patient identification
//! - `specimen`: specimens, observation requests and observation results
//! - `device`: configured analyzer devices and their capabilities
//! - `vendor`: result values emitted by the non-HL7 vendor parsers

pub mod device;
pub mod message;
pub mod patient;
pub mod specimen;
pub mod vendor;

pub use device::{Device, DeviceCapability, DeviceType};
pub use message::{
    AckCode, Acknowledgment, MessageHeader, OrmO01, OruR01, OulR22, QbpQ11, QueryParameters,
};
pub use patient::{Patient, Sex};
pub use specimen::{ObservationRequest, ObservationResult, Specimen};
pub use vendor::{
    AbbottReport, AbbottSample, AbbottTestResult, AlifaxRecord, Cbs400Result, CoaxResult,
    DiestroResult, VerifyResult,
};
