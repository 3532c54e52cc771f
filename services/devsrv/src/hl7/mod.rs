//! Mapping between HL7 segment trees and canonical entities.

pub mod ack;
pub mod mapper;

pub use ack::build_ack;
pub use mapper::{map_orm_o01, map_oru_r01, map_oul_r22, map_qbp_q11};
