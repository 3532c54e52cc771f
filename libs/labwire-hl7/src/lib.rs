//! Labwire HL7 Library
//!
//! Wire-level HL7 v2.x support shared by the device integration service:
//!
//! - `mllp`: Minimal Lower Layer Protocol framing over any async stream
//! - `segment`: schema-driven segment codec (field-index tables, no
//!   per-field parsing code)
//! - `segments`: the segment schemas the engine speaks (MSH, PID, OBR, OBX,
//!   SPM, ORC, MSA, QPD, NTE)
//! - `message`: raw segment tree parsing and message-type detection
//! - `timestamp`: HL7 TS (`YYYYMMDDHHMMSS`) helpers

pub mod message;
pub mod mllp;
pub mod segment;
pub mod segments;
pub mod timestamp;

use thiserror::Error;

/// Errors raised by HL7 framing and decoding.
#[derive(Debug, Error)]
pub enum Hl7Error {
    /// Malformed MLLP frame boundary.
    #[error("framing error: {0}")]
    Framing(String),

    /// Segment tree does not match the expected message type, or a required
    /// field failed to parse.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Hl7Error>;

pub use message::{component, Hl7Message, MessageKind, RawSegment};
pub use mllp::MllpConnection;
pub use segment::{populate, serialize_message, serialize_segment, SegmentSchema};
pub use timestamp::{format_ts, parse_ts};
