//! Raw segment tree parsing and message-type detection.

use crate::segment::{populate, SegmentSchema};
use crate::segments::Msh;
use crate::{Hl7Error, Result};

/// One wire segment: name plus its raw fields in order (field 1 first).
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub name: String,
    pub fields: Vec<String>,
}

impl RawSegment {
    /// Raw field by 1-based index, empty string when absent.
    pub fn field(&self, index: usize) -> &str {
        if index == 0 {
            return "";
        }
        self.fields.get(index - 1).map(String::as_str).unwrap_or("")
    }

    /// Decode this segment through a schema's field-index table.
    pub fn decode<S: SegmentSchema>(&self) -> S {
        let refs: Vec<&str> = self.fields.iter().map(String::as_str).collect();
        populate(&refs)
    }
}

/// Message types the engine recognizes, keyed on MSH-9 message code +
/// trigger event. Dispatch happens on this discriminant, never on dynamic
/// typing of a decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    OruR01,
    OulR22,
    OrmO01,
    QbpQ11,
    OmlO33,
    OrlO34,
    Ack,
    Unknown(String),
}

impl MessageKind {
    pub fn from_msh9(message_type: &str) -> Self {
        let mut parts = message_type.split('^');
        let code = parts.next().unwrap_or("");
        let trigger = parts.next().unwrap_or("");
        match (code, trigger) {
            ("ORU", "R01") => MessageKind::OruR01,
            ("OUL", "R22") => MessageKind::OulR22,
            ("ORM", "O01") => MessageKind::OrmO01,
            ("QBP", "Q11") => MessageKind::QbpQ11,
            ("OML", "O33") => MessageKind::OmlO33,
            ("ORL", "O34") => MessageKind::OrlO34,
            ("ACK", _) => MessageKind::Ack,
            _ => MessageKind::Unknown(message_type.to_owned()),
        }
    }
}

/// A parsed HL7 message: an ordered list of raw segments.
#[derive(Debug, Clone)]
pub struct Hl7Message {
    pub segments: Vec<RawSegment>,
}

impl Hl7Message {
    /// Parse a pipe-delimited message. Segments may be separated by CR, LF
    /// or CRLF; blank lines are skipped. Fails when no MSH is present.
    ///
    /// MSH gets its standard quirk applied: the separator character itself
    /// is injected as field 1 so that `MSH-9` really is index 9.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for line in raw.split(['\r', '\n']) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split('|');
            let name = parts.next().unwrap_or("").to_owned();
            if name.len() < 3 {
                continue;
            }
            let mut fields: Vec<String> = parts.map(str::to_owned).collect();
            if name == "MSH" {
                fields.insert(0, "|".to_owned());
            }
            segments.push(RawSegment { name, fields });
        }

        if !segments.iter().any(|s| s.name == "MSH") {
            return Err(Hl7Error::Decode("message has no MSH segment".into()));
        }
        Ok(Hl7Message { segments })
    }

    /// First segment with the given name.
    pub fn segment(&self, name: &str) -> Option<&RawSegment> {
        self.segments.iter().find(|s| s.name == name)
    }

    /// All segments with the given name, in wire order.
    pub fn segments_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RawSegment> {
        self.segments.iter().filter(move |s| s.name == name)
    }

    /// Decoded message header.
    pub fn header(&self) -> Result<Msh> {
        self.segment("MSH")
            .map(RawSegment::decode)
            .ok_or_else(|| Hl7Error::Decode("message has no MSH segment".into()))
    }

    /// Message kind from MSH-9.
    pub fn kind(&self) -> Result<MessageKind> {
        Ok(MessageKind::from_msh9(&self.header()?.message_type))
    }
}

/// 1-based `^`-component access within a field.
pub fn component(field: &str, index: usize) -> &str {
    if index == 0 {
        return "";
    }
    field.split('^').nth(index - 1).unwrap_or("")
}

/// Last non-empty `^`-component, used where instruments pad identifiers with
/// empty leading components (`^^^^UA`).
pub fn last_component(field: &str) -> &str {
    field.split('^').rev().find(|c| !c.is_empty()).unwrap_or("")
}
