//! Error handling for the device integration service.
//!
//! Vendor parse failures and connection-level failures are kept apart so the
//! servers can decide what keeps a connection alive: a parse error is logged
//! and the read loop continues, a connection error tears the session down.

use labwire_model::DeviceType;
use thiserror::Error;

/// Device integration service error type.
#[derive(Error, Debug)]
pub enum DevSrvError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),

    /// MLLP envelope violations
    #[error("Framing error: {0}")]
    FramingError(String),

    /// HL7 segment tree or field decode failures
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// MSH-9 named a type the engine has no route for
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// Vendor text that matched no known report shape
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Record-level checksum failures (Alifax)
    #[error("Checksum mismatch: {0}")]
    ChecksumMismatch(String),

    /// Device family with no handler or no dispatcher
    #[error("Device type {0} is not supported")]
    DeviceNotSupported(DeviceType),

    /// Connection establishment and maintenance errors
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Operation timeout errors
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Outbound order dispatch failures (rejected or unreadable reply)
    #[error("Dispatch error: {0}")]
    DispatchError(String),
}

impl DevSrvError {
    pub fn config<T: std::fmt::Display>(msg: T) -> Self {
        DevSrvError::ConfigError(msg.to_string())
    }

    pub fn connection<T: std::fmt::Display>(msg: T) -> Self {
        DevSrvError::ConnectionError(msg.to_string())
    }

    pub fn parse<T: std::fmt::Display>(msg: T) -> Self {
        DevSrvError::ParseError(msg.to_string())
    }

    pub fn dispatch<T: std::fmt::Display>(msg: T) -> Self {
        DevSrvError::DispatchError(msg.to_string())
    }
}

impl From<std::io::Error> for DevSrvError {
    fn from(err: std::io::Error) -> Self {
        DevSrvError::IoError(err.to_string())
    }
}

impl From<labwire_hl7::Hl7Error> for DevSrvError {
    fn from(err: labwire_hl7::Hl7Error) -> Self {
        match err {
            labwire_hl7::Hl7Error::Framing(msg) => DevSrvError::FramingError(msg),
            labwire_hl7::Hl7Error::Decode(msg) => DevSrvError::DecodeError(msg),
            labwire_hl7::Hl7Error::Io(io) => DevSrvError::IoError(io.to_string()),
        }
    }
}

impl From<figment::Error> for DevSrvError {
    fn from(err: figment::Error) -> Self {
        DevSrvError::ConfigError(err.to_string())
    }
}

impl From<serde_yaml::Error> for DevSrvError {
    fn from(err: serde_yaml::Error) -> Self {
        DevSrvError::ConfigError(err.to_string())
    }
}

impl From<tokio_serial::Error> for DevSrvError {
    fn from(err: tokio_serial::Error) -> Self {
        DevSrvError::ConnectionError(err.to_string())
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, DevSrvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hl7_error_maps_by_variant() {
        let e: DevSrvError = labwire_hl7::Hl7Error::Framing("bad start".into()).into();
        assert!(matches!(e, DevSrvError::FramingError(_)));
        let e: DevSrvError = labwire_hl7::Hl7Error::Decode("no msh".into()).into();
        assert!(matches!(e, DevSrvError::DecodeError(_)));
    }

    #[test]
    fn error_display_includes_context() {
        let e = DevSrvError::DeviceNotSupported(DeviceType::Bts);
        assert_eq!(e.to_string(), "Device type BTS is not supported");
    }
}
