//! Configured analyzer devices.

use serde::{Deserialize, Serialize};

/// Instrument families the engine can talk to.
///
/// The string forms match the device records the management layer stores, so
/// they deserialize straight out of configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceType {
    Ba400,
    Ba200,
    A15,
    Other,
    Coax,
    Diestro,
    #[serde(rename = "NEOMEDICA_NCC_3300")]
    NeomedicaNcc3300,
    Alifax,
    Cbs400,
    VerifyU120,
    Abbott,
    #[serde(rename = "RESPONSE_911")]
    Response911,
    /// Export-only target; never accepts inbound connections.
    Bts,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Ba400 => "BA400",
            DeviceType::Ba200 => "BA200",
            DeviceType::A15 => "A15",
            DeviceType::Other => "OTHER",
            DeviceType::Coax => "COAX",
            DeviceType::Diestro => "DIESTRO",
            DeviceType::NeomedicaNcc3300 => "NEOMEDICA_NCC_3300",
            DeviceType::Alifax => "ALIFAX",
            DeviceType::Cbs400 => "CBS400",
            DeviceType::VerifyU120 => "VERIFY_U120",
            DeviceType::Abbott => "ABBOTT",
            DeviceType::Response911 => "RESPONSE_911",
            DeviceType::Bts => "BTS",
        }
    }

    /// Whether this family is attached over a serial line rather than TCP.
    pub fn is_serial(&self) -> bool {
        matches!(
            self,
            DeviceType::Coax
                | DeviceType::Diestro
                | DeviceType::NeomedicaNcc3300
                | DeviceType::Alifax
                | DeviceType::Cbs400
                | DeviceType::VerifyU120
        )
    }

    pub fn capability(&self) -> DeviceCapability {
        match self {
            DeviceType::Ba400 | DeviceType::Ba200 => DeviceCapability {
                can_send: true,
                can_receive: true,
                serial: false,
            },
            DeviceType::A15 | DeviceType::Abbott => DeviceCapability {
                can_send: true,
                can_receive: true,
                serial: false,
            },
            DeviceType::Bts => DeviceCapability {
                can_send: true,
                can_receive: false,
                serial: false,
            },
            other => DeviceCapability {
                can_send: false,
                can_receive: true,
                serial: other.is_serial(),
            },
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a device family can do, as advertised to the management layer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeviceCapability {
    pub can_send: bool,
    pub can_receive: bool,
    pub serial: bool,
}

/// One configured instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    /// TCP listen port for inbound connections, when the device is networked.
    #[serde(default)]
    pub receive_port: u16,
    /// Serial device path (e.g. `/dev/ttyUSB0`) for serial instruments.
    #[serde(default)]
    pub serial_port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Outbound address for order dispatch (BA400 family).
    #[serde(default)]
    pub send_host: String,
    #[serde(default)]
    pub send_port: u16,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn default_baud_rate() -> u32 {
    9600
}

fn enabled_default() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_classification() {
        assert!(DeviceType::Diestro.is_serial());
        assert!(DeviceType::Alifax.is_serial());
        assert!(!DeviceType::Ba400.is_serial());
        assert!(!DeviceType::Response911.is_serial());
    }

    #[test]
    fn bts_is_send_only() {
        let cap = DeviceType::Bts.capability();
        assert!(cap.can_send);
        assert!(!cap.can_receive);
    }

    #[test]
    fn device_type_deserializes_from_config_string() {
        let t: DeviceType = serde_yaml::from_str("NEOMEDICA_NCC_3300").unwrap();
        assert_eq!(t, DeviceType::NeomedicaNcc3300);
    }
}
