//! Service configuration.
//!
//! Loaded from a YAML file with `LABWIRE_*` environment overrides layered on
//! top (`LABWIRE_SERVICE__LOG_LEVEL=debug` overrides `service.log_level`).

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use labwire_model::Device;

use crate::error::Result;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub hl7: Hl7Identity,
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Quiet window before a barcode's aggregated results are flushed.
    #[serde(default = "default_debounce_ms")]
    pub result_debounce_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            name: default_service_name(),
            log_level: default_log_level(),
            result_debounce_ms: default_debounce_ms(),
        }
    }
}

/// How this system identifies itself in MSH segments it emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hl7Identity {
    #[serde(default = "default_application")]
    pub application: String,
    #[serde(default = "default_facility")]
    pub facility: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_country_code")]
    pub country_code: String,
}

impl Default for Hl7Identity {
    fn default() -> Self {
        Hl7Identity {
            application: default_application(),
            facility: default_facility(),
            version: default_version(),
            country_code: default_country_code(),
        }
    }
}

fn default_service_name() -> String {
    "devsrv".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_application() -> String {
    "LIS".to_owned()
}

fn default_facility() -> String {
    "Lab01".to_owned()
}

fn default_version() -> String {
    "2.5.1".to_owned()
}

fn default_country_code() -> String {
    "ID".to_owned()
}

impl AppConfig {
    /// Load configuration: YAML file first, environment overrides second.
    pub fn load(path: &str) -> Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("LABWIRE_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Devices that are enabled for inbound traffic.
    pub fn enabled_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.enabled)
    }
}
