//! Device-type to protocol-handler dispatch.
//!
//! Pure lookup: every receivable `DeviceType` maps to one handler instance,
//! built once at startup and shared across connections. Unrecognized and
//! legacy families fall back to the default HL7/MLLP handler so an unknown
//! device keeps working; send-only families are rejected.

use std::sync::Arc;

use dashmap::DashMap;

use labwire_model::{Device, DeviceType};

use crate::aggregate::ResultAggregator;
use crate::analyzer::Analyzer;
use crate::config::Hl7Identity;
use crate::error::{DevSrvError, Result};
use crate::protocols::{
    abbott::AbbottHandler, alifax::AlifaxHandler, cbs400::Cbs400Handler, coax::CoaxHandler,
    diestro::DiestroHandler, hlseven::HlSevenHandler, ncc3300::Ncc3300Handler,
    response911::Response911Handler, verify_u120::VerifyU120Handler, SerialDeviceHandler,
    TcpDeviceHandler,
};

/// A handler together with the transport it runs on.
#[derive(Clone)]
pub enum DeviceHandler {
    Tcp(Arc<dyn TcpDeviceHandler>),
    Serial(Arc<dyn SerialDeviceHandler>),
}

impl std::fmt::Debug for DeviceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceHandler::Tcp(_) => f.write_str("Tcp"),
            DeviceHandler::Serial(_) => f.write_str("Serial"),
        }
    }
}

pub struct DeviceStrategy {
    registry: DashMap<DeviceType, DeviceHandler>,
    default_handler: DeviceHandler,
}

impl DeviceStrategy {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        aggregator: ResultAggregator,
        identity: Hl7Identity,
    ) -> Self {
        let registry = DashMap::new();
        registry.insert(
            DeviceType::Response911,
            DeviceHandler::Tcp(Arc::new(Response911Handler::new(aggregator))),
        );
        registry.insert(
            DeviceType::Abbott,
            DeviceHandler::Tcp(Arc::new(AbbottHandler::new(analyzer.clone()))),
        );
        registry.insert(
            DeviceType::Coax,
            DeviceHandler::Serial(Arc::new(CoaxHandler::new(analyzer.clone()))),
        );
        registry.insert(
            DeviceType::Diestro,
            DeviceHandler::Serial(Arc::new(DiestroHandler::new(analyzer.clone()))),
        );
        registry.insert(
            DeviceType::NeomedicaNcc3300,
            DeviceHandler::Serial(Arc::new(Ncc3300Handler::new(analyzer.clone()))),
        );
        registry.insert(
            DeviceType::Alifax,
            DeviceHandler::Serial(Arc::new(AlifaxHandler::new(analyzer.clone()))),
        );
        registry.insert(
            DeviceType::Cbs400,
            DeviceHandler::Serial(Arc::new(Cbs400Handler::new(analyzer.clone()))),
        );
        registry.insert(
            DeviceType::VerifyU120,
            DeviceHandler::Serial(Arc::new(VerifyU120Handler::new(analyzer.clone()))),
        );

        DeviceStrategy {
            registry,
            default_handler: DeviceHandler::Tcp(Arc::new(HlSevenHandler::new(analyzer, identity))),
        }
    }

    /// Picks the handler for a configured device.
    ///
    /// Total over `DeviceType` except for send-only families, which cannot
    /// accept inbound traffic and are reported as unsupported.
    pub fn choose_device_handler(&self, device: &Device) -> Result<DeviceHandler> {
        if !device.device_type.capability().can_receive {
            return Err(DevSrvError::DeviceNotSupported(device.device_type));
        }
        Ok(self
            .registry
            .get(&device.device_type)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| self.default_handler.clone()))
    }
}
