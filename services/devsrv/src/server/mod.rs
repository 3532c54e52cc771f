//! Per-device listeners.
//!
//! One server per enabled device: a TCP listener for networked instruments,
//! a reopened-on-failure port loop for serial ones. Both stop on the shared
//! shutdown signal.

pub mod serial;
pub mod tcp;

pub use serial::SerialDeviceServer;
pub use tcp::TcpDeviceServer;
