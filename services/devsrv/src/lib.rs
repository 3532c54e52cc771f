//! Device Integration Service (`devsrv`)
//!
//! Bridges laboratory analyzers to the LIS: listens on per-device TCP ports
//! and serial lines, decodes each vendor's wire protocol into canonical
//! result entities, merges fragmented results per barcode, and pushes
//! work-order requests out to instruments that accept them.

pub mod aggregate;
pub mod analyzer;
pub mod config;
pub mod error;
pub mod hl7;
pub mod outbound;
pub mod protocols;
pub mod server;
pub mod strategy;

pub use config::AppConfig;
pub use error::{DevSrvError, Result};
