//! Outbound order dispatch to the BA400 family.

pub mod dispatcher;
pub mod oml;

pub use dispatcher::{Ba400Dispatcher, DispatchProgress, DispatchStatus};
pub use oml::{encode_oml_o33, OrderMessage};
