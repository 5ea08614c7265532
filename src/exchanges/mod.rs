//! Exchange adapter registry and factory
//!
//! This module provides:
//! - Central registration of all supported exchanges
//! - A factory function to resolve adapters by name
//!
//! All exchange-specific protocol logic lives in the adapter modules.
//! The listener runtime interacts exclusively through the
//! `ExchangeAdapter` trait.

pub mod adapter;
pub mod gateio;
pub mod mexc;

use std::sync::Arc;
use adapter::ExchangeAdapter;

/// Returns an exchange adapter instance by name.
///
/// CONTRACT:
/// - `name` MUST match `listeners[].name` in config.json
/// - Adapter names are lowercase and stable
///
/// RETURNS:
/// - `None` if the exchange is unknown
///
pub fn get_adapter(name: &str) -> Option<Arc<dyn ExchangeAdapter>> {
    match name {
        "gateio" => Some(Arc::new(gateio::GateIoAdapter)),
        "mexc" => Some(Arc::new(mexc::MexcAdapter)),
        _ => None,
    }
}
