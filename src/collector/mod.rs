/// Collector module
///
/// This module groups all logic responsible for:
/// - Driving one exchange stream per listener
/// - Keeping the session alive (heartbeat, token renewal)
/// - Reconnecting after any disconnect
///
/// The collector layer sits between:
/// - Exchange adapters (Gate.io, MEXC)
/// - Session provisioners (listen-key REST)
/// - The event sink
///
/// Design notes:
/// - Exchange-specific logic MUST NOT live here
/// - The socket is behind `transport::Connector` so the state
///   machine runs against in-memory streams in tests
pub mod backoff;
pub mod runner;
pub mod state;
pub mod transport;
