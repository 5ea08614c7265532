use serde_json::Value;

use crate::error::ParseError;
use crate::schema::MarketMessage;
use crate::session::SessionToken;

pub use crate::config::SubscriptionConfig as Subscription;

/// Outcome of normalizing one inbound text frame.
#[derive(Debug)]
pub enum ParseResult {
    /// Frame belongs to the subscribed channel; zero or more events
    Market(Vec<MarketMessage>),

    /// Exchange-level ping that must be answered on the data channel
    Reply(Value),

    /// Acks, pongs, frames of other channels: dropped silently
    Control,

    /// Malformed frame: logged and dropped by the runner
    Error(ParseError),
}

/// ExchangeAdapter is the seam between:
/// - The generic listener runtime (connect, timers, reconnect)
/// - Exchange-specific WebSocket protocols
///
/// Each implementation must:
/// - Describe its endpoint and whether it needs a session token
/// - Build subscribe / app-level ping messages
/// - Normalize raw frames into `MarketMessage`
///
/// THREAD SAFETY:
/// - Must be Send + Sync; adapters are shared behind `Arc`
///
pub trait ExchangeAdapter: Send + Sync {
    /// Canonical exchange name; must match `listeners[].name` in config.
    fn name(&self) -> &'static str;

    /// Default WebSocket endpoint, without any query string.
    fn ws_url(&self) -> &'static str;

    /// Default REST base URL for session endpoints, if any.
    fn rest_url(&self) -> Option<&'static str> {
        None
    }

    /// True when the stream must be scoped to a session token.
    fn requires_session(&self) -> bool {
        false
    }

    /// Final URL to dial for one connection attempt.
    ///
    /// The default ignores the token; private streams override it
    /// to pass the token as a query parameter.
    fn stream_url(&self, base: &str, _token: Option<&SessionToken>) -> String {
        base.to_string()
    }

    /// Subscribe request sent right after the socket opens.
    ///
    /// MUST NOT:
    /// - Perform network I/O
    fn build_subscribe_message(&self, subscription: &Subscription) -> Option<Value>;

    /// Application-level ping sent on the app ping timer, for
    /// exchanges that expect one on the data channel.
    fn build_app_ping(&self) -> Option<Value> {
        None
    }

    /// Normalizes one raw text frame.
    ///
    /// IMPORTANT:
    /// - This function must NEVER panic
    /// - Frames for other channels return `Control`, not `Error`
    /// - Timestamps end up as canonical `DateTime<Utc>`
    fn parse_message(&self, raw: &str, subscription: &Subscription) -> ParseResult;
}
