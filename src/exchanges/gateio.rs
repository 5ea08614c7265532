use serde_json::{Value, json};

use crate::{
    error::ParseError,
    schema::{MarketMessage, Side, TradeData},
    util,
};

use super::adapter::{ExchangeAdapter, ParseResult, Subscription};

/// Gate.io WebSocket v4 adapter (public spot trades)
///
/// This adapter encapsulates all Gate.io–specific behavior:
/// - subscription message format
/// - `spot.ping` application heartbeat
/// - trade parsing
///
/// DESIGN PRINCIPLES:
/// - Pure protocol translation only
/// - No session token: the trade channel is public
pub struct GateIoAdapter;

const PING_CHANNEL: &str = "spot.ping";
const PONG_CHANNEL: &str = "spot.pong";

impl ExchangeAdapter for GateIoAdapter {
    fn name(&self) -> &'static str {
        "gateio"
    }

    fn ws_url(&self) -> &'static str {
        "wss://api.gateio.ws/ws/v4/"
    }

    /// SYMBOL HANDLING:
    /// - Internal "BASE/QUOTE" becomes Gate.io "BASE_QUOTE"
    /// - `time` is epoch seconds
    fn build_subscribe_message(&self, subscription: &Subscription) -> Option<Value> {
        let pair = util::symbol_to_exchange(self.name(), &subscription.instrument);

        Some(json!({
            "time": util::now_secs(),
            "channel": subscription.channel,
            "event": "subscribe",
            "payload": [pair]
        }))
    }

    fn build_app_ping(&self) -> Option<Value> {
        Some(json!({
            "time": util::now_secs(),
            "channel": PING_CHANNEL
        }))
    }

    /// CONTRACT:
    /// - Only `"event": "update"` frames on the subscribed channel
    ///   produce trades
    /// - `result` may be a single trade object or an array of them
    /// - A malformed trade fails the whole frame
    fn parse_message(&self, raw: &str, subscription: &Subscription) -> ParseResult {
        let v: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => return ParseResult::Error(e.into()),
        };

        let channel = v.get("channel").and_then(Value::as_str);
        let event = v.get("event").and_then(Value::as_str);

        // Server-initiated app ping: answer on the data channel
        if channel == Some(PING_CHANNEL) && event.is_none() {
            return ParseResult::Reply(json!({
                "time": util::now_secs(),
                "channel": PONG_CHANNEL
            }));
        }

        // Subscribe failures come back as an ack with a non-null error
        if let Some(err) = v.get("error").filter(|e| !e.is_null()) {
            return ParseResult::Error(ParseError::Exchange(err.to_string()));
        }

        // Ignore non-update events (subscribe acks, spot.pong, ...)
        if event != Some("update") {
            return ParseResult::Control;
        }

        if channel != Some(subscription.channel.as_str()) {
            return ParseResult::Control;
        }

        let trades: Vec<&Value> = match v.get("result") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(obj @ Value::Object(_)) => vec![obj],
            _ => return ParseResult::Error(ParseError::MissingField("result")),
        };

        let parsed: Result<Vec<MarketMessage>, ParseError> = trades
            .into_iter()
            .map(|t| parse_trade(self.name(), t, subscription))
            .collect();

        match parsed {
            Ok(events) => ParseResult::Market(events),
            Err(e) => ParseResult::Error(e),
        }
    }
}

fn parse_trade(
    exchange: &str,
    t: &Value,
    subscription: &Subscription,
) -> Result<MarketMessage, ParseError> {
    let side_raw = t
        .get("side")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingField("side"))?;
    let side = Side::from_text(side_raw).ok_or_else(|| ParseError::InvalidField {
        field: "side",
        reason: side_raw.to_string(),
    })?;

    let quantity = t
        .get("amount")
        .and_then(util::decimal_text)
        .ok_or(ParseError::MissingField("amount"))?;

    let price = t
        .get("price")
        .and_then(util::decimal_text)
        .ok_or(ParseError::MissingField("price"))?;

    // Prefer the millisecond field when Gate.io sends it
    let timestamp = match t.get("create_time_ms").and_then(util::epoch_value) {
        Some(ms) => util::from_epoch_millis(ms),
        None => t
            .get("create_time")
            .and_then(util::epoch_value)
            .and_then(util::from_epoch_secs),
    }
    .ok_or(ParseError::MissingField("create_time"))?;

    let symbol_raw = t
        .get("currency_pair")
        .and_then(Value::as_str)
        .unwrap_or(&subscription.instrument);

    Ok(MarketMessage::Trade(TradeData {
        exchange: exchange.to_string(),
        symbol: util::symbol_from_exchange(exchange, symbol_raw),
        side,
        quantity,
        price,
        timestamp,
    }))
}
