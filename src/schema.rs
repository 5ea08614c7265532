use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::util;

/// Central message enum handed from the normalizers to the sink.
///
/// The `type` field is added by serde and is what downstream
/// consumers of the redis stream route on ("trade" / "account").
///
/// DESIGN NOTES:
/// - Records are transient: built from one inbound frame and
///   consumed immediately by the sink.
/// - Any schema change here changes the persisted JSON.
///
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MarketMessage {
    Trade(TradeData),
    Account(AccountData),
}

impl MarketMessage {
    pub fn exchange(&self) -> &str {
        match self {
            MarketMessage::Trade(t) => &t.exchange,
            MarketMessage::Account(a) => &a.exchange,
        }
    }
}

// ------------------------------------------------------------
// Side
// ------------------------------------------------------------
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Parses the textual side used by most exchanges ("buy"/"BUY"/"Sell").
    pub fn from_text(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("buy") {
            Some(Side::Buy)
        } else if raw.eq_ignore_ascii_case("sell") {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

// ------------------------------------------------------------
// Trade message
// ------------------------------------------------------------
//
// A single public execution.
//
// Price and quantity stay strings: the exchange sends decimal text
// and we never want float rounding between the wire and the sink.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TradeData {
    /// Exchange identifier ("gateio", "mexc")
    pub exchange: String,

    /// Trading pair in internal format, e.g. "BTC/USDT"
    pub symbol: String,

    pub side: Side,

    pub quantity: String,

    pub price: String,

    #[serde(with = "util::instant_format")]
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for TradeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.side {
            Side::Sell => "🔴",
            Side::Buy => "🟢",
        };
        write!(
            f,
            "{} {} | {} @ ${} | {}",
            marker,
            self.side,
            self.quantity,
            self.price,
            util::format_instant(&self.timestamp)
        )
    }
}

// ------------------------------------------------------------
// Account message
// ------------------------------------------------------------
//
// A private account-stream event (own fills, order updates,
// balance changes).
//
// The common fields are optional because balance updates carry
// no side/price; everything exchange-specific goes into `extra`.
//
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountEventKind {
    Deal,
    Order,
    Balance,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccountData {
    pub exchange: String,

    /// Exchange channel the event arrived on
    pub channel: String,

    pub kind: AccountEventKind,

    pub symbol: Option<String>,

    pub side: Option<Side>,

    pub quantity: Option<String>,

    pub price: Option<String>,

    #[serde(with = "util::instant_format")]
    pub timestamp: DateTime<Utc>,

    /// Exchange-specific fields, already renamed to readable keys
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl fmt::Display for AccountData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "📨 {:?}", self.kind)?;

        if let Some(symbol) = &self.symbol {
            write!(f, " {}", symbol)?;
        }
        if let Some(side) = self.side {
            write!(f, " {}", side)?;
        }
        match (&self.quantity, &self.price) {
            (Some(q), Some(p)) => write!(f, " | {} @ ${}", q, p)?,
            (Some(q), None) => write!(f, " | {}", q)?,
            _ => {}
        }

        write!(f, " | {}", util::format_instant(&self.timestamp))?;

        if !self.extra.is_empty() {
            write!(f, " | {}", Value::Object(self.extra.clone()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade() -> TradeData {
        TradeData {
            exchange: "gateio".into(),
            symbol: "BTC/USDT".into(),
            side: Side::Sell,
            quantity: "1.5".into(),
            price: "65000".into(),
            timestamp: util::from_epoch_secs(1_700_000_000).unwrap(),
        }
    }

    #[test]
    fn trade_serializes_with_type_tag_and_millis_timestamp() {
        let msg = MarketMessage::Trade(trade());
        assert_eq!(msg.exchange(), trade().exchange);
        let v = serde_json::to_value(msg).unwrap();

        assert_eq!(v["type"], "trade");
        assert_eq!(v["side"], "sell");
        assert_eq!(v["quantity"], "1.5");
        assert_eq!(v["timestamp"], "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn trade_display_matches_console_format() {
        assert_eq!(
            trade().to_string(),
            "🔴 SELL | 1.5 @ $65000 | 2023-11-14T22:13:20.000Z"
        );
    }

    #[test]
    fn account_message_deserializes_back() {
        let raw = r#"{
            "type": "account",
            "exchange": "mexc",
            "channel": "spot@private.account.v3.api",
            "kind": "balance",
            "symbol": null,
            "side": null,
            "quantity": "12.5",
            "price": null,
            "timestamp": "2023-03-07T10:45:28.428Z",
            "extra": {"asset": "USDT"}
        }"#;

        let msg: MarketMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.exchange(), "mexc");
        let MarketMessage::Account(a) = msg else {
            panic!("expected account message");
        };
        assert_eq!(a.kind, AccountEventKind::Balance);
        assert_eq!(a.timestamp.timestamp_millis(), 1_678_185_928_428);
        assert_eq!(a.extra["asset"], "USDT");
    }

    #[test]
    fn side_from_text_is_case_insensitive() {
        assert_eq!(Side::from_text("BUY"), Some(Side::Buy));
        assert_eq!(Side::from_text("sell"), Some(Side::Sell));
        assert_eq!(Side::from_text("hold"), None);
    }
}
