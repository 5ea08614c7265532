use serde_json::{Map, Value, json};

use crate::{
    error::ParseError,
    schema::{AccountData, AccountEventKind, MarketMessage, Side},
    session::SessionToken,
    util,
};

use super::adapter::{ExchangeAdapter, ParseResult, Subscription};

/// MEXC spot v3 private account-stream adapter
///
/// WS:
/// wss://wbs.mexc.com/ws?listenKey=<key>
///
/// Notes:
/// - Needs a listen key (see `session::mexc`)
/// - One private channel per connection
/// - Liveness via transport ping frames only
///
/// Channels:
/// - spot@private.deals.v3.api   → own fills
/// - spot@private.orders.v3.api  → order updates
/// - spot@private.account.v3.api → balance changes
pub struct MexcAdapter;

const DEALS: &str = "spot@private.deals.v3.api";
const ORDERS: &str = "spot@private.orders.v3.api";
const ACCOUNT: &str = "spot@private.account.v3.api";

/// Channel name as MEXC echoes it in `c`.
///
/// Instrument-scoped channels are written `<channel>@<SYMBOL>`.
fn stream_channel(subscription: &Subscription) -> String {
    if subscription.instrument.is_empty() {
        subscription.channel.clone()
    } else {
        format!(
            "{}@{}",
            subscription.channel,
            util::symbol_to_exchange("mexc", &subscription.instrument)
        )
    }
}

impl ExchangeAdapter for MexcAdapter {
    fn name(&self) -> &'static str {
        "mexc"
    }

    fn ws_url(&self) -> &'static str {
        "wss://wbs.mexc.com/ws"
    }

    fn rest_url(&self) -> Option<&'static str> {
        Some("https://api.mexc.com")
    }

    fn requires_session(&self) -> bool {
        true
    }

    fn stream_url(&self, base: &str, token: Option<&SessionToken>) -> String {
        match token {
            Some(token) => format!("{}?listenKey={}", base, token.as_str()),
            None => base.to_string(),
        }
    }

    fn build_subscribe_message(&self, subscription: &Subscription) -> Option<Value> {
        Some(json!({
            "method": "SUBSCRIPTION",
            "params": [stream_channel(subscription)]
        }))
    }

    fn parse_message(&self, raw: &str, subscription: &Subscription) -> ParseResult {
        let v: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => return ParseResult::Error(e.into()),
        };

        // Acks / PONG: {"id":0,"code":0,"msg":"..."}
        if let Some(code) = v.get("code").and_then(Value::as_i64) {
            if code != 0 {
                let msg = v.get("msg").and_then(Value::as_str).unwrap_or_default();
                return ParseResult::Error(ParseError::Exchange(format!("code {}: {}", code, msg)));
            }
            return ParseResult::Control;
        }

        let Some(channel) = v.get("c").and_then(Value::as_str) else {
            return ParseResult::Control;
        };

        if channel != stream_channel(subscription) {
            return ParseResult::Control;
        }

        let Some(d) = v.get("d").and_then(Value::as_object) else {
            return ParseResult::Error(ParseError::MissingField("d"));
        };

        let push_time = v.get("t").and_then(util::epoch_value);
        let symbol = v
            .get("s")
            .and_then(Value::as_str)
            .map(|s| util::symbol_from_exchange(self.name(), s));

        let parsed = if channel.starts_with(DEALS) {
            parse_deal(d, channel, symbol, push_time)
        } else if channel.starts_with(ORDERS) {
            parse_order(d, channel, symbol, push_time)
        } else if channel.starts_with(ACCOUNT) {
            parse_balance(d, channel, push_time)
        } else {
            // Subscribed to something we cannot normalize yet
            return ParseResult::Control;
        };

        match parsed {
            Ok(data) => ParseResult::Market(vec![MarketMessage::Account(data)]),
            Err(e) => ParseResult::Error(e),
        }
    }
}

/// Trade type code: 1 = buy, 2 = sell.
fn side_code(d: &Map<String, Value>) -> Result<Side, ParseError> {
    match d.get("S").and_then(util::epoch_value) {
        Some(1) => Ok(Side::Buy),
        Some(2) => Ok(Side::Sell),
        Some(other) => Err(ParseError::InvalidField {
            field: "S",
            reason: other.to_string(),
        }),
        None => Err(ParseError::MissingField("S")),
    }
}

fn decimal(d: &Map<String, Value>, field: &'static str) -> Result<String, ParseError> {
    d.get(field)
        .and_then(util::decimal_text)
        .ok_or(ParseError::MissingField(field))
}

fn instant(
    d: &Map<String, Value>,
    field: &'static str,
    fallback: Option<i64>,
) -> Result<chrono::DateTime<chrono::Utc>, ParseError> {
    d.get(field)
        .and_then(util::epoch_value)
        .or(fallback)
        .and_then(util::from_epoch_millis)
        .ok_or(ParseError::MissingField(field))
}

/// Copies the listed MEXC fields into `extra` under readable names.
fn extras(d: &Map<String, Value>, fields: &[(&str, &str)]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|(from, to)| d.get(*from).map(|v| (to.to_string(), v.clone())))
        .collect()
}

fn parse_deal(
    d: &Map<String, Value>,
    channel: &str,
    symbol: Option<String>,
    push_time: Option<i64>,
) -> Result<AccountData, ParseError> {
    let mut extra = extras(
        d,
        &[
            ("i", "order_id"),
            ("t", "trade_id"),
            ("c", "client_order_id"),
            ("a", "amount"),
            ("n", "fee"),
            ("N", "fee_asset"),
        ],
    );
    if let Some(m) = d.get("m").and_then(util::epoch_value) {
        extra.insert("maker".into(), Value::Bool(m == 1));
    }

    Ok(AccountData {
        exchange: "mexc".into(),
        channel: channel.to_string(),
        kind: AccountEventKind::Deal,
        symbol,
        side: Some(side_code(d)?),
        quantity: Some(decimal(d, "v")?),
        price: Some(decimal(d, "p")?),
        timestamp: instant(d, "T", push_time)?,
        extra,
    })
}

fn parse_order(
    d: &Map<String, Value>,
    channel: &str,
    symbol: Option<String>,
    push_time: Option<i64>,
) -> Result<AccountData, ParseError> {
    let extra = extras(
        d,
        &[
            ("i", "order_id"),
            ("c", "client_order_id"),
            ("o", "order_type"),
            ("s", "status"),
            ("V", "remaining_quantity"),
            ("cv", "cumulative_quantity"),
            ("ap", "average_price"),
        ],
    );

    Ok(AccountData {
        exchange: "mexc".into(),
        channel: channel.to_string(),
        kind: AccountEventKind::Order,
        symbol,
        side: Some(side_code(d)?),
        quantity: Some(decimal(d, "v")?),
        price: Some(decimal(d, "p")?),
        timestamp: instant(d, "O", push_time)?,
        extra,
    })
}

fn parse_balance(
    d: &Map<String, Value>,
    channel: &str,
    push_time: Option<i64>,
) -> Result<AccountData, ParseError> {
    if !d.contains_key("a") {
        return Err(ParseError::MissingField("a"));
    }

    let extra = extras(
        d,
        &[
            ("a", "asset"),
            ("f", "free"),
            ("fd", "free_change"),
            ("l", "locked"),
            ("ld", "locked_change"),
            ("o", "change_type"),
        ],
    );

    Ok(AccountData {
        exchange: "mexc".into(),
        channel: channel.to_string(),
        kind: AccountEventKind::Balance,
        symbol: None,
        side: None,
        quantity: d.get("f").and_then(util::decimal_text),
        price: None,
        timestamp: instant(d, "c", push_time)?,
        extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(channel: &str) -> Subscription {
        Subscription {
            channel: channel.into(),
            instrument: String::new(),
        }
    }

    fn single(result: ParseResult) -> AccountData {
        match result {
            ParseResult::Market(mut events) => {
                assert_eq!(events.len(), 1);
                match events.remove(0) {
                    MarketMessage::Account(a) => a,
                    other => panic!("expected account event, got {:?}", other),
                }
            }
            other => panic!("expected market events, got {:?}", other),
        }
    }

    #[test]
    fn stream_url_carries_listen_key() {
        let token = SessionToken::new("abc");
        assert_eq!(
            MexcAdapter.stream_url("wss://wbs.mexc.com/ws", Some(&token)),
            "wss://wbs.mexc.com/ws?listenKey=abc"
        );
        assert_eq!(MexcAdapter.stream_url("wss://x/ws", None), "wss://x/ws");
    }

    #[test]
    fn subscribe_message_lists_channel() {
        let msg = MexcAdapter.build_subscribe_message(&sub(DEALS)).unwrap();
        assert_eq!(msg["method"], "SUBSCRIPTION");
        assert_eq!(msg["params"], json!([DEALS]));

        let scoped = Subscription {
            channel: "spot@public.deals.v3.api".into(),
            instrument: "BTC/USDT".into(),
        };
        let msg = MexcAdapter.build_subscribe_message(&scoped).unwrap();
        assert_eq!(msg["params"], json!(["spot@public.deals.v3.api@BTCUSDT"]));
    }

    #[test]
    fn no_app_ping() {
        assert!(MexcAdapter.build_app_ping().is_none());
        assert!(MexcAdapter.requires_session());
    }

    #[test]
    fn normalizes_private_deal() {
        let raw = r#"{"c":"spot@private.deals.v3.api","d":{"p":"1.804","v":"0.31","a":"0.55924","S":1,"T":1678901086198,"t":"5bbb6ad8b4474570b155610e3960cd","c":"","i":"2dd9f7fa4bd04a7c8a22c8a6ac7e9d7e","m":0,"st":0,"n":"0.000248206380027431","N":"MX"},"s":"MXUSDT","t":1661938980285}"#;

        let a = single(MexcAdapter.parse_message(raw, &sub(DEALS)));
        assert_eq!(a.kind, AccountEventKind::Deal);
        assert_eq!(a.symbol.as_deref(), Some("MX/USDT"));
        assert_eq!(a.side, Some(Side::Buy));
        assert_eq!(a.quantity.as_deref(), Some("0.31"));
        assert_eq!(a.price.as_deref(), Some("1.804"));
        assert_eq!(a.timestamp.timestamp_millis(), 1_678_901_086_198);
        assert_eq!(a.extra["order_id"], "2dd9f7fa4bd04a7c8a22c8a6ac7e9d7e");
        assert_eq!(a.extra["fee_asset"], "MX");
        assert_eq!(a.extra["maker"], false);
    }

    #[test]
    fn normalizes_order_update() {
        let raw = r#"{"c":"spot@private.orders.v3.api","d":{"A":8.0,"O":1661938138000,"S":2,"V":10,"a":8,"c":"","i":"e03a5c7441e44ed899466a7140b71391","m":0,"o":1,"p":0.8,"s":1,"v":10,"ap":0,"cv":0,"ca":0},"s":"MXUSDT","t":1661938138193}"#;

        let a = single(MexcAdapter.parse_message(raw, &sub(ORDERS)));
        assert_eq!(a.kind, AccountEventKind::Order);
        assert_eq!(a.side, Some(Side::Sell));
        assert_eq!(a.quantity.as_deref(), Some("10"));
        assert_eq!(a.price.as_deref(), Some("0.8"));
        assert_eq!(a.timestamp.timestamp_millis(), 1_661_938_138_000);
        assert_eq!(a.extra["status"], 1);
    }

    #[test]
    fn normalizes_balance_update() {
        let raw = r#"{"c":"spot@private.account.v3.api","d":{"a":"USDT","c":1678185928428,"f":"302.185113007893322435","fd":"-4.990689704","l":"4.990689704","ld":"4.990689704","o":"ENTRUST_PLACE"},"t":1678185928435}"#;

        let a = single(MexcAdapter.parse_message(raw, &sub(ACCOUNT)));
        assert_eq!(a.kind, AccountEventKind::Balance);
        assert_eq!(a.side, None);
        assert_eq!(a.quantity.as_deref(), Some("302.185113007893322435"));
        assert_eq!(a.extra["asset"], "USDT");
        assert_eq!(a.extra["change_type"], "ENTRUST_PLACE");
        assert_eq!(a.timestamp.timestamp_millis(), 1_678_185_928_428);
    }

    #[test]
    fn other_channels_and_acks_are_control() {
        let deal = r#"{"c":"spot@private.deals.v3.api","d":{"p":"1","v":"1","S":1,"T":1},"s":"MXUSDT","t":1}"#;
        assert!(matches!(MexcAdapter.parse_message(deal, &sub(ACCOUNT)), ParseResult::Control));

        let ack = r#"{"id":0,"code":0,"msg":"spot@private.deals.v3.api"}"#;
        assert!(matches!(MexcAdapter.parse_message(ack, &sub(DEALS)), ParseResult::Control));

        let pong = r#"{"id":0,"code":0,"msg":"PONG"}"#;
        assert!(matches!(MexcAdapter.parse_message(pong, &sub(DEALS)), ParseResult::Control));
    }

    #[test]
    fn rejected_subscription_is_reported() {
        let raw = r#"{"id":0,"code":1,"msg":"Blocked!"}"#;
        assert!(matches!(
            MexcAdapter.parse_message(raw, &sub(DEALS)),
            ParseResult::Error(ParseError::Exchange(_))
        ));
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(matches!(
            MexcAdapter.parse_message("[[[", &sub(DEALS)),
            ParseResult::Error(ParseError::Json(_))
        ));

        let no_data = r#"{"c":"spot@private.deals.v3.api","t":1}"#;
        assert!(matches!(
            MexcAdapter.parse_message(no_data, &sub(DEALS)),
            ParseResult::Error(ParseError::MissingField("d"))
        ));

        let bad_side = r#"{"c":"spot@private.deals.v3.api","d":{"p":"1","v":"1","S":7,"T":1},"t":1}"#;
        assert!(matches!(
            MexcAdapter.parse_message(bad_side, &sub(DEALS)),
            ParseResult::Error(ParseError::InvalidField { field: "S", .. })
        ));
    }
}
