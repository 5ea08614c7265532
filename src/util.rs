/// Utility helpers shared by the normalizers and the runner.
///
/// This module contains:
/// - Symbol conversion between internal and exchange formats
/// - Epoch → canonical instant conversion
/// - Decimal text extraction from JSON values
///
/// IMPORTANT:
/// - No exchange protocol logic lives here beyond the symbol
///   separator tables.
///
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in milliseconds.
///
/// Used for signed REST timestamps and subscribe messages.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Current Unix timestamp in seconds (Gate.io `time` fields).
pub fn now_secs() -> i64 {
    now_ms() / 1000
}

/// Convert an internal symbol ("BASE/QUOTE") into the exchange format.
///
/// Examples:
/// - ("gateio", "BTC/USDT") -> "BTC_USDT"
/// - ("mexc", "BTC/USDT")   -> "BTCUSDT"
///
/// Symbols already in exchange format pass through unchanged.
pub fn symbol_to_exchange(exchange: &str, symbol: &str) -> String {
    match exchange {
        "gateio" => symbol.replace('/', "_"),
        "mexc" => symbol.replace('/', ""),
        _ => symbol.to_string(),
    }
}

/// MEXC spot symbols carry no separator; these quotes are split off.
const MEXC_QUOTES: [&str; 4] = ["USDT", "USDC", "USD", "BTC"];

/// Convert an exchange-specific symbol into the internal format.
///
/// Examples:
/// - ("gateio", "BTC_USDT") -> "BTC/USDT"
/// - ("mexc", "MXUSDT")     -> "MX/USDT"
pub fn symbol_from_exchange(exchange: &str, symbol: &str) -> String {
    match exchange {
        "gateio" => symbol.replace('_', "/"),
        "mexc" => {
            for quote in MEXC_QUOTES {
                if let Some(base) = symbol.strip_suffix(quote) {
                    if !base.is_empty() {
                        return format!("{}/{}", base, quote);
                    }
                }
            }
            symbol.to_string()
        }
        _ => symbol.to_string(),
    }
}

/// Epoch seconds → canonical instant.
pub fn from_epoch_secs(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Epoch milliseconds → canonical instant.
pub fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Canonical text form: RFC 3339, millisecond precision, `Z` suffix.
pub fn format_instant(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Reads an integer epoch from a JSON number or numeric string.
///
/// Gate.io sends `create_time_ms` as "1700000000123.456"; the
/// fractional part is truncated.
pub fn epoch_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate_epoch)),
        Value::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().and_then(truncate_epoch)),
        _ => None,
    }
}

fn truncate_epoch(f: f64) -> Option<i64> {
    (f.is_finite() && f.abs() < i64::MAX as f64).then(|| f as i64)
}

/// Decimal text from a JSON string or number (NO scientific notation).
pub fn decimal_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => {
            let s = n.to_string();
            if !s.contains(['e', 'E']) {
                return Some(s);
            }
            // f64 Display is shortest round-trip and never uses an exponent
            Some(n.as_f64()?.to_string())
        }
        _ => None,
    }
}

/// Serde adapter for canonical instants (see [`format_instant`]).
pub mod instant_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_instant(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn symbols_convert_both_ways() {
        assert_eq!(symbol_to_exchange("gateio", "BTC/USDT"), "BTC_USDT");
        assert_eq!(symbol_from_exchange("gateio", "BTC_USDT"), "BTC/USDT");
        assert_eq!(symbol_to_exchange("mexc", "MX/USDT"), "MXUSDT");
        assert_eq!(symbol_from_exchange("mexc", "MXUSDT"), "MX/USDT");
        assert_eq!(symbol_from_exchange("mexc", "USDT"), "USDT");
    }

    #[test]
    fn epoch_seconds_and_millis_agree() {
        let a = from_epoch_secs(1_700_000_000).unwrap();
        let b = from_epoch_millis(1_700_000_000_000).unwrap();
        assert_eq!(a, b);
        assert_eq!(format_instant(&a), "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn epoch_value_accepts_fractional_strings() {
        assert_eq!(epoch_value(&json!("1700000000123.456")), Some(1_700_000_000_123));
        assert_eq!(epoch_value(&json!(1_700_000_000)), Some(1_700_000_000));
        assert_eq!(epoch_value(&json!(null)), None);
        assert_eq!(epoch_value(&json!("NaN")), None);
        assert_eq!(epoch_value(&json!("inf")), None);
        assert_eq!(epoch_value(&json!("1e300")), None);
    }

    #[test]
    fn decimal_text_avoids_exponent_notation() {
        assert_eq!(decimal_text(&json!("0.001")).as_deref(), Some("0.001"));
        assert_eq!(decimal_text(&json!(1.5)).as_deref(), Some("1.5"));
        assert_eq!(decimal_text(&json!(65000)).as_deref(), Some("65000"));
        assert_eq!(decimal_text(&json!(1e-7)).as_deref(), Some("0.0000001"));
        assert_eq!(decimal_text(&json!(1e-15)).as_deref(), Some("0.000000000000001"));
        assert_eq!(decimal_text(&json!(1.25e21)).as_deref(), Some("1250000000000000000000"));
        assert_eq!(decimal_text(&json!("")), None);
    }
}
