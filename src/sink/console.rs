use std::io::Write;

use crate::error::SinkError;
use crate::schema::MarketMessage;

use super::EventSink;

/// Prints one line per event on stdout.
///
/// Trades:   `🔴 SELL | 1.5 @ $65000 | 2023-11-14T22:13:20.000Z`
/// Account:  `📨 Deal MX/USDT BUY | 0.31 @ $1.804 | ... | {extra}`
pub struct ConsoleSink;

pub fn render(event: &MarketMessage) -> String {
    match event {
        MarketMessage::Trade(t) => t.to_string(),
        MarketMessage::Account(a) => a.to_string(),
    }
}

#[async_trait::async_trait]
impl EventSink for ConsoleSink {
    async fn store(&self, event: &MarketMessage) -> Result<(), SinkError> {
        let line = render(event);
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AccountData, AccountEventKind, Side};
    use crate::util;
    use serde_json::{Map, Value};

    #[test]
    fn renders_account_event_with_extras() {
        let mut extra = Map::new();
        extra.insert("fee_asset".into(), Value::String("MX".into()));

        let event = MarketMessage::Account(AccountData {
            exchange: "mexc".into(),
            channel: "spot@private.deals.v3.api".into(),
            kind: AccountEventKind::Deal,
            symbol: Some("MX/USDT".into()),
            side: Some(Side::Buy),
            quantity: Some("0.31".into()),
            price: Some("1.804".into()),
            timestamp: util::from_epoch_millis(1_678_901_086_198).unwrap(),
            extra,
        });

        assert_eq!(
            render(&event),
            r#"📨 Deal MX/USDT BUY | 0.31 @ $1.804 | 2023-03-15T17:24:46.198Z | {"fee_asset":"MX"}"#
        );
    }

    #[tokio::test]
    async fn store_writes_without_error() {
        let event = MarketMessage::Account(AccountData {
            exchange: "mexc".into(),
            channel: "spot@private.account.v3.api".into(),
            kind: AccountEventKind::Balance,
            symbol: None,
            side: None,
            quantity: Some("1".into()),
            price: None,
            timestamp: util::from_epoch_secs(0).unwrap(),
            extra: Map::new(),
        });

        ConsoleSink.store(&event).await.unwrap();
    }
}
