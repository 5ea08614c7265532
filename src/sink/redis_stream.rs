use log::{debug, info};
use redis::aio::MultiplexedConnection;

use crate::error::SinkError;
use crate::schema::MarketMessage;

use super::EventSink;

/// Appends every event to a redis stream.
///
/// Command:
///     XADD <stream> MAXLEN ~ <maxlen> * data <json>
///
/// NOTES:
/// - The multiplexed connection is cheap to clone and reconnects
///   are left to the caller: a failed XADD is a dropped event
/// - `data` holds the serde form of `MarketMessage` (tagged by `type`)
pub struct RedisStreamSink {
    conn: MultiplexedConnection,
    stream: String,
    maxlen: usize,
}

impl RedisStreamSink {
    pub async fn connect(url: &str, stream: String, maxlen: usize) -> Result<Self, SinkError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;

        info!("redis sink connected, stream `{}` (maxlen ~{})", stream, maxlen);

        Ok(Self { conn, stream, maxlen })
    }
}

/// Field/value body of the XADD entry.
pub fn entry_payload(event: &MarketMessage) -> Result<String, SinkError> {
    Ok(serde_json::to_string(event)?)
}

#[async_trait::async_trait]
impl EventSink for RedisStreamSink {
    async fn store(&self, event: &MarketMessage) -> Result<(), SinkError> {
        let payload = entry_payload(event)?;
        let mut conn = self.conn.clone();

        let id: String = redis::cmd("XADD")
            .arg(&self.stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.maxlen)
            .arg("*")
            .arg("data")
            .arg(payload)
            .query_async(&mut conn)
            .await?;

        debug!("[{}] XADD {} -> {}", event.exchange(), self.stream, id);
        Ok(())
    }
}
