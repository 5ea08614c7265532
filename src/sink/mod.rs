//! Event sinks
//!
//! The sink is the last stage of the pipeline: it receives every
//! normalized event. Its failures are contained by the runner
//! (logged + counted); they never end a session.

pub mod console;
pub mod redis_stream;

use std::sync::Arc;

use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::schema::MarketMessage;

/// Fire-and-forget storage of one normalized event.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn store(&self, event: &MarketMessage) -> Result<(), SinkError>;
}

/// Builds the configured sink. Connection failures here are startup
/// errors.
pub async fn build_sink(cfg: &SinkConfig) -> anyhow::Result<Arc<dyn EventSink>> {
    match cfg {
        SinkConfig::Console => Ok(Arc::new(console::ConsoleSink)),
        SinkConfig::Redis { url, stream, maxlen } => Ok(Arc::new(
            redis_stream::RedisStreamSink::connect(url, stream.clone(), *maxlen).await?,
        )),
    }
}
