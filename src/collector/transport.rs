use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::Message,
};

use crate::error::TransportError;

/// One open WebSocket, as seen by the listener runtime.
///
/// The runtime only ever needs these three operations; keeping them
/// behind a trait lets the state machine run against an in-memory
/// socket in tests.
#[async_trait::async_trait]
pub trait WsTransport: Send {
    async fn send(&mut self, msg: Message) -> Result<(), TransportError>;

    /// Next inbound frame; `None` once the stream is exhausted.
    ///
    /// Must be cancel-safe: the runtime polls it inside `select!`.
    async fn next_frame(&mut self) -> Option<Result<Message, TransportError>>;

    /// Best-effort close handshake.
    async fn close(&mut self);
}

/// Dials WebSocket URLs.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsTransport>, TransportError>;
}

// ------------------------------------------------------------
// tokio-tungstenite implementation
// ------------------------------------------------------------
pub struct TungsteniteConnector;

struct TungsteniteTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsTransport>, TransportError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(TungsteniteTransport { ws }))
    }
}

#[async_trait::async_trait]
impl WsTransport for TungsteniteTransport {
    async fn send(&mut self, msg: Message) -> Result<(), TransportError> {
        self.ws.send(msg).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Message, TransportError>> {
        self.ws
            .next()
            .await
            .map(|frame| frame.map_err(TransportError::from))
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}
