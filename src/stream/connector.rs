use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Url;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use crate::error::TransportError;

/// Raw text frames from one connection. Ends when the connection drops.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// Opens one push channel connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<FrameStream, TransportError>;
}

/// WebSocket connector for the backend's `/ws` endpoint.
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<FrameStream, TransportError> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                url: self.url.to_string(),
                message: e.to_string(),
            })?;
        debug!(url = %self.url, "WebSocket handshake complete");

        let frames = ws.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(_) => None, // Ignore binary, ping, pong, close
                Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
            }
        });
        Ok(frames.boxed())
    }
}
