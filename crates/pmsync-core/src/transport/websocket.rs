//! Bidirectional WebSocket transport.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{identity_query, with_query, ConnectParams, Transport, WireMessage};
use crate::error::{Error, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// JSON text frames over one WebSocket connection.
pub struct WebSocketTransport {
    url: String,
    sink: Option<SplitSink<Socket, Message>>,
    stream: Option<SplitStream<Socket>>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sink: None,
            stream: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&mut self, params: &ConnectParams) -> Result<()> {
        self.close().await;

        let url = with_query(&self.url, &identity_query(params));
        tracing::debug!("ws: connecting to {}", self.url);
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|error| Error::Transport(format!("connect to {} failed: {error}", self.url)))?;

        let (sink, stream) = socket.split();
        self.sink = Some(sink);
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, message: &WireMessage) -> Result<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::Transport("websocket is not open".to_string()))?;

        let text = message.to_json()?;
        sink.send(Message::Text(text))
            .await
            .map_err(|error| Error::Transport(format!("send {} failed: {error}", message.kind())))
    }

    async fn next_message(&mut self) -> Option<Result<WireMessage>> {
        loop {
            let frame = self.stream.as_mut()?.next().await?;
            match frame {
                Ok(Message::Text(text)) => return Some(WireMessage::from_json(&text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(
                        serde_json::from_slice(&bytes).map_err(Error::Serialization),
                    );
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!("ws: peer closed connection: {frame:?}");
                    self.sink = None;
                    self.stream = None;
                    return None;
                }
                // Ping replies are queued by tungstenite itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(error) => {
                    return Some(Err(Error::Transport(format!("receive failed: {error}"))));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(error) = sink.close().await {
                tracing::debug!("ws: close failed: {error}");
            }
        }
        self.stream = None;
    }

    fn is_bidirectional(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_before_open_fails() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:9/sync");
        let result = transport
            .send(&WireMessage::Heartbeat { timestamp: 1 })
            .await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(transport.next_message().await.is_none());
    }

    #[tokio::test]
    async fn open_against_closed_port_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport = WebSocketTransport::new(format!("ws://127.0.0.1:{port}/sync"));
        let result = transport.open(&ConnectParams::new("alice", "token")).await;
        assert!(result.unwrap_err().is_transport());
    }
}
