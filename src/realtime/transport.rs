//! Duplex transport for realtime sessions

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::events::{ClientEvent, ServerEvent};
use crate::{Error, Result};

/// Default realtime endpoint
pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// A bidirectional event channel to the realtime model
#[async_trait]
pub trait RealtimeTransport: Send {
    /// Send one event
    ///
    /// # Errors
    ///
    /// Returns `Error::WebSocket` if the transport is broken
    async fn send(&mut self, event: &ClientEvent) -> Result<()>;

    /// Next server event; `None` once the transport is closed
    ///
    /// Malformed messages yield `Some(Err(Error::Protocol(_)))` and the
    /// transport stays usable.
    async fn next_event(&mut self) -> Option<Result<ServerEvent>>;

    /// Close the transport
    ///
    /// # Errors
    ///
    /// Returns `Error::WebSocket` if the close handshake fails
    async fn close(&mut self) -> Result<()>;
}

/// Realtime transport over a WebSocket
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketTransport {
    /// Connect to `url` for `model`
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be built or the connection fails
    pub async fn connect(url: &str, model: &str, api_key: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for realtime".to_string()));
        }

        let endpoint = format!("{url}?model={model}");
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| Error::WebSocket(format!("invalid realtime url {endpoint}: {e}")))?;

        let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| Error::Config(format!("invalid API key: {e}")))?;
        let headers = request.headers_mut();
        headers.insert("Authorization", auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        tracing::info!(url = %url, model = %model, "connecting realtime session");

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::WebSocket(format!("realtime connect failed: {e}")))?;

        tracing::debug!("realtime session connected");
        Ok(Self { stream })
    }
}

#[async_trait]
impl RealtimeTransport for WebSocketTransport {
    async fn send(&mut self, event: &ClientEvent) -> Result<()> {
        let json = event.to_json()?;
        tracing::trace!(event = event.event_type(), bytes = json.len(), "-> realtime");
        self.stream
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<Result<ServerEvent>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(ServerEvent::parse(text.as_str())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "realtime session closed by server");
                    return None;
                }
                Ok(Message::Binary(data)) => {
                    tracing::trace!(bytes = data.len(), "ignoring binary realtime message");
                }
                Ok(_) => {}
                Err(e) => return Some(Err(Error::WebSocket(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }
}
