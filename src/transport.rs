//! Transport seam between the client and the directory service.
//!
//! The client only ever opens a connection, writes text frames to it, closes
//! it, and consumes a stream of [`TransportEvent`]s. [`Connector`] and
//! [`TransportSink`] capture that surface so the session logic can run over
//! a real WebSocket ([`WebSocketConnector`]) or an in-memory transport in
//! tests.

use async_trait::async_trait;
use futures::{
    SinkExt,
    StreamExt,
    stream::{self, BoxStream, SplitSink},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::debug;

/// Errors raised by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("failed to open connection to {url}: {reason}")]
    Open { url: String, reason: String },
    /// Writing a frame failed.
    #[error("failed to send frame: {0}")]
    Send(String),
    /// The connection reported an error while reading.
    #[error("connection error: {0}")]
    Connection(String),
    /// The transport has already been closed.
    #[error("transport is closed")]
    Closed,
}

/// Inbound notifications produced by an open transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A complete text frame.
    Message(String),
    /// The peer closed the connection.
    Closed,
    /// The connection failed.
    Error(TransportError),
}

/// Stream of inbound events for one connection.
pub type TransportEvents = BoxStream<'static, TransportEvent>;

/// Write half of an open connection.
#[async_trait]
pub trait TransportSink: Send + 'static {
    /// Write one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection. Closing twice must not panic.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An open connection split into its write half and inbound event stream.
pub struct Transport {
    pub sink: Box<dyn TransportSink>,
    pub events: TransportEvents,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Factory for new connections to the directory service.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `url`.
    async fn open(&self, url: &str) -> Result<Transport, TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

struct WebSocketSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportSink for WebSocketSink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<Transport, TransportError> {
        let (ws, _response) = connect_async(url).await.map_err(|e| TransportError::Open {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        debug!(url, "websocket connected");
        let (sink, stream) = ws.split();

        let events = stream
            .filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => Some(TransportEvent::Message(text.as_str().to_owned())),
                    Ok(Message::Binary(bytes)) => String::from_utf8(bytes.to_vec())
                        .ok()
                        .map(TransportEvent::Message),
                    Ok(Message::Close(_)) => Some(TransportEvent::Closed),
                    // Ping/pong are answered by tungstenite itself.
                    Ok(_) => None,
                    Err(e) => Some(TransportEvent::Error(TransportError::Connection(
                        e.to_string(),
                    ))),
                }
            })
            .chain(stream::once(async { TransportEvent::Closed }))
            .boxed();

        Ok(Transport {
            sink: Box::new(WebSocketSink { inner: sink }),
            events,
        })
    }
}
