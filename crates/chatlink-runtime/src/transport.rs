//! Transport abstraction for the streaming connection
//!
//! The connection manager talks to the wire through the `Transport` trait so
//! tests can substitute a scripted in-memory transport. The production
//! implementation is a WebSocket via tokio-tungstenite: the socket is split
//! into a sink half kept by the manager and a reader task that pumps frames
//! into a channel, preserving wire order.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use chatlink_core::{ChatlinkError, ChatlinkResult};

// ----------------------------------------------------------------------------
// Transport Traits
// ----------------------------------------------------------------------------

/// Events produced by a live transport link, in wire order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived
    Message(String),
    /// The link closed; `code` is the close code when one was received
    Closed { code: Option<u16> },
    /// The link failed; a `Closed` event follows
    Error(String),
}

/// Outbound half of a live link
#[async_trait]
pub trait TransportSink: Send {
    /// Send one text frame
    async fn send_text(&mut self, text: &str) -> ChatlinkResult<()>;
    /// Close the link with a normal code
    async fn close(&mut self);
}

/// Receiving end of a link's event stream; ends when the link is exhausted
pub type TransportEvents = mpsc::Receiver<TransportEvent>;

/// Factory for live links
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a fresh link toward the given URL
    async fn connect(&self, url: &Url)
        -> ChatlinkResult<(Box<dyn TransportSink>, TransportEvents)>;
}

// ----------------------------------------------------------------------------
// WebSocket Transport
// ----------------------------------------------------------------------------

/// Production transport over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(
        &self,
        url: &Url,
    ) -> ChatlinkResult<(Box<dyn TransportSink>, TransportEvents)> {
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(ChatlinkError::transport)?;
        let (sink, mut reader) = stream.split();

        // Reader task: forward frames in wire order until the socket ends or
        // the manager drops the receiving side.
        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(result) = reader.next().await {
                let event = match result {
                    Ok(Message::Text(text)) => TransportEvent::Message(text),
                    Ok(Message::Close(frame)) => {
                        let code = frame.map(|f| u16::from(f.code));
                        let _ = event_tx.send(TransportEvent::Closed { code }).await;
                        break;
                    }
                    // Ping/pong are handled by tungstenite itself; binary
                    // frames are not part of the protocol.
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        let _ = event_tx.send(TransportEvent::Closed { code: None }).await;
                        break;
                    }
                };
                if event_tx.send(event).await.is_err() {
                    debug!("transport reader dropped, stopping pump");
                    break;
                }
            }
        });

        Ok((Box::new(WebSocketSink { sink }), event_rx))
    }
}

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    Message,
>;

struct WebSocketSink {
    sink: WsSink,
}

#[async_trait]
impl TransportSink for WebSocketSink {
    async fn send_text(&mut self, text: &str) -> ChatlinkResult<()> {
        self.sink
            .send(Message::Text(text.to_string()))
            .await
            .map_err(ChatlinkError::transport)
    }

    async fn close(&mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        if let Err(e) = self.sink.send(Message::Close(Some(frame))).await {
            debug!("close frame not delivered: {e}");
        }
    }
}
