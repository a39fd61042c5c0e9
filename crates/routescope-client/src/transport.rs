//! Duplex transports that deliver raw trace channel events.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_BUFFER: usize = 256;

/// Lifecycle and payload events from one transport connection, in delivery
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(String),
    Close,
}

pub type TransportEvents = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// Opens connections to a trace endpoint.
pub trait Transport: Send + Sync + 'static {
    /// Starts connecting to `url` and returns the connection's events.
    /// Dropping the stream closes the connection. Called from within a
    /// Tokio runtime.
    fn open(&self, url: &Url) -> TransportEvents;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsTransport {
    buffer: usize,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_BUFFER,
        }
    }
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many undelivered events may queue before the socket reader
    /// waits.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

impl Transport for WsTransport {
    fn open(&self, url: &Url) -> TransportEvents {
        let (tx, rx) = mpsc::channel(self.buffer);
        tokio::spawn(run_socket(url.clone(), tx));
        Box::pin(ReceiverStream::new(rx))
    }
}

async fn run_socket(url: Url, tx: mpsc::Sender<TransportEvent>) {
    let connected = tokio::select! {
        _ = tx.closed() => return,
        result = tokio_tungstenite::connect_async(url.as_str()) => result,
    };

    let mut ws = match connected {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!(url = %url, "WebSocket connect failed: {}", e);
            let _ = tx.send(TransportEvent::Error(e.to_string())).await;
            let _ = tx.send(TransportEvent::Close).await;
            return;
        }
    };

    if tx.send(TransportEvent::Open).await.is_err() {
        let _ = ws.close(None).await;
        return;
    }

    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!(url = %url, "Receiver dropped, closing WebSocket");
                let _ = ws.close(None).await;
                return;
            }
            frame = ws.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if tx.send(TransportEvent::Message(text)).await.is_err() {
                        let _ = ws.close(None).await;
                        return;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                // Pings are answered by tungstenite; binary frames carry no traces.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(url = %url, "WebSocket error: {}", e);
                    let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
            }
        }
    }

    let _ = tx.send(TransportEvent::Close).await;
}
