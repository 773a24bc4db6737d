use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tokio_tungstenite::connect_async;
use tracing::{debug, warn};

use super::{InboundFrame, OutboundFrame, Transport, TransportLink};
use crate::error::ConnectError;

/// rosbridge over a plain WebSocket. A writer task drains the outbound queue
/// and a reader task forwards text frames until the socket closes.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

fn connect_error(e: tungstenite::Error) -> ConnectError {
    match e {
        tungstenite::Error::Url(e) => ConnectError::InvalidUrl(e.to_string()),
        tungstenite::Error::Io(e) => ConnectError::Refused(e.to_string()),
        other => ConnectError::Handshake(other.to_string()),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<TransportLink, ConnectError> {
        let (stream, _response) = connect_async(url).await.map_err(connect_error)?;
        let (mut write, mut read) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<InboundFrame>();

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                match frame {
                    OutboundFrame::Text(text) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            warn!(error = %e, "websocket send failed");
                            break;
                        }
                    }
                    OutboundFrame::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            let _ = write.close().await;
        });

        tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx.send(InboundFrame::Text(text.to_string())).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bin))) => {
                        debug!(len = bin.len(), "ignoring binary frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.to_string());
                    }
                    // ping/pong are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                }
            };
            let _ = in_tx.send(InboundFrame::Closed { reason });
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_bridge_is_connect_error() {
        // Port 9 (discard) is closed on any sane test host.
        let result = WebSocketTransport.open("ws://127.0.0.1:9").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_malformed_url_is_connect_error() {
        let result = WebSocketTransport.open("not a url").await;
        assert!(result.is_err());
    }
}
