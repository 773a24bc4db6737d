//! In-process transport. Each `open` hands the far end of the link to whoever
//! holds the remote receiver: a test, or the [`loopback`] bridge.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::protocol::{self, BridgeOp};
use super::{InboundFrame, OutboundFrame, Transport, TransportLink};
use crate::error::ConnectError;

/// The bridge side of one in-memory link.
pub struct MemoryRemote {
    pub url: String,
    pub sent: mpsc::UnboundedReceiver<OutboundFrame>,
    pub inject: mpsc::UnboundedSender<InboundFrame>,
    closed: bool,
}

impl MemoryRemote {
    /// Every op the client has sent so far.
    pub fn drain_ops(&mut self) -> Vec<BridgeOp> {
        let mut ops = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            match frame {
                OutboundFrame::Text(text) => match protocol::decode(&text) {
                    Ok(op) => ops.push(op),
                    Err(e) => debug!(error = %e, "undecodable client frame"),
                },
                OutboundFrame::Close => self.closed = true,
            }
        }
        ops
    }

    /// Whether the client has sent a close frame.
    pub fn saw_close(&mut self) -> bool {
        let _ = self.drain_ops();
        self.closed
    }

    pub fn publish(&self, topic: &str, msg: Value) {
        let op = BridgeOp::Publish {
            id: None,
            topic: topic.to_string(),
            msg,
        };
        if let Ok(frame) = protocol::encode(&op) {
            self.inject_raw(&frame);
        }
    }

    pub fn inject_raw(&self, frame: &str) {
        let _ = self.inject.send(InboundFrame::Text(frame.to_string()));
    }

    /// Close the link from the bridge side without the client asking.
    pub fn drop_connection(&self, reason: &str) {
        let _ = self.inject.send(InboundFrame::Closed {
            reason: Some(reason.to_string()),
        });
    }
}

pub struct MemoryTransport {
    remotes: mpsc::UnboundedSender<MemoryRemote>,
    refuse: Option<String>,
}

impl MemoryTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryRemote>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                remotes: tx,
                refuse: None,
            },
            rx,
        )
    }

    /// A transport whose every `open` fails.
    pub fn refusing(reason: &str) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            remotes: tx,
            refuse: Some(reason.to_string()),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &str) -> Result<TransportLink, ConnectError> {
        if let Some(reason) = &self.refuse {
            return Err(ConnectError::Refused(reason.clone()));
        }
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let remote = MemoryRemote {
            url: url.to_string(),
            sent: out_rx,
            inject: in_tx,
            closed: false,
        };
        self.remotes
            .send(remote)
            .map_err(|_| ConnectError::Refused("memory bridge is gone".to_string()))?;
        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// An in-process bridge that echoes every publish back to subscribers of the
/// same topic. Must be called inside a tokio runtime.
pub fn loopback() -> MemoryTransport {
    let (transport, mut remotes) = MemoryTransport::new();
    tokio::spawn(async move {
        while let Some(remote) = remotes.recv().await {
            tokio::spawn(serve_loopback(remote));
        }
    });
    transport
}

async fn serve_loopback(mut remote: MemoryRemote) {
    let mut subscribed: HashSet<String> = HashSet::new();
    while let Some(OutboundFrame::Text(text)) = remote.sent.recv().await {
        match protocol::decode(&text) {
            Ok(BridgeOp::Subscribe { topic, .. }) => {
                subscribed.insert(topic);
            }
            Ok(BridgeOp::Unsubscribe { topic, .. }) => {
                subscribed.remove(&topic);
            }
            Ok(BridgeOp::Publish { topic, msg, .. }) if subscribed.contains(&topic) => {
                remote.publish(&topic, msg);
            }
            _ => {}
        }
    }
    let _ = remote.inject.send(InboundFrame::Closed { reason: None });
}
