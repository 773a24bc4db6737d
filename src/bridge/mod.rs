//! Messaging channel to a rosbridge server.
//!
//! The channel speaks the rosbridge JSON protocol over any [`Transport`]: a
//! duplex pipe of text frames. [`websocket::WebSocketTransport`] is the real
//! one, [`memory::MemoryTransport`] keeps everything in-process.

pub mod channel;
pub mod memory;
pub mod protocol;
pub mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ConnectError;

pub use channel::{bridge_url, BridgeChannel, ChannelEvent, ChannelHandle, PayloadCallback};

/// Frame queued by the channel for the remote end.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// Frame delivered by the transport. `Closed` is always the last one.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Text(String),
    Closed { reason: Option<String> },
}

/// An open duplex link. Dropping `outbound` or sending `Close` shuts it down.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> Result<TransportLink, ConnectError>;
}
