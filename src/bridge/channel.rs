use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::protocol::{self, BridgeOp};
use super::{InboundFrame, OutboundFrame, Transport, TransportLink};
use crate::error::{ChannelError, ConnectError};

/// Invoked on the network task for every message received on a topic.
pub type PayloadCallback = Arc<dyn Fn(&Value) + Send + Sync>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle notifications for the channel owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected { url: String },
    /// `clean` is true only for a caller-initiated [`BridgeChannel::disconnect`].
    Disconnected { clean: bool, reason: Option<String> },
}

struct TopicSubscription {
    msg_type: String,
    callbacks: Vec<PayloadCallback>,
}

struct Shared {
    client_id: Mutex<String>,
    outbound: Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>,
    advertised: Mutex<HashMap<String, String>>,
    subscriptions: Mutex<HashMap<String, TopicSubscription>>,
    sequence: AtomicU64,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn next_id(&self, op: &str, topic: &str) -> Option<String> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        Some(format!("{}:{}:{}:{}", op, topic, lock(&self.client_id), seq))
    }

    fn is_connected(&self) -> bool {
        lock(&self.outbound).is_some()
    }

    fn send(&self, topic: &str, op: &BridgeOp) -> Result<(), ChannelError> {
        let frame = protocol::encode(op)?;
        let outbound = lock(&self.outbound);
        outbound
            .as_ref()
            .and_then(|tx| tx.send(OutboundFrame::Text(frame)).ok())
            .ok_or_else(|| ChannelError::NotConnected {
                topic: topic.to_string(),
            })
    }

    fn advertise_op(&self, topic: &str, msg_type: &str) -> BridgeOp {
        BridgeOp::Advertise {
            id: self.next_id("advertise", topic),
            topic: topic.to_string(),
            msg_type: msg_type.to_string(),
        }
    }

    fn subscribe_op(&self, topic: &str, msg_type: &str) -> BridgeOp {
        BridgeOp::Subscribe {
            id: self.next_id("subscribe", topic),
            topic: topic.to_string(),
            msg_type: Some(msg_type.to_string()),
            queue_length: Some(1),
        }
    }

    /// Re-send every known advertisement and subscription on a fresh link.
    fn replay(&self) {
        let advertised: Vec<(String, String)> = lock(&self.advertised)
            .iter()
            .map(|(t, m)| (t.clone(), m.clone()))
            .collect();
        let subscribed: Vec<(String, String)> = lock(&self.subscriptions)
            .iter()
            .map(|(t, s)| (t.clone(), s.msg_type.clone()))
            .collect();

        for (topic, msg_type) in advertised {
            if let Err(e) = self.send(&topic, &self.advertise_op(&topic, &msg_type)) {
                warn!(topic = %topic, error = %e, "failed to advertise");
            }
        }
        for (topic, msg_type) in subscribed {
            if let Err(e) = self.send(&topic, &self.subscribe_op(&topic, &msg_type)) {
                warn!(topic = %topic, error = %e, "failed to subscribe");
            }
        }
    }

    fn dispatch(&self, frame: &str) {
        match protocol::decode(frame) {
            Ok(BridgeOp::Publish { topic, msg, .. }) => {
                let callbacks: Vec<PayloadCallback> = lock(&self.subscriptions)
                    .get(&topic)
                    .map(|s| s.callbacks.clone())
                    .unwrap_or_default();
                if callbacks.is_empty() {
                    debug!(topic = %topic, "message on unsubscribed topic");
                }
                for callback in callbacks {
                    callback(&msg);
                }
            }
            Ok(BridgeOp::Status { level, msg, .. }) => {
                if level == "error" {
                    warn!(status = %msg, "bridge reported error");
                } else {
                    debug!(level = %level, status = %msg, "bridge status");
                }
            }
            Ok(op) => debug!(op = ?op, "ignoring bridge op"),
            Err(e) => warn!(error = %e, "malformed bridge frame"),
        }
    }
}

/// Cloneable publish/subscribe access to a channel, used by topic agents.
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Arc<Shared>,
}

impl ChannelHandle {
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Fire-and-forget: the frame is queued for the writer task and never blocks.
    pub fn publish(&self, topic: &str, msg: Value) -> Result<(), ChannelError> {
        let op = BridgeOp::Publish {
            id: None,
            topic: topic.to_string(),
            msg,
        };
        self.shared.send(topic, &op)
    }

    /// Register `topic` as published with `msg_type`. Sent now if connected,
    /// otherwise on the next connect.
    pub fn advertise(&self, topic: &str, msg_type: &str) -> Result<(), ChannelError> {
        let fresh = lock(&self.shared.advertised)
            .insert(topic.to_string(), msg_type.to_string())
            .is_none();
        if fresh && self.is_connected() {
            self.shared
                .send(topic, &self.shared.advertise_op(topic, msg_type))?;
        }
        Ok(())
    }

    /// Attach a callback to `topic`. Several callbacks may share one topic;
    /// only the first one sends a subscribe request.
    pub fn subscribe(
        &self,
        topic: &str,
        msg_type: &str,
        on_receive: PayloadCallback,
    ) -> Result<(), ChannelError> {
        let first = {
            let mut subscriptions = lock(&self.shared.subscriptions);
            let entry = subscriptions
                .entry(topic.to_string())
                .or_insert_with(|| TopicSubscription {
                    msg_type: msg_type.to_string(),
                    callbacks: Vec::new(),
                });
            entry.callbacks.push(on_receive);
            entry.callbacks.len() == 1
        };
        if first && self.is_connected() {
            self.shared
                .send(topic, &self.shared.subscribe_op(topic, msg_type))?;
        }
        info!(topic = %topic, msg_type = %msg_type, "subscribed");
        Ok(())
    }
}

/// Build the bridge URL, adding the `ws://` scheme when missing.
pub fn bridge_url(uri: &str, port: u16) -> Result<String, ConnectError> {
    let uri = uri.trim();
    let (scheme, rest) = match uri.split_once("://") {
        Some((scheme, rest)) if scheme == "ws" || scheme == "wss" => (scheme, rest),
        Some(_) => return Err(ConnectError::InvalidUrl(uri.to_string())),
        None => ("ws", uri),
    };
    let host = rest.trim_end_matches('/');
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(ConnectError::InvalidUrl(uri.to_string()));
    }
    Ok(format!("{}://{}:{}", scheme, host, port))
}

/// Duplex connection to a rosbridge server.
pub struct BridgeChannel {
    transport: Arc<dyn Transport>,
    handle: ChannelHandle,
    events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    reader: Option<JoinHandle<()>>,
    connect_timeout: Duration,
}

impl BridgeChannel {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Shared {
            client_id: Mutex::new(String::new()),
            outbound: Mutex::new(None),
            advertised: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            events: events_tx,
        };
        Self {
            transport,
            handle: ChannelHandle {
                shared: Arc::new(shared),
            },
            events: Some(events_rx),
            reader: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    /// Lifecycle event queue. Can be taken once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ChannelEvent>> {
        self.events.take()
    }

    /// Open the link and start the inbound dispatcher. No retry on failure.
    pub async fn connect(&mut self, uri: &str, port: u16, client_id: &str) -> Result<(), ConnectError> {
        if self.is_connected() {
            return Ok(());
        }
        let url = bridge_url(uri, port)?;
        *lock(&self.handle.shared.client_id) = client_id.to_string();

        let link = tokio::time::timeout(self.connect_timeout, self.transport.open(&url))
            .await
            .map_err(|_| ConnectError::Timeout {
                url: url.clone(),
                secs: self.connect_timeout.as_secs(),
            })??;
        let TransportLink {
            outbound,
            mut inbound,
        } = link;

        let shared = Arc::clone(&self.handle.shared);
        *lock(&shared.outbound) = Some(outbound);
        shared.replay();

        let reader_shared = Arc::clone(&shared);
        self.reader = Some(tokio::spawn(async move {
            let reason = loop {
                match inbound.recv().await {
                    Some(InboundFrame::Text(frame)) => reader_shared.dispatch(&frame),
                    Some(InboundFrame::Closed { reason }) => break reason,
                    None => break Some("transport dropped".to_string()),
                }
            };
            // Still holding the sender means nobody asked for this close.
            let lost = lock(&reader_shared.outbound).take().is_some();
            if lost {
                warn!(reason = ?reason, "bridge connection lost");
                let _ = reader_shared.events.send(ChannelEvent::Disconnected {
                    clean: false,
                    reason,
                });
            }
        }));

        info!(url = %url, client_id = %client_id, "connected to rosbridge");
        let _ = shared.events.send(ChannelEvent::Connected { url });
        Ok(())
    }

    /// Close the link. Idempotent; a no-op when already disconnected.
    pub fn disconnect(&mut self) {
        let outbound = lock(&self.handle.shared.outbound).take();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(tx) = outbound {
            let _ = tx.send(OutboundFrame::Close);
            info!("disconnected from rosbridge");
            let _ = self.handle.shared.events.send(ChannelEvent::Disconnected {
                clean: true,
                reason: None,
            });
        }
    }

    pub fn publish(&self, topic: &str, msg: Value) -> Result<(), ChannelError> {
        self.handle.publish(topic, msg)
    }

    pub fn subscribe(
        &self,
        topic: &str,
        msg_type: &str,
        on_receive: PayloadCallback,
    ) -> Result<(), ChannelError> {
        self.handle.subscribe(topic, msg_type, on_receive)
    }
}
