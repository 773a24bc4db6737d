//! Topic agents: one topic, one direction, one message schema.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::bridge::ChannelHandle;
use crate::error::ChannelError;
use crate::mailbox::Mailbox;
use crate::messages::RosMessage;

pub type Decoder<M> = fn(&Value) -> Result<M, serde_json::Error>;

fn serde_decoder<M: RosMessage>(value: &Value) -> Result<M, serde_json::Error> {
    M::deserialize(value)
}

/// Typed publisher bound to one topic.
pub struct Publisher<M> {
    topic: String,
    channel: ChannelHandle,
    _msg: PhantomData<fn(M)>,
}

impl<M> Clone for Publisher<M> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            channel: self.channel.clone(),
            _msg: PhantomData,
        }
    }
}

impl<M: RosMessage> Publisher<M> {
    pub fn new(channel: ChannelHandle, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        if let Err(e) = channel.advertise(&topic, M::TYPE) {
            warn!(topic = %topic, error = %e, "advertise failed");
        }
        Self {
            topic,
            channel,
            _msg: PhantomData,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Serialize and enqueue. Never blocks; fails only when disconnected.
    pub fn publish(&self, message: &M) -> Result<(), ChannelError> {
        let msg = serde_json::to_value(message)?;
        self.channel.publish(&self.topic, msg)
    }
}

/// Typed subscriber that keeps only the latest decoded message.
pub struct Subscriber<M> {
    topic: String,
    mailbox: Mailbox<M>,
    malformed: Arc<AtomicU64>,
}

impl<M: RosMessage> Subscriber<M> {
    pub fn new(channel: &ChannelHandle, topic: impl Into<String>) -> Result<Self, ChannelError> {
        Self::with_decoder(channel, topic, serde_decoder::<M>)
    }

    /// Decoding runs on the network task; only successfully decoded messages
    /// reach the mailbox.
    pub fn with_decoder(
        channel: &ChannelHandle,
        topic: impl Into<String>,
        decode: Decoder<M>,
    ) -> Result<Self, ChannelError> {
        let topic = topic.into();
        let mailbox = Mailbox::new();
        let malformed = Arc::new(AtomicU64::new(0));

        let sink = mailbox.clone();
        let bad = Arc::clone(&malformed);
        let name = topic.clone();
        channel.subscribe(
            &topic,
            M::TYPE,
            Arc::new(move |value: &Value| match decode(value) {
                Ok(message) => sink.put(message),
                Err(e) => {
                    bad.fetch_add(1, Ordering::Relaxed);
                    warn!(topic = %name, error = %e, "dropping malformed message");
                }
            }),
        )?;

        Ok(Self {
            topic,
            mailbox,
            malformed,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The freshest unconsumed message, at most once per arrival.
    pub fn take(&self) -> Option<M> {
        self.mailbox.take()
    }

    pub fn has_new_data(&self) -> bool {
        self.mailbox.has_new_data()
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn overwritten(&self) -> u64 {
        self.mailbox.overwritten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::memory::MemoryTransport;
    use crate::bridge::protocol::BridgeOp;
    use crate::bridge::BridgeChannel;
    use crate::messages::{Float32, StringMsg};
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_publisher_advertises_and_publishes() {
        let (transport, mut remotes) = MemoryTransport::new();
        let mut channel = BridgeChannel::new(Arc::new(transport));
        channel.connect("localhost", 9090, "t").await.unwrap();
        let mut remote = remotes.try_recv().unwrap();

        let publisher: Publisher<Float32> =
            Publisher::new(channel.handle(), "/waypoint/max_linear_speed");
        publisher.publish(&Float32 { data: 0.5 }).unwrap();

        let ops = remote.drain_ops();
        assert!(matches!(&ops[0], BridgeOp::Advertise { msg_type, .. } if msg_type == "std_msgs/Float32"));
        match &ops[1] {
            BridgeOp::Publish { topic, msg, .. } => {
                assert_eq!(topic, "/waypoint/max_linear_speed");
                assert_eq!(msg["data"], 0.5);
            }
            other => panic!("expected publish, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_when_disconnected_is_error_not_panic() {
        let (transport, _remotes) = MemoryTransport::new();
        let channel = BridgeChannel::new(Arc::new(transport));
        let publisher: Publisher<StringMsg> = Publisher::new(channel.handle(), "/waypoint/state");
        let result = publisher.publish(&StringMsg {
            data: "STOP".to_string(),
        });
        assert!(matches!(result, Err(ChannelError::NotConnected { .. })));
    }

    #[tokio::test]
    async fn test_subscriber_keeps_latest_value() {
        let (transport, mut remotes) = MemoryTransport::new();
        let mut channel = BridgeChannel::new(Arc::new(transport));
        channel.connect("localhost", 9090, "t").await.unwrap();
        let remote = remotes.try_recv().unwrap();

        let sub: Subscriber<StringMsg> = Subscriber::new(&channel.handle(), "/ultrasonic_data").unwrap();
        remote.publish("/ultrasonic_data", serde_json::json!({"data": "first"}));
        remote.publish("/ultrasonic_data", serde_json::json!({"data": "second"}));
        settle().await;

        assert!(sub.has_new_data());
        assert_eq!(sub.take().unwrap().data, "second");
        assert!(sub.take().is_none());
        assert_eq!(sub.overwritten(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_counted_not_stored() {
        let (transport, mut remotes) = MemoryTransport::new();
        let mut channel = BridgeChannel::new(Arc::new(transport));
        channel.connect("localhost", 9090, "t").await.unwrap();
        let remote = remotes.try_recv().unwrap();

        let sub: Subscriber<Float32> = Subscriber::new(&channel.handle(), "/speed").unwrap();
        remote.publish("/speed", serde_json::json!({"data": "fast"}));
        settle().await;

        assert!(!sub.has_new_data());
        assert_eq!(sub.malformed(), 1);
    }

    #[tokio::test]
    async fn test_custom_decoder() {
        fn upper(value: &Value) -> Result<StringMsg, serde_json::Error> {
            let mut msg: StringMsg = serde_json::from_value(value.clone())?;
            msg.data = msg.data.to_uppercase();
            Ok(msg)
        }

        let (transport, mut remotes) = MemoryTransport::new();
        let mut channel = BridgeChannel::new(Arc::new(transport));
        channel.connect("localhost", 9090, "t").await.unwrap();
        let remote = remotes.try_recv().unwrap();

        let sub = Subscriber::with_decoder(&channel.handle(), "/ultrasonic_data", upper).unwrap();
        remote.publish("/ultrasonic_data", serde_json::json!({"data": "near"}));
        settle().await;
        assert_eq!(sub.take().unwrap().data, "NEAR");
    }
}
