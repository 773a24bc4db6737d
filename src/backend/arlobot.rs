use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{locomotion, publish_tuning, InboundStats, RobotControl, Topics, ODOMETRY, ULTRASONIC};
use crate::agent::Subscriber;
use crate::bridge::ChannelHandle;
use crate::config::Config;
use crate::error::{ChannelError, ControlError};
use crate::geo::{GeoPoint, LocalFrame, LocalPose};
use crate::locomotion::{LocomotionController, PathEvent, TopicOutput, VelocityCommand};
use crate::messages::{Odometry, StringMsg};

/// Physical robot running the on-board waypoint follower. Pose comes back as
/// GPS odometry; the ultrasonic reading is kept as an opaque string.
pub struct ArlobotBackend {
    locomotion: LocomotionController<TopicOutput>,
    frame: LocalFrame,
    odometry: Subscriber<Odometry>,
    ultrasonic: Subscriber<StringMsg>,
    last_ultrasonic: Option<String>,
    rejected: u64,
}

impl ArlobotBackend {
    pub fn new(channel: &ChannelHandle, topics: &Topics, config: &Config) -> Result<Self, ChannelError> {
        let locomotion = locomotion(channel, topics, config);
        let odometry = Subscriber::new(channel, topics.name(ODOMETRY))?;
        let ultrasonic = Subscriber::new(channel, topics.name(ULTRASONIC))?;
        publish_tuning(channel, topics, &config.robot);

        Ok(Self {
            locomotion,
            frame: config.origin.frame(),
            odometry,
            ultrasonic,
            last_ultrasonic: None,
            rejected: 0,
        })
    }

    pub fn locomotion(&self) -> &LocomotionController<TopicOutput> {
        &self.locomotion
    }

    /// Latest raw ultrasonic payload.
    pub fn ultrasonic(&self) -> Option<&str> {
        self.last_ultrasonic.as_deref()
    }
}

impl RobotControl for ArlobotBackend {
    fn move_direct(&mut self, command: VelocityCommand) -> Result<(), ControlError> {
        self.locomotion.move_direct(command);
        Ok(())
    }

    fn move_path(&mut self, waypoints: Vec<GeoPoint>) -> Result<(), ControlError> {
        Ok(self.locomotion.move_path(waypoints)?)
    }

    fn move_to_point(&mut self, point: GeoPoint) -> Result<(), ControlError> {
        Ok(self.locomotion.move_to_point(point)?)
    }

    fn pause_path(&mut self) -> Result<(), ControlError> {
        self.locomotion.pause_path();
        Ok(())
    }

    fn resume_path(&mut self) -> Result<(), ControlError> {
        self.locomotion.resume_path();
        Ok(())
    }

    fn stop_robot(&mut self) -> Result<(), ControlError> {
        self.locomotion.stop_robot();
        Ok(())
    }

    fn consume_inbound(&mut self, pose: &mut LocalPose) -> usize {
        let mut applied = 0;
        if let Some(odometry) = self.odometry.take() {
            let point = odometry.geo_point();
            if point.is_valid() {
                pose.position = self.frame.geo_to_local(&point);
                pose.orientation = odometry.orientation();
                applied += 1;
            } else {
                // Decodes fine but is not a position on Earth
                self.rejected += 1;
                warn!(
                    latitude = point.latitude,
                    longitude = point.longitude,
                    "dropping out-of-range odometry"
                );
            }
        }
        if let Some(reading) = self.ultrasonic.take() {
            debug!(len = reading.data.len(), "ultrasonic reading");
            self.last_ultrasonic = Some(reading.data);
            applied += 1;
        }
        applied
    }

    fn evaluate(&mut self, pose: &LocalPose) -> Option<PathEvent> {
        self.locomotion.tick(&pose.position)
    }

    fn status(&self) -> Value {
        json!({
            "locomotion": self.locomotion.status(),
            "ultrasonic": self.last_ultrasonic,
        })
    }

    fn inbound_stats(&self) -> InboundStats {
        InboundStats {
            malformed: self.odometry.malformed() + self.ultrasonic.malformed() + self.rejected,
            overwritten: self.odometry.overwritten() + self.ultrasonic.overwritten(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::memory::{MemoryRemote, MemoryTransport};
    use crate::bridge::protocol::BridgeOp;
    use crate::bridge::BridgeChannel;
    use crate::config::BackendKind;
    use crate::geo::Quaternion;
    use std::sync::Arc;
    use std::time::Duration;

    async fn connected() -> (BridgeChannel, MemoryRemote, Config) {
        let (transport, mut remotes) = MemoryTransport::new();
        let mut channel = BridgeChannel::new(Arc::new(transport));
        channel.connect("localhost", 9090, "arlo").await.unwrap();
        let remote = remotes.try_recv().unwrap();
        let mut config = Config::default_for_backend("arlo".to_string(), BackendKind::Arlobot);
        config.origin = crate::config::OriginConfig::Geographic(GeoPoint::new(55.605, 15.0, 0.0));
        (channel, remote, config)
    }

    #[tokio::test]
    async fn test_startup_subscribes_and_publishes_tuning() {
        let (channel, mut remote, config) = connected().await;
        let _backend = ArlobotBackend::new(&channel.handle(), &Topics::new(""), &config).unwrap();

        let ops = remote.drain_ops();
        let subscribed: Vec<&str> = ops
            .iter()
            .filter_map(|op| match op {
                BridgeOp::Subscribe { topic, .. } => Some(topic.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(subscribed, vec!["/robot_gps_pose", "/ultrasonic_data"]);

        let published: Vec<&str> = ops
            .iter()
            .filter_map(|op| match op {
                BridgeOp::Publish { topic, .. } => Some(topic.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            published,
            vec![
                "/waypoint/max_linear_speed",
                "/waypoint/max_angular_speed",
                "/waypoint/control_parameters"
            ]
        );
    }

    #[tokio::test]
    async fn test_odometry_updates_pose() {
        let (channel, remote, config) = connected().await;
        let mut backend = ArlobotBackend::new(&channel.handle(), &Topics::new(""), &config).unwrap();

        let target = config.origin.frame().local_to_geo(&crate::geo::LocalPosition::new(3.0, 4.0, 0.0));
        let odom = Odometry::from_geo(&target, Quaternion::from_yaw(0.5));
        remote.publish("/robot_gps_pose", serde_json::to_value(&odom).unwrap());
        remote.publish("/ultrasonic_data", json!({"data": "12,40,33"}));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut pose = LocalPose::default();
        assert_eq!(backend.consume_inbound(&mut pose), 2);
        assert!((pose.position.x - 3.0).abs() < 1e-3);
        assert!((pose.position.y - 4.0).abs() < 1e-3);
        assert!((pose.orientation.yaw() - 0.5).abs() < 1e-9);
        assert_eq!(backend.ultrasonic(), Some("12,40,33"));

        // Nothing new: pose untouched.
        let before = pose;
        assert_eq!(backend.consume_inbound(&mut pose), 0);
        assert_eq!(pose, before);
    }

    #[tokio::test]
    async fn test_malformed_odometry_does_not_block_ultrasonic() {
        let (channel, remote, config) = connected().await;
        let mut backend = ArlobotBackend::new(&channel.handle(), &Topics::new(""), &config).unwrap();

        remote.publish("/robot_gps_pose", json!({"pose": "garbage"}));
        remote.publish("/ultrasonic_data", json!({"data": "7"}));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut pose = LocalPose::default();
        assert_eq!(backend.consume_inbound(&mut pose), 1);
        assert_eq!(backend.ultrasonic(), Some("7"));
        assert_eq!(backend.inbound_stats().malformed, 1);
    }

    #[tokio::test]
    async fn test_empty_or_out_of_range_odometry_leaves_pose_alone() {
        let (channel, remote, config) = connected().await;
        let mut backend = ArlobotBackend::new(&channel.handle(), &Topics::new(""), &config).unwrap();
        let mut pose = LocalPose {
            position: crate::geo::LocalPosition::new(2.0, 1.0, 0.0),
            ..Default::default()
        };
        let before = pose;

        remote.publish("/robot_gps_pose", json!({}));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.consume_inbound(&mut pose), 0);
        assert_eq!(pose, before);
        assert_eq!(backend.inbound_stats().malformed, 1);

        remote.publish("/robot_gps_pose", json!({"bogus": 1}));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.consume_inbound(&mut pose), 0);
        assert_eq!(backend.inbound_stats().malformed, 2);

        // Latitude 200: axes swapped by the sender
        let swapped = json!({"pose": {"pose": {"position": {"x": 55.605, "y": 200.0, "z": 0.0}}}});
        remote.publish("/robot_gps_pose", swapped);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.consume_inbound(&mut pose), 0);
        assert_eq!(pose, before);
        assert_eq!(backend.inbound_stats().malformed, 3);
    }
}
