//! Robot backends behind one control interface.
//!
//! The variant is picked once, from configuration, when the session starts.
//! [`RobotBackend`] is the only place that dispatches on it.

pub mod arlobot;
pub mod telerobot;
pub mod virtual_robot;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::agent::Publisher;
use crate::bridge::ChannelHandle;
use crate::config::{BackendKind, Config, RobotConfig};
use crate::error::{ChannelError, ControlError};
use crate::geo::{GeoPoint, LocalPose};
use crate::locomotion::{LocomotionController, PathEvent, TopicOutput, VelocityCommand};
use crate::messages::{Float32, Float32MultiArray};

pub use arlobot::ArlobotBackend;
pub use telerobot::TelerobotBackend;
pub use virtual_robot::VirtualBackend;

pub const CMD_VEL: &str = "/cmd_vel";
pub const WAYPOINT: &str = "/waypoint";
pub const WAYPOINT_STATE: &str = "/waypoint/state";
pub const CONTROL_PARAMETERS: &str = "/waypoint/control_parameters";
pub const MAX_LINEAR_SPEED: &str = "/waypoint/max_linear_speed";
pub const MAX_ANGULAR_SPEED: &str = "/waypoint/max_angular_speed";
pub const ODOMETRY: &str = "/robot_gps_pose";
pub const ULTRASONIC: &str = "/ultrasonic_data";
pub const JOYSTICK: &str = "/teleop_velocity_smoother/raw_cmd_vel";

/// Topic names under a robot namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    namespace: String,
}

impl Topics {
    /// `""` and `"/"` mean the root namespace.
    pub fn new(namespace: &str) -> Self {
        let trimmed = namespace.trim().trim_end_matches('/');
        let namespace = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self { namespace }
    }

    pub fn name(&self, topic: &str) -> String {
        format!("{}{}", self.namespace, topic)
    }
}

/// Counts over every subscriber a backend owns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InboundStats {
    pub malformed: u64,
    pub overwritten: u64,
}

/// The capability set every backend offers.
pub trait RobotControl {
    fn move_direct(&mut self, command: VelocityCommand) -> Result<(), ControlError>;
    fn move_path(&mut self, waypoints: Vec<GeoPoint>) -> Result<(), ControlError>;
    fn move_to_point(&mut self, point: GeoPoint) -> Result<(), ControlError>;
    fn pause_path(&mut self) -> Result<(), ControlError>;
    fn resume_path(&mut self) -> Result<(), ControlError>;
    fn stop_robot(&mut self) -> Result<(), ControlError>;

    /// Apply whatever arrived since the last tick. Returns how many inbound
    /// messages were applied.
    fn consume_inbound(&mut self, pose: &mut LocalPose) -> usize;

    /// Check navigation progress against the current pose.
    fn evaluate(&mut self, pose: &LocalPose) -> Option<PathEvent>;

    fn status(&self) -> Value;
    fn inbound_stats(&self) -> InboundStats;
}

pub enum RobotBackend {
    Arlobot(ArlobotBackend),
    Virtual(VirtualBackend),
    Telerobot(TelerobotBackend),
}

impl RobotBackend {
    /// Create the backend's topic agents on `channel`. The channel should
    /// already be connected so advertisements go out immediately.
    pub fn build(channel: &ChannelHandle, config: &Config) -> Result<Self, ChannelError> {
        let topics = Topics::new(&config.session.namespace);
        let backend = match config.session.backend {
            BackendKind::Arlobot => {
                RobotBackend::Arlobot(ArlobotBackend::new(channel, &topics, config)?)
            }
            BackendKind::Virtual => {
                RobotBackend::Virtual(VirtualBackend::new(channel, &topics, config)?)
            }
            BackendKind::Telerobot => {
                RobotBackend::Telerobot(TelerobotBackend::new(channel, &topics))
            }
        };
        info!(
            robot = %config.robot_name,
            backend = backend.kind().as_str(),
            "backend ready"
        );
        Ok(backend)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            RobotBackend::Arlobot(_) => BackendKind::Arlobot,
            RobotBackend::Virtual(_) => BackendKind::Virtual,
            RobotBackend::Telerobot(_) => BackendKind::Telerobot,
        }
    }

    fn inner(&self) -> &dyn RobotControl {
        match self {
            RobotBackend::Arlobot(b) => b,
            RobotBackend::Virtual(b) => b,
            RobotBackend::Telerobot(b) => b,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn RobotControl {
        match self {
            RobotBackend::Arlobot(b) => b,
            RobotBackend::Virtual(b) => b,
            RobotBackend::Telerobot(b) => b,
        }
    }
}

impl RobotControl for RobotBackend {
    fn move_direct(&mut self, command: VelocityCommand) -> Result<(), ControlError> {
        self.inner_mut().move_direct(command)
    }

    fn move_path(&mut self, waypoints: Vec<GeoPoint>) -> Result<(), ControlError> {
        self.inner_mut().move_path(waypoints)
    }

    fn move_to_point(&mut self, point: GeoPoint) -> Result<(), ControlError> {
        self.inner_mut().move_to_point(point)
    }

    fn pause_path(&mut self) -> Result<(), ControlError> {
        self.inner_mut().pause_path()
    }

    fn resume_path(&mut self) -> Result<(), ControlError> {
        self.inner_mut().resume_path()
    }

    fn stop_robot(&mut self) -> Result<(), ControlError> {
        self.inner_mut().stop_robot()
    }

    fn consume_inbound(&mut self, pose: &mut LocalPose) -> usize {
        self.inner_mut().consume_inbound(pose)
    }

    fn evaluate(&mut self, pose: &LocalPose) -> Option<PathEvent> {
        self.inner_mut().evaluate(pose)
    }

    fn status(&self) -> Value {
        self.inner().status()
    }

    fn inbound_stats(&self) -> InboundStats {
        self.inner().inbound_stats()
    }
}

/// Publishers for the waypoint follower's command topics.
pub(crate) fn topic_output(channel: &ChannelHandle, topics: &Topics) -> TopicOutput {
    TopicOutput {
        cmd_vel: Publisher::new(channel.clone(), topics.name(CMD_VEL)),
        waypoint: Publisher::new(channel.clone(), topics.name(WAYPOINT)),
        waypoint_state: Publisher::new(channel.clone(), topics.name(WAYPOINT_STATE)),
    }
}

pub(crate) fn locomotion(
    channel: &ChannelHandle,
    topics: &Topics,
    config: &Config,
) -> LocomotionController<TopicOutput> {
    LocomotionController::new(topic_output(channel, topics), config.origin.frame())
        .with_threshold(config.robot.waypoint_distance_threshold)
        .with_start_index(config.session.waypoint_start_index)
}

/// Send speed limits and follower gains. Called once per session.
pub(crate) fn publish_tuning(channel: &ChannelHandle, topics: &Topics, robot: &RobotConfig) {
    let max_linear: Publisher<Float32> = Publisher::new(channel.clone(), topics.name(MAX_LINEAR_SPEED));
    let max_angular: Publisher<Float32> =
        Publisher::new(channel.clone(), topics.name(MAX_ANGULAR_SPEED));
    let gains: Publisher<Float32MultiArray> =
        Publisher::new(channel.clone(), topics.name(CONTROL_PARAMETERS));

    let results = [
        max_linear.publish(&Float32 {
            data: robot.max_linear_speed,
        }),
        max_angular.publish(&Float32 {
            data: robot.max_angular_speed,
        }),
        gains.publish(&robot.control_parameters().into()),
    ];
    for e in results.into_iter().filter_map(Result::err) {
        warn!(error = %e, "tuning parameter not sent");
    }
    info!(
        max_linear = robot.max_linear_speed,
        max_angular = robot.max_angular_speed,
        "tuning parameters published"
    );
}
