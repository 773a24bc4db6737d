use serde_json::{json, Value};
use tracing::warn;

use super::{InboundStats, RobotControl, Topics, CMD_VEL};
use crate::agent::Publisher;
use crate::bridge::ChannelHandle;
use crate::error::ControlError;
use crate::geo::{GeoPoint, LocalPose};
use crate::locomotion::{MotionState, PathEvent, VelocityCommand};
use crate::messages::Twist;

const NAME: &str = "telerobot";

/// Direct-drive robot with no waypoint follower on board.
pub struct TelerobotBackend {
    cmd_vel: Publisher<Twist>,
    motion: MotionState,
    dropped_publishes: u64,
}

impl TelerobotBackend {
    pub fn new(channel: &ChannelHandle, topics: &Topics) -> Self {
        Self {
            cmd_vel: Publisher::new(channel.clone(), topics.name(CMD_VEL)),
            motion: MotionState::Stopped,
            dropped_publishes: 0,
        }
    }

    pub fn motion(&self) -> MotionState {
        self.motion
    }

    fn send(&mut self, command: VelocityCommand) {
        if let Err(e) = self.cmd_vel.publish(&command.into()) {
            self.dropped_publishes += 1;
            warn!(error = %e, "velocity command dropped");
        }
    }

    fn unsupported(operation: &'static str) -> Result<(), ControlError> {
        Err(ControlError::Unsupported {
            backend: NAME,
            operation,
        })
    }
}

impl RobotControl for TelerobotBackend {
    fn move_direct(&mut self, command: VelocityCommand) -> Result<(), ControlError> {
        self.send(command);
        self.motion = MotionState::Moving;
        Ok(())
    }

    fn move_path(&mut self, _waypoints: Vec<GeoPoint>) -> Result<(), ControlError> {
        Self::unsupported("move_path")
    }

    fn move_to_point(&mut self, _point: GeoPoint) -> Result<(), ControlError> {
        Self::unsupported("move_to_point")
    }

    fn pause_path(&mut self) -> Result<(), ControlError> {
        Self::unsupported("pause_path")
    }

    fn resume_path(&mut self) -> Result<(), ControlError> {
        Self::unsupported("resume_path")
    }

    /// Zero velocity, re-sent on every call.
    fn stop_robot(&mut self) -> Result<(), ControlError> {
        self.send(VelocityCommand::ZERO);
        self.motion = MotionState::Stopped;
        Ok(())
    }

    fn consume_inbound(&mut self, _pose: &mut LocalPose) -> usize {
        0
    }

    fn evaluate(&mut self, _pose: &LocalPose) -> Option<PathEvent> {
        None
    }

    fn status(&self) -> Value {
        json!({
            "locomotion": {
                "mode": "direct",
                "motion": self.motion,
                "dropped_publishes": self.dropped_publishes,
            }
        })
    }

    fn inbound_stats(&self) -> InboundStats {
        InboundStats::default()
    }
}
