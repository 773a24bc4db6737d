//! Simulated robot. It listens to its own velocity topics, integrates the
//! latest command into a pose every tick and broadcasts that pose as GPS
//! odometry, standing in for the physical robot's localisation.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::debug;

use super::{
    locomotion, publish_tuning, InboundStats, RobotControl, Topics, CMD_VEL, JOYSTICK, ODOMETRY,
};
use crate::agent::{Publisher, Subscriber};
use crate::bridge::ChannelHandle;
use crate::config::Config;
use crate::error::{ChannelError, ControlError};
use crate::geo::{GeoPoint, LocalFrame, LocalPose, LocalPosition, Quaternion};
use crate::locomotion::{LocomotionController, PathEvent, TopicOutput, VelocityCommand};
use crate::messages::{Odometry, Twist};
use crate::ticker::Ticker;

pub struct VirtualBackend {
    locomotion: LocomotionController<TopicOutput>,
    cmd_vel: Subscriber<Twist>,
    joystick: Subscriber<Twist>,
    velocity: VelocityCommand,
    dt: f64,
    pose: watch::Sender<LocalPose>,
    _broadcast: Ticker,
}

impl VirtualBackend {
    /// Must be called inside a tokio runtime; the odometry broadcast runs as
    /// a task until the backend is dropped.
    pub fn new(channel: &ChannelHandle, topics: &Topics, config: &Config) -> Result<Self, ChannelError> {
        let locomotion = locomotion(channel, topics, config);
        let cmd_vel = Subscriber::new(channel, topics.name(CMD_VEL))?;
        let joystick = Subscriber::new(channel, topics.name(JOYSTICK))?;
        publish_tuning(channel, topics, &config.robot);

        let (pose, watcher) = watch::channel(LocalPose::default());
        let odometry: Publisher<Odometry> = Publisher::new(channel.clone(), topics.name(ODOMETRY));
        let frame = config.origin.frame();
        let broadcast = Ticker::spawn(
            "odometry",
            Duration::from_millis(config.session.odometry_interval_ms.max(1)),
            move || broadcast_pose(&odometry, &frame, &watcher.borrow()),
        );

        Ok(Self {
            locomotion,
            cmd_vel,
            joystick,
            velocity: VelocityCommand::ZERO,
            dt: config.session.tick_interval_ms as f64 / 1000.0,
            pose,
            _broadcast: broadcast,
        })
    }

    pub fn locomotion(&self) -> &LocomotionController<TopicOutput> {
        &self.locomotion
    }

    /// Velocity currently applied to the simulated body.
    pub fn velocity(&self) -> VelocityCommand {
        self.velocity
    }
}

fn broadcast_pose(odometry: &Publisher<Odometry>, frame: &LocalFrame, pose: &LocalPose) {
    let point = frame.local_to_geo(&pose.position);
    if let Err(e) = odometry.publish(&Odometry::from_geo(&point, pose.orientation)) {
        debug!(error = %e, "odometry broadcast skipped");
    }
}

/// Unicycle step: heading turns by `angular * dt`, then the body moves
/// `linear * dt` along the new heading. Heading zero faces east.
pub fn integrate(pose: &LocalPose, velocity: VelocityCommand, dt: f64) -> LocalPose {
    let yaw = pose.orientation.yaw() + velocity.angular * dt;
    let distance = velocity.linear * dt;
    LocalPose {
        position: LocalPosition::new(
            pose.position.x + distance * yaw.cos(),
            pose.position.y + distance * yaw.sin(),
            pose.position.z,
        ),
        orientation: Quaternion::from_yaw(yaw),
    }
}

impl RobotControl for VirtualBackend {
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
        // Direct commands win over the joystick when both arrive in one tick.
        for source in [&self.joystick, &self.cmd_vel] {
            if let Some(twist) = source.take() {
                self.velocity = twist.into();
                applied += 1;
            }
        }
        if self.velocity != VelocityCommand::ZERO {
            *pose = integrate(pose, self.velocity, self.dt);
        }
        self.pose.send_replace(*pose);
        applied
    }

    fn evaluate(&mut self, pose: &LocalPose) -> Option<PathEvent> {
        self.locomotion.tick(&pose.position)
    }

    fn status(&self) -> Value {
        json!({
            "locomotion": self.locomotion.status(),
            "velocity": self.velocity,
        })
    }

    fn inbound_stats(&self) -> InboundStats {
        InboundStats {
            malformed: self.cmd_vel.malformed() + self.joystick.malformed(),
            overwritten: self.cmd_vel.overwritten() + self.joystick.overwritten(),
        }
    }
}
