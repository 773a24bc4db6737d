//! Locomotion controller: arbitrates between direct teleoperation and
//! waypoint traversal for one robot.
//!
//! The controller is driven from the control tick only. It never reads the
//! network directly; the session hands it the current local position and it
//! reacts through a [`MotionOutput`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::Publisher;
use crate::error::{ChannelError, InvalidPathError};
use crate::geo::{GeoPoint, LocalFrame, LocalPosition};
use crate::messages::{GeoPointMsg, StringMsg, Twist};

pub const DEFAULT_WAYPOINT_THRESHOLD: f64 = 0.1;

/// Forward speed and yaw rate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub linear: f64,
    pub angular: f64,
}

impl VelocityCommand {
    pub const ZERO: VelocityCommand = VelocityCommand {
        linear: 0.0,
        angular: 0.0,
    };

    pub const fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }
}

/// Value published on the waypoint state topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WaypointState {
    Running,
    Stop,
    Park,
}

impl WaypointState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaypointState::Running => "RUNNING",
            WaypointState::Stop => "STOP",
            WaypointState::Park => "PARK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocomotionMode {
    Direct,
    Waypoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    Moving,
    Stopped,
}

/// Outcome of a tick that reached the current target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathEvent {
    /// Moved on to the waypoint at `index`.
    Advanced { index: usize },
    /// Reached the final waypoint; the robot has been stopped.
    Completed,
}

/// Where the controller's commands go.
#[cfg_attr(test, mockall::automock)]
pub trait MotionOutput {
    fn velocity(&self, command: VelocityCommand) -> Result<(), ChannelError>;
    fn target(&self, point: GeoPoint) -> Result<(), ChannelError>;
    fn state(&self, state: WaypointState) -> Result<(), ChannelError>;
}

/// The three command topics of a waypoint-capable robot.
#[derive(Clone)]
pub struct TopicOutput {
    pub cmd_vel: Publisher<Twist>,
    pub waypoint: Publisher<GeoPointMsg>,
    pub waypoint_state: Publisher<StringMsg>,
}

impl MotionOutput for TopicOutput {
    fn velocity(&self, command: VelocityCommand) -> Result<(), ChannelError> {
        self.cmd_vel.publish(&command.into())
    }

    fn target(&self, point: GeoPoint) -> Result<(), ChannelError> {
        self.waypoint.publish(&point.into())
    }

    fn state(&self, state: WaypointState) -> Result<(), ChannelError> {
        self.waypoint_state.publish(&state.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocomotionStatus {
    pub mode: LocomotionMode,
    pub motion: MotionState,
    pub waypoint_index: Option<usize>,
    pub waypoint_count: usize,
    pub dropped_publishes: u64,
}

pub struct LocomotionController<O> {
    output: O,
    frame: LocalFrame,
    threshold: f64,
    start_index: usize,
    mode: LocomotionMode,
    motion: MotionState,
    waypoints: Vec<GeoPoint>,
    index: usize,
    target: Option<LocalPosition>,
    dropped_publishes: u64,
}

impl<O: MotionOutput> LocomotionController<O> {
    pub fn new(output: O, frame: LocalFrame) -> Self {
        Self {
            output,
            frame,
            threshold: DEFAULT_WAYPOINT_THRESHOLD,
            start_index: 0,
            mode: LocomotionMode::Direct,
            motion: MotionState::Stopped,
            waypoints: Vec::new(),
            index: 0,
            target: None,
            dropped_publishes: 0,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    pub fn mode(&self) -> LocomotionMode {
        self.mode
    }

    pub fn motion(&self) -> MotionState {
        self.motion
    }

    /// Index of the current target, when following a path.
    pub fn waypoint_index(&self) -> Option<usize> {
        if self.waypoints.is_empty() {
            None
        } else {
            Some(self.index)
        }
    }

    pub fn waypoints(&self) -> &[GeoPoint] {
        &self.waypoints
    }

    pub fn dropped_publishes(&self) -> u64 {
        self.dropped_publishes
    }

    pub fn status(&self) -> LocomotionStatus {
        LocomotionStatus {
            mode: self.mode,
            motion: self.motion,
            waypoint_index: self.waypoint_index(),
            waypoint_count: self.waypoints.len(),
            dropped_publishes: self.dropped_publishes,
        }
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn move_direct(&mut self, command: VelocityCommand) {
        if self.mode == LocomotionMode::Waypoint {
            self.publish_state(WaypointState::Stop);
            self.waypoints.clear();
            self.index = 0;
            self.target = None;
        }
        self.publish_velocity(command);
        self.mode = LocomotionMode::Direct;
        self.motion = MotionState::Moving;
    }

    /// Replace the active path. Nothing changes when the path is rejected.
    pub fn move_path(&mut self, waypoints: Vec<GeoPoint>) -> Result<(), InvalidPathError> {
        if waypoints.is_empty() {
            return Err(InvalidPathError::Empty);
        }
        if self.start_index >= waypoints.len() {
            return Err(InvalidPathError::StartIndexOutOfRange {
                start: self.start_index,
                len: waypoints.len(),
            });
        }
        if let Some(index) = waypoints.iter().position(|p| !p.is_valid()) {
            return Err(InvalidPathError::InvalidPoint { index });
        }

        info!(
            waypoints = waypoints.len(),
            start = self.start_index,
            "starting path"
        );
        self.waypoints = waypoints;
        self.index = self.start_index;
        self.mode = LocomotionMode::Waypoint;
        self.publish_current_target();
        self.publish_state(WaypointState::Running);
        self.motion = MotionState::Moving;
        Ok(())
    }

    pub fn move_to_point(&mut self, point: GeoPoint) -> Result<(), InvalidPathError> {
        let start_index = std::mem::replace(&mut self.start_index, 0);
        let result = self.move_path(vec![point]);
        self.start_index = start_index;
        result
    }

    /// Publishes PARK only; mode and motion are left as they are.
    pub fn pause_path(&mut self) {
        self.publish_state(WaypointState::Park);
    }

    pub fn resume_path(&mut self) {
        self.publish_state(WaypointState::Running);
    }

    /// Always re-publishes, even when already stopped.
    pub fn stop_robot(&mut self) {
        self.publish_state(WaypointState::Stop);
        self.publish_velocity(VelocityCommand::ZERO);
        self.motion = MotionState::Stopped;
    }

    /// Check the current target against `position`. Advances at most one
    /// waypoint per call.
    pub fn tick(&mut self, position: &LocalPosition) -> Option<PathEvent> {
        if self.mode != LocomotionMode::Waypoint || self.motion != MotionState::Moving {
            return None;
        }
        let target = self.target?;
        let distance = position.distance(&target);
        // NaN on either side never counts as reached
        if distance.partial_cmp(&self.threshold) != Some(Ordering::Less) {
            return None;
        }

        if self.index + 1 < self.waypoints.len() {
            self.index += 1;
            debug!(index = self.index, distance, "waypoint reached, advancing");
            self.publish_current_target();
            Some(PathEvent::Advanced { index: self.index })
        } else {
            info!(waypoints = self.waypoints.len(), "path completed");
            self.stop_robot();
            Some(PathEvent::Completed)
        }
    }

    fn publish_current_target(&mut self) {
        let Some(point) = self.waypoints.get(self.index).copied() else {
            self.target = None;
            return;
        };
        self.target = Some(self.frame.geo_to_local(&point));
        let result = self.output.target(point);
        self.record("waypoint", result);
    }

    fn publish_state(&mut self, state: WaypointState) {
        let result = self.output.state(state);
        self.record(state.as_str(), result);
    }

    fn publish_velocity(&mut self, command: VelocityCommand) {
        let result = self.output.velocity(command);
        self.record("velocity", result);
    }

    fn record(&mut self, what: &str, result: Result<(), ChannelError>) {
        if let Err(e) = result {
            self.dropped_publishes += 1;
            warn!(publish = what, error = %e, "command dropped");
        }
    }
}
