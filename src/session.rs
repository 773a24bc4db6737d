//! Robot session: one bridge connection, one backend, one local pose.
//!
//! The session is the only owner of control state. Whoever runs the control
//! loop calls [`RobotSession::tick`] once per interval and reacts to the
//! returned [`SessionEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{RobotBackend, RobotControl};
use crate::bridge::{BridgeChannel, ChannelEvent, Transport};
use crate::config::{BackendKind, Config};
use crate::error::SessionError;
use crate::geo::{GeoPoint, LocalFrame, LocalPose};
use crate::locomotion::{PathEvent, VelocityCommand};
use crate::metrics::SessionMetrics;

/// Something the control loop should know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PathCompleted,
    /// The bridge went away without being asked to.
    LostConnection { reason: Option<String> },
    /// The channel was closed by [`RobotSession::destroy`].
    Disconnected,
}

pub type LostConnectionObserver = Box<dyn FnMut(Option<&str>) + Send>;

pub struct RobotSession {
    name: String,
    kind: BackendKind,
    channel: BridgeChannel,
    events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    backend: Option<RobotBackend>,
    frame: LocalFrame,
    pose: LocalPose,
    metrics: SessionMetrics,
    observers: Vec<LostConnectionObserver>,
}

impl RobotSession {
    /// Connect to the bridge and bring up the configured backend. Tuning
    /// parameters are published here, once.
    pub async fn initialise(
        config: &Config,
        robot_name: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, SessionError> {
        let client_id = config
            .channel
            .client_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", robot_name, Uuid::new_v4()));

        let mut channel = BridgeChannel::new(transport)
            .with_connect_timeout(Duration::from_secs(config.channel.connect_timeout_secs));
        let events = channel.take_events();
        channel
            .connect(
                &config.robot.ros_bridge_uri,
                config.robot.ros_bridge_port,
                &client_id,
            )
            .await?;

        let backend = RobotBackend::build(&channel.handle(), config)?;
        info!(
            robot = %robot_name,
            client_id = %client_id,
            backend = config.session.backend.as_str(),
            "session initialised"
        );

        Ok(Self {
            name: robot_name.to_string(),
            kind: config.session.backend,
            channel,
            events,
            backend: Some(backend),
            frame: config.origin.frame(),
            pose: LocalPose::default(),
            metrics: SessionMetrics::new(),
            observers: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    pub fn backend(&self) -> Option<&RobotBackend> {
        self.backend.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn is_destroyed(&self) -> bool {
        self.backend.is_none()
    }

    pub fn pose(&self) -> &LocalPose {
        &self.pose
    }

    /// Current position in WGS84. The local frame is planar, so altitude is zero.
    pub fn geo_position(&self) -> GeoPoint {
        self.frame.local_to_geo(&self.pose.position)
    }

    pub fn frame(&self) -> &LocalFrame {
        &self.frame
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut SessionMetrics {
        &mut self.metrics
    }

    /// Register a callback for unexpected disconnects.
    pub fn on_lost_connection<F>(&mut self, observer: F)
    where
        F: FnMut(Option<&str>) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// One control tick: lifecycle events, then inbound data, then
    /// navigation.
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        let mut events = self.drain_channel_events();
        self.metrics.ticks += 1;

        self.consume_inbound();
        let Some(backend) = self.backend.as_mut() else {
            return events;
        };
        match backend.evaluate(&self.pose) {
            Some(PathEvent::Advanced { index }) => {
                debug!(robot = %self.name, index, "next waypoint");
                self.metrics.record_waypoint();
            }
            Some(PathEvent::Completed) => {
                info!(robot = %self.name, "path completed");
                self.metrics.record_path_completed();
                events.push(SessionEvent::PathCompleted);
            }
            None => {}
        }
        events
    }

    /// Apply fresh inbound data to the local pose. Never blocks.
    pub fn consume_inbound(&mut self) -> usize {
        let Some(backend) = self.backend.as_mut() else {
            return 0;
        };
        let applied = backend.consume_inbound(&mut self.pose);
        let stats = backend.inbound_stats();
        self.metrics.inbound_applied += applied as u64;
        self.metrics.inbound_malformed = stats.malformed;
        self.metrics.inbound_overwritten = stats.overwritten;
        applied
    }

    /// Replace the local pose (e.g. after a manual relocalisation).
    pub fn override_pose(&mut self, pose: LocalPose) {
        self.pose = pose;
    }

    pub fn move_direct(&mut self, command: VelocityCommand) -> Result<(), SessionError> {
        Ok(self.control()?.move_direct(command)?)
    }

    pub fn move_path(&mut self, waypoints: Vec<GeoPoint>) -> Result<(), SessionError> {
        Ok(self.control()?.move_path(waypoints)?)
    }

    pub fn move_to_point(&mut self, point: GeoPoint) -> Result<(), SessionError> {
        Ok(self.control()?.move_to_point(point)?)
    }

    pub fn pause_path(&mut self) -> Result<(), SessionError> {
        Ok(self.control()?.pause_path()?)
    }

    pub fn resume_path(&mut self) -> Result<(), SessionError> {
        Ok(self.control()?.resume_path()?)
    }

    pub fn stop_robot(&mut self) -> Result<(), SessionError> {
        Ok(self.control()?.stop_robot()?)
    }

    pub fn status(&self) -> Value {
        let geo = self.geo_position();
        json!({
            "robot": self.name,
            "backend": self.kind.as_str(),
            "connected": self.is_connected(),
            "destroyed": self.is_destroyed(),
            "pose": self.pose,
            "position": geo,
            "control": self.backend.as_ref().map(|b| b.status()),
            "metrics": self.metrics,
            "command_success_rate": self.metrics.success_rate(),
        })
    }

    /// Disconnect and release the topic agents. Later calls do nothing.
    pub fn destroy(&mut self) {
        let Some(backend) = self.backend.take() else {
            return;
        };
        self.channel.disconnect();
        drop(backend);
        info!(robot = %self.name, "session destroyed");
    }

    fn control(&mut self) -> Result<&mut RobotBackend, SessionError> {
        self.backend.as_mut().ok_or(SessionError::Destroyed)
    }

    fn drain_channel_events(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        let Some(events) = self.events.as_mut() else {
            return out;
        };
        while let Ok(event) = events.try_recv() {
            match event {
                ChannelEvent::Connected { url } => {
                    debug!(robot = %self.name, url = %url, "channel connected");
                }
                ChannelEvent::Disconnected { clean: true, .. } => {
                    out.push(SessionEvent::Disconnected);
                }
                ChannelEvent::Disconnected {
                    clean: false,
                    reason,
                } => {
                    warn!(
                        robot = %self.name,
                        reason = reason.as_deref().unwrap_or("unknown"),
                        "lost connection to bridge"
                    );
                    self.metrics.lost_connections += 1;
                    for observer in self.observers.iter_mut() {
                        observer(reason.as_deref());
                    }
                    out.push(SessionEvent::LostConnection { reason });
                }
            }
        }
        out
    }
}

impl Drop for RobotSession {
    fn drop(&mut self) {
        self.destroy();
    }
}
