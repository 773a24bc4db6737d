use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::ConfigError;
use crate::geo::{geo_to_utm, GeoPoint, LocalFrame, UtmPoint};
use crate::messages::ControlParameters;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Robot name, used for logging and the default client id
    pub robot_name: String,

    /// Robot tuning and bridge address
    #[serde(default)]
    pub robot: RobotConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// Geographic point that maps to local-space zero
    pub origin: OriginConfig,
}

/// Read-only robot configuration, injected at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    #[serde(default = "default_bridge_uri")]
    pub ros_bridge_uri: String,
    #[serde(default = "default_bridge_port")]
    pub ros_bridge_port: u16,
    #[serde(default = "default_threshold")]
    pub waypoint_distance_threshold: f64,
    #[serde(default = "default_max_linear_speed")]
    pub max_linear_speed: f32,
    #[serde(default = "default_max_angular_speed")]
    pub max_angular_speed: f32,
    #[serde(default = "default_rho")]
    pub control_parameter_rho: f32,
    #[serde(default = "default_roll")]
    pub control_parameter_roll: f32,
    #[serde(default = "default_pitch")]
    pub control_parameter_pitch: f32,
    #[serde(default)]
    pub control_parameter_yaw: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Generated per run when absent
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Prefix applied to every topic name
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub waypoint_start_index: usize,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_odometry_interval")]
    pub odometry_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Physical waypoint-following robot
    Arlobot,
    /// Simulated robot that integrates its own velocity
    Virtual,
    /// Direct-drive only
    Telerobot,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Arlobot => "arlobot",
            BackendKind::Virtual => "virtual",
            BackendKind::Telerobot => "telerobot",
        }
    }
}

/// Either a UTM point or a geographic one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OriginConfig {
    Utm(UtmPoint),
    Geographic(GeoPoint),
}

impl OriginConfig {
    pub fn utm(&self) -> UtmPoint {
        match self {
            OriginConfig::Utm(utm) => *utm,
            OriginConfig::Geographic(point) => geo_to_utm(point),
        }
    }

    pub fn frame(&self) -> LocalFrame {
        LocalFrame::new(self.utm())
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            ros_bridge_uri: default_bridge_uri(),
            ros_bridge_port: default_bridge_port(),
            waypoint_distance_threshold: default_threshold(),
            max_linear_speed: default_max_linear_speed(),
            max_angular_speed: default_max_angular_speed(),
            control_parameter_rho: default_rho(),
            control_parameter_roll: default_roll(),
            control_parameter_pitch: default_pitch(),
            control_parameter_yaw: 0.0,
        }
    }
}

impl RobotConfig {
    pub fn control_parameters(&self) -> ControlParameters {
        ControlParameters {
            rho: self.control_parameter_rho,
            roll: self.control_parameter_roll,
            pitch: self.control_parameter_pitch,
            yaw: self.control_parameter_yaw,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            namespace: String::new(),
            waypoint_start_index: 0,
            tick_interval_ms: default_tick_interval(),
            odometry_interval_ms: default_odometry_interval(),
        }
    }
}

fn default_bridge_uri() -> String {
    "ws://localhost".to_string()
}

fn default_bridge_port() -> u16 {
    9090
}

fn default_threshold() -> f64 {
    crate::locomotion::DEFAULT_WAYPOINT_THRESHOLD
}

fn default_max_linear_speed() -> f32 {
    0.5
}

fn default_max_angular_speed() -> f32 {
    0.8
}

fn default_rho() -> f32 {
    0.3
}

fn default_roll() -> f32 {
    0.8
}

fn default_pitch() -> f32 {
    -0.15
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_backend() -> BackendKind {
    BackendKind::Arlobot
}

fn default_tick_interval() -> u64 {
    20
}

fn default_odometry_interval() -> u64 {
    50
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!(
            robot = %config.robot_name,
            backend = config.session.backend.as_str(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Reject values that parse but cannot drive a robot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.robot.waypoint_distance_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "robot.waypoint_distance_threshold",
                reason: format!("{} is not a positive distance", threshold),
            });
        }
        Ok(())
    }

    /// Defaults for `backend`, with the origin at 0°N 0°E.
    pub fn default_for_backend(robot_name: String, backend: BackendKind) -> Self {
        Self {
            robot_name,
            robot: RobotConfig::default(),
            channel: ChannelConfig::default(),
            session: SessionConfig {
                backend,
                ..SessionConfig::default()
            },
            origin: OriginConfig::Geographic(GeoPoint::new(0.0, 0.0, 0.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL: &str = r#"
robot_name = "arlobot"

[robot]
ros_bridge_uri = "ws://10.0.0.2"
ros_bridge_port = 9091
waypoint_distance_threshold = 0.25
max_linear_speed = 0.4
max_angular_speed = 0.7
control_parameter_rho = 0.3
control_parameter_roll = 0.8
control_parameter_pitch = -0.15
control_parameter_yaw = 0.05

[channel]
client_id = "telerobot-arlobot"
connect_timeout_secs = 3

[session]
backend = "virtual"
namespace = "/robot1"
waypoint_start_index = 1
tick_interval_ms = 10
odometry_interval_ms = 40

[origin]
latitude = 55.605
longitude = 12.59
"#;

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write(FULL);
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.robot_name, "arlobot");
        assert_eq!(config.robot.ros_bridge_port, 9091);
        assert_eq!(config.robot.waypoint_distance_threshold, 0.25);
        assert_eq!(config.robot.control_parameters().yaw, 0.05);
        assert_eq!(config.channel.client_id.as_deref(), Some("telerobot-arlobot"));
        assert_eq!(config.session.backend, BackendKind::Virtual);
        assert_eq!(config.session.namespace, "/robot1");
        assert!(matches!(config.origin, OriginConfig::Geographic(p) if p.latitude == 55.605));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write(
            r#"
robot_name = "bot"
[origin]
easting = 500000.0
northing = 6162000.0
zone = 33
hemisphere = "north"
"#,
        );
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.robot, RobotConfig::default());
        assert_eq!(config.robot.waypoint_distance_threshold, 0.1);
        assert_eq!(config.channel.connect_timeout_secs, 5);
        assert_eq!(config.session.backend, BackendKind::Arlobot);
        assert_eq!(config.session.tick_interval_ms, 20);
        match config.origin {
            OriginConfig::Utm(utm) => assert_eq!(utm.zone, 33),
            other => panic!("expected utm origin, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_origin_is_parse_error() {
        let file = write("robot_name = \"bot\"\n");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            Config::from_file("/nonexistent/telerobot.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let file = write(
            r#"
robot_name = "bot"
[session]
backend = "hovercraft"
[origin]
latitude = 0.0
longitude = 0.0
"#,
        );
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_default_for_backend() {
        let config = Config::default_for_backend("sim".to_string(), BackendKind::Telerobot);
        assert_eq!(config.session.backend, BackendKind::Telerobot);
        assert_eq!(config.robot.ros_bridge_uri, "ws://localhost");
        let origin = crate::geo::utm_to_geo(&config.origin.utm());
        assert!(origin.latitude.abs() < 1e-6);
        assert!(origin.longitude.abs() < 1e-6);
    }

    #[test]
    fn test_unusable_waypoint_threshold_is_rejected() {
        for value in ["0.0", "-0.5", "nan", "inf"] {
            let file = write(&format!(
                "robot_name = \"bot\"\n[robot]\nwaypoint_distance_threshold = {}\n[origin]\nlatitude = 0.0\nlongitude = 0.0\n",
                value
            ));
            match Config::from_file(file.path()) {
                Err(ConfigError::Invalid { field, .. }) => {
                    assert_eq!(field, "robot.waypoint_distance_threshold")
                }
                other => panic!("threshold {} accepted: {:?}", value, other.map(|c| c.robot)),
            }
        }
        assert!(Config::default_for_backend("bot".to_string(), BackendKind::Virtual)
            .validate()
            .is_ok());
    }
}
