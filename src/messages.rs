//! ROS message schemas exchanged over the bridge.
//!
//! Layouts follow the ROS1 `std_msgs`, `geometry_msgs`, `geographic_msgs` and
//! `nav_msgs` packages as rosbridge encodes them in JSON. Missing fields decode
//! to their defaults so partially populated messages from the robot still parse.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, Quaternion};
use crate::locomotion::{VelocityCommand, WaypointState};

/// A message with a fixed ROS type name.
pub trait RosMessage: Serialize + DeserializeOwned + Send + 'static {
    const TYPE: &'static str;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Time {
    pub secs: u32,
    pub nsecs: u32,
}

impl Time {
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            secs: now.timestamp().max(0) as u32,
            nsecs: now.timestamp_subsec_nanos(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Header {
    pub seq: u32,
    pub stamp: Time,
    pub frame_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Float32 {
    pub data: f32,
}

impl RosMessage for Float32 {
    const TYPE: &'static str = "std_msgs/Float32";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StringMsg {
    pub data: String,
}

impl RosMessage for StringMsg {
    const TYPE: &'static str = "std_msgs/String";
}

impl From<WaypointState> for StringMsg {
    fn from(state: WaypointState) -> Self {
        Self {
            data: state.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiArrayDimension {
    pub label: String,
    pub size: u32,
    pub stride: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiArrayLayout {
    pub dim: Vec<MultiArrayDimension>,
    pub data_offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Float32MultiArray {
    pub layout: MultiArrayLayout,
    pub data: Vec<f32>,
}

impl RosMessage for Float32MultiArray {
    const TYPE: &'static str = "std_msgs/Float32MultiArray";
}

/// Waypoint follower gains, published once per session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlParameters {
    pub rho: f32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl From<ControlParameters> for Float32MultiArray {
    fn from(p: ControlParameters) -> Self {
        Self {
            layout: MultiArrayLayout {
                dim: vec![MultiArrayDimension {
                    label: "rho_roll_pitch_yaw".to_string(),
                    size: 4,
                    stride: 4,
                }],
                data_offset: 0,
            },
            data: vec![p.rho, p.roll, p.pitch, p.yaw],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl RosMessage for Twist {
    const TYPE: &'static str = "geometry_msgs/Twist";
}

impl From<VelocityCommand> for Twist {
    fn from(cmd: VelocityCommand) -> Self {
        Self {
            linear: Vector3 {
                x: cmd.linear,
                ..Default::default()
            },
            angular: Vector3 {
                z: cmd.angular,
                ..Default::default()
            },
        }
    }
}

impl From<Twist> for VelocityCommand {
    fn from(twist: Twist) -> Self {
        Self {
            linear: twist.linear.x,
            angular: twist.angular.z,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoPointMsg {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl RosMessage for GeoPointMsg {
    const TYPE: &'static str = "geographic_msgs/GeoPoint";
}

impl From<GeoPoint> for GeoPointMsg {
    fn from(p: GeoPoint) -> Self {
        Self {
            latitude: p.latitude,
            longitude: p.longitude,
            altitude: p.altitude,
        }
    }
}

/// Planar coordinates are required; a report without them is not a position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuaternionMsg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for QuaternionMsg {
    fn default() -> Self {
        Quaternion::IDENTITY.into()
    }
}

impl From<Quaternion> for QuaternionMsg {
    fn from(q: Quaternion) -> Self {
        Self {
            x: q.x,
            y: q.y,
            z: q.z,
            w: q.w,
        }
    }
}

impl From<QuaternionMsg> for Quaternion {
    fn from(q: QuaternionMsg) -> Self {
        Self {
            x: q.x,
            y: q.y,
            z: q.z,
            w: q.w,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    #[serde(default)]
    pub orientation: QuaternionMsg,
}

/// Covariance is row-major 6x6; kept as a `Vec` since serde arrays stop at 32.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    pub pose: Pose,
    #[serde(default)]
    pub covariance: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwistWithCovariance {
    pub twist: Twist,
    pub covariance: Vec<f64>,
}

/// Robot pose report. The position is geographic: `x` longitude, `y` latitude,
/// `z` altitude.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    #[serde(default)]
    pub header: Header,
    #[serde(default)]
    pub child_frame_id: String,
    pub pose: PoseWithCovariance,
    #[serde(default)]
    pub twist: TwistWithCovariance,
}

impl RosMessage for Odometry {
    const TYPE: &'static str = "nav_msgs/Odometry";
}

impl Odometry {
    pub fn from_geo(point: &GeoPoint, orientation: Quaternion) -> Self {
        Self {
            header: Header {
                stamp: Time::now(),
                frame_id: "wgs84".to_string(),
                ..Default::default()
            },
            child_frame_id: "base_link".to_string(),
            pose: PoseWithCovariance {
                pose: Pose {
                    position: Point {
                        x: point.longitude,
                        y: point.latitude,
                        z: point.altitude,
                    },
                    orientation: orientation.into(),
                },
                covariance: vec![0.0; 36],
            },
            twist: TwistWithCovariance::default(),
        }
    }

    pub fn geo_point(&self) -> GeoPoint {
        let p = &self.pose.pose.position;
        GeoPoint::new(p.y, p.x, p.z)
    }

    pub fn orientation(&self) -> Quaternion {
        self.pose.pose.orientation.into()
    }
}
