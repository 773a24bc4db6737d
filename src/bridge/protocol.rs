use serde::{Deserialize, Serialize};
use serde_json::Value;

/// rosbridge v2 operation, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeOp {
    Advertise {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        topic: String,
        #[serde(rename = "type")]
        msg_type: String,
    },
    Unadvertise {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        topic: String,
    },
    Publish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        topic: String,
        msg: Value,
    },
    Subscribe {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        topic: String,
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        msg_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        queue_length: Option<u32>,
    },
    Unsubscribe {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        topic: String,
    },
    Status {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        level: String,
        #[serde(default)]
        msg: String,
    },
    /// Any op this client does not handle (service calls, fragments, ...).
    #[serde(other)]
    Other,
}

impl BridgeOp {
    pub fn topic(&self) -> Option<&str> {
        match self {
            BridgeOp::Advertise { topic, .. }
            | BridgeOp::Unadvertise { topic, .. }
            | BridgeOp::Publish { topic, .. }
            | BridgeOp::Subscribe { topic, .. }
            | BridgeOp::Unsubscribe { topic, .. } => Some(topic),
            BridgeOp::Status { .. } | BridgeOp::Other => None,
        }
    }
}

pub fn encode(op: &BridgeOp) -> Result<String, serde_json::Error> {
    serde_json::to_string(op)
}

pub fn decode(frame: &str) -> Result<BridgeOp, serde_json::Error> {
    serde_json::from_str(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_wire_format() {
        let op = BridgeOp::Publish {
            id: None,
            topic: "/waypoint/state".to_string(),
            msg: serde_json::json!({"data": "RUNNING"}),
        };
        let frame = encode(&op).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["op"], "publish");
        assert_eq!(value["topic"], "/waypoint/state");
        assert_eq!(value["msg"]["data"], "RUNNING");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_subscribe_uses_type_key() {
        let op = BridgeOp::Subscribe {
            id: Some("subscribe:/robot_gps_pose:c:1".to_string()),
            topic: "/robot_gps_pose".to_string(),
            msg_type: Some("nav_msgs/Odometry".to_string()),
            queue_length: Some(1),
        };
        let value: Value = serde_json::from_str(&encode(&op).unwrap()).unwrap();
        assert_eq!(value["type"], "nav_msgs/Odometry");
        assert_eq!(value["queue_length"], 1);
    }

    #[test]
    fn test_decode_inbound_publish() {
        let frame = r#"{"op":"publish","topic":"/ultrasonic_data","msg":{"data":"12,40,33"}}"#;
        match decode(frame).unwrap() {
            BridgeOp::Publish { topic, msg, .. } => {
                assert_eq!(topic, "/ultrasonic_data");
                assert_eq!(msg["data"], "12,40,33");
            }
            other => panic!("expected publish, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_op() {
        let frame = r#"{"op":"service_response","service":"/x","values":{}}"#;
        assert_eq!(decode(frame).unwrap(), BridgeOp::Other);
    }

    #[test]
    fn test_decode_status() {
        let frame = r#"{"op":"status","level":"error","msg":"unknown topic"}"#;
        assert!(matches!(decode(frame).unwrap(), BridgeOp::Status { level, .. } if level == "error"));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode("not json {[").is_err());
        assert!(decode(r#"{"topic":"/x"}"#).is_err());
    }
}
