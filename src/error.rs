use thiserror::Error;

/// Failure to establish a bridge connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid bridge url: {0}")]
    InvalidUrl(String),
    #[error("connection to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("bridge refused connection: {0}")]
    Refused(String),
}

/// Errors raised by the messaging channel while connected or not.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("publish on disconnected channel (topic {topic})")]
    NotConnected { topic: String },
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A waypoint list that cannot be followed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidPathError {
    #[error("waypoint list is empty")]
    Empty,
    #[error("start index {start} out of range for {len} waypoints")]
    StartIndexOutOfRange { start: usize, len: usize },
    #[error("waypoint {index} is not a valid WGS84 point")]
    InvalidPoint { index: usize },
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    InvalidPath(#[from] InvalidPathError),
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("session already destroyed")]
    Destroyed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<ControlError> for CommandError {
    fn from(e: ControlError) -> Self {
        CommandError::Session(SessionError::Control(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_path_is_wrapped_transparently() {
        let err: ControlError = InvalidPathError::Empty.into();
        assert_eq!(err.to_string(), "waypoint list is empty");
    }

    #[test]
    fn test_not_connected_names_topic() {
        let err = ChannelError::NotConnected {
            topic: "/cmd_vel".to_string(),
        };
        assert!(err.to_string().contains("/cmd_vel"));
    }
}
