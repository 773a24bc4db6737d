use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::CommandError;
use crate::geo::GeoPoint;
use crate::locomotion::VelocityCommand;
use crate::session::RobotSession;

/// Operator request, one JSON object per line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorCommand {
    pub command: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub request_id: String,
}

/// Reply to an operator command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReport {
    pub request_id: String,
    pub report_type: String, // "result", "error"
    pub payload: Value,
    pub timestamp: i64,
}

/// Command handler result
pub type CommandResult = Result<Value, CommandError>;

pub fn parse_command(line: &[u8]) -> Result<OperatorCommand, serde_json::Error> {
    serde_json::from_slice(line)
}

/// Run `cmd` against the session and build the report for it
pub fn handle_command(session: &mut RobotSession, cmd: &OperatorCommand) -> CommandReport {
    info!(
        command = %cmd.command,
        request_id = %cmd.request_id,
        "received command"
    );

    let result = match cmd.command.as_str() {
        "move_direct" => handle_move_direct(session, cmd),
        "move_path" => handle_move_path(session, cmd),
        "move_to_point" => handle_move_to_point(session, cmd),
        "pause_path" => session.pause_path().map(|_| ok()).map_err(Into::into),
        "resume_path" => session.resume_path().map(|_| ok()).map_err(Into::into),
        "stop_robot" => session.stop_robot().map(|_| ok()).map_err(Into::into),
        "status" => Ok(session.status()),
        _ => {
            warn!(command = %cmd.command, "unknown command");
            Err(CommandError::Unknown(cmd.command.clone()))
        }
    };

    let (report_type, payload) = match result {
        Ok(response) => {
            session.metrics_mut().record_success();
            ("result", response)
        }
        Err(e) => {
            session.metrics_mut().record_failure();
            warn!(command = %cmd.command, error = %e, "command failed");
            (
                "error",
                serde_json::json!({
                    "error": e.to_string(),
                    "request_id": cmd.request_id
                }),
            )
        }
    };

    CommandReport {
        request_id: cmd.request_id.clone(),
        report_type: report_type.to_string(),
        payload,
        timestamp: chrono::Utc::now().timestamp(),
    }
}

fn ok() -> Value {
    serde_json::json!({"status": "ok"})
}

fn number(payload: &Value, field: &'static str) -> Result<f64, CommandError> {
    let value = payload.get(field).ok_or(CommandError::MissingField(field))?;
    value.as_f64().ok_or_else(|| CommandError::InvalidField {
        field,
        reason: format!("expected a number, got {}", value),
    })
}

fn handle_move_direct(session: &mut RobotSession, cmd: &OperatorCommand) -> CommandResult {
    let linear = number(&cmd.payload, "linear")?;
    let angular = number(&cmd.payload, "angular")?;
    session.move_direct(VelocityCommand::new(linear, angular))?;
    Ok(ok())
}

fn handle_move_path(session: &mut RobotSession, cmd: &OperatorCommand) -> CommandResult {
    let waypoints = cmd
        .payload
        .get("waypoints")
        .ok_or(CommandError::MissingField("waypoints"))?;
    let waypoints: Vec<GeoPoint> =
        serde_json::from_value(waypoints.clone()).map_err(|e| CommandError::InvalidField {
            field: "waypoints",
            reason: e.to_string(),
        })?;
    let count = waypoints.len();
    session.move_path(waypoints)?;
    Ok(serde_json::json!({"status": "ok", "waypoints": count}))
}

fn handle_move_to_point(session: &mut RobotSession, cmd: &OperatorCommand) -> CommandResult {
    let point: GeoPoint =
        serde_json::from_value(cmd.payload.clone()).map_err(|e| CommandError::InvalidField {
            field: "point",
            reason: e.to_string(),
        })?;
    session.move_to_point(point)?;
    Ok(ok())
}
