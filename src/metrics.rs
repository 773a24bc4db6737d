use serde::{Deserialize, Serialize};

/// Session counters, reported by the `status` command
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionMetrics {
    pub ticks: u64,
    pub inbound_applied: u64,
    pub inbound_malformed: u64,
    pub inbound_overwritten: u64,
    pub waypoints_reached: u64,
    pub paths_completed: u64,
    pub lost_connections: u64,
    pub commands_ok: u64,
    pub commands_failed: u64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully handled operator command
    pub fn record_success(&mut self) {
        self.commands_ok += 1;
    }

    /// Record a rejected operator command
    pub fn record_failure(&mut self) {
        self.commands_failed += 1;
    }

    pub fn record_waypoint(&mut self) {
        self.waypoints_reached += 1;
    }

    /// The final waypoint counts as reached too
    pub fn record_path_completed(&mut self) {
        self.waypoints_reached += 1;
        self.paths_completed += 1;
    }

    /// Percentage of operator commands that succeeded
    pub fn success_rate(&self) -> f64 {
        let total = self.commands_ok + self.commands_failed;
        if total == 0 {
            return 100.0;
        }
        (self.commands_ok as f64 / total as f64) * 100.0
    }
}
