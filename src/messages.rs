// Serializable snapshots reported by the runtime

use serde::{Deserialize, Serialize};

/// Drive base odometry at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveBaseState {
    /// Traveled distance (mm)
    pub distance: f32,
    /// Forward speed (mm/s)
    pub drive_speed: f32,
    /// Heading (deg, clockwise positive)
    pub angle: f32,
    /// Turn rate (deg/s)
    pub turn_rate: f32,
}

/// One saved log file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedLog {
    pub file: String,
    pub rows: usize,
}

/// Result of a complete run of the four-move sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub version: String,
    /// Control time spent, in ms
    pub elapsed_ms: u64,
    pub final_state: DriveBaseState,
    pub logs: Vec<SavedLog>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_json_shape() {
        let summary = RunSummary {
            version: "0.1.0".to_string(),
            elapsed_ms: 100,
            final_state: DriveBaseState::default(),
            logs: vec![SavedLog {
                file: "servo_left.txt".to_string(),
                rows: 3,
            }],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["logs"][0]["rows"], 3);
        assert_eq!(json["final_state"]["turn_rate"], 0.0);
    }
}
