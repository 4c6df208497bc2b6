use std::fmt;

use serde::Serialize;

/// Why a mission was cut short.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source")]
#[serde(rename_all = "camelCase")]
pub enum AbortReason {
    EmergencyStop,
    SafetyViolation {
        rule: String,
        value: f64,
        threshold: f64,
    },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::EmergencyStop => f.write_str("emergency stop requested"),
            AbortReason::SafetyViolation {
                rule,
                value,
                threshold,
            } => write!(
                f,
                "safety rule '{}' violated ({} against limit {})",
                rule, value, threshold
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionState {
    Idle,
    Running { mission: String, waypoint: usize },
    Aborting { reason: AbortReason },
    Completed,
    Failed { reason: String },
}

impl Default for ExecutionState {
    fn default() -> Self {
        ExecutionState::Idle
    }
}

impl ExecutionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ExecutionState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ExecutionState::Running { .. })
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Idle => f.write_str("idle"),
            ExecutionState::Running { mission, waypoint } => {
                write!(f, "running '{}' at waypoint {}", mission, waypoint)
            }
            ExecutionState::Aborting { reason } => write!(f, "aborting: {}", reason),
            ExecutionState::Completed => f.write_str("completed"),
            ExecutionState::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}
