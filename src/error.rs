use std::time::Duration;

use thiserror::Error;

use crate::executor::states::AbortReason;

/// Failures of a single exchange with the vehicle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("no vehicle connected")]
    NotConnected,
    #[error("link was torn down while a request was in flight")]
    Disconnected,
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("vehicle unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },
    #[error("invalid response from vehicle: {0}")]
    InvalidResponse(String),
    #[error("vehicle rejected command: {0}")]
    Rejected(String),
}

/// Outcome of an `execute_mission` call that did not complete.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("a mission is already executing")]
    AlreadyRunning,
    #[error("waypoint {waypoint} failed: {source}")]
    CommandFailed {
        waypoint: usize,
        #[source]
        source: LinkError,
    },
    #[error("mission aborted: {0}")]
    Aborted(AbortReason),
    #[error("waypoint {waypoint} could not confirm '{label}' visually")]
    VisionNotConfirmed { waypoint: usize, label: String },
}

impl ExecutionError {
    /// The link failure behind a `CommandFailed`, if any.
    pub fn link_error(&self) -> Option<&LinkError> {
        match self {
            ExecutionError::CommandFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Rejections raised while building a mission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MissionError {
    #[error("mission name must not be empty")]
    EmptyName,
    #[error("mission '{0}' has no waypoints")]
    NoWaypoints(String),
    #[error("waypoint {index}: move speed must be positive, got {speed}")]
    NonPositiveSpeed { index: usize, speed: i32 },
    #[error("waypoint {index}: hover duration must be a non-negative number, got {duration}")]
    InvalidHoverDuration { index: usize, duration: f64 },
    #[error("waypoint {index}: confidence {confidence} is outside [0, 1]")]
    InvalidConfidence { index: usize, confidence: f64 },
    #[error("malformed mission document: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for MissionError {
    fn from(err: serde_json::Error) -> Self {
        MissionError::Malformed(err.to_string())
    }
}

/// Structural problems in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("safety rule #{0} has an empty name")]
    UnnamedRule(usize),
    #[error("link host must not be empty")]
    EmptyHost,
}
