use std::fmt;

use serde::{Deserialize, Serialize};

use crate::perception::DetectedObject;

/// What a single waypoint asks the vehicle to do.
///
/// Distances are centimetres relative to the current position, speeds
/// centimetres per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub enum WaypointAction {
    Takeoff,
    Land,
    MoveTo {
        x: i32,
        y: i32,
        z: i32,
        speed: i32,
    },
    Hover {
        #[serde(rename = "durationSeconds")]
        duration_seconds: f64,
    },
    Rotate {
        degrees: i32,
    },
    CapturePhoto,
    StartVideo,
    StopVideo,
}

impl fmt::Display for WaypointAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaypointAction::Takeoff => f.write_str("takeoff"),
            WaypointAction::Land => f.write_str("land"),
            WaypointAction::MoveTo { x, y, z, speed } => {
                write!(f, "moveTo({}, {}, {}) at {}cm/s", x, y, z, speed)
            }
            WaypointAction::Hover { duration_seconds } => {
                write!(f, "hover {}s", duration_seconds)
            }
            WaypointAction::Rotate { degrees } => write!(f, "rotate {}°", degrees),
            WaypointAction::CapturePhoto => f.write_str("capturePhoto"),
            WaypointAction::StartVideo => f.write_str("startVideo"),
            WaypointAction::StopVideo => f.write_str("stopVideo"),
        }
    }
}

/// Detection that must be seen after a waypoint before the mission moves on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionConfirmation {
    pub label: String,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_min_confidence() -> f64 {
    0.5
}

impl VisionConfirmation {
    pub fn matches(&self, object: &DetectedObject) -> bool {
        object.label.eq_ignore_ascii_case(&self.label) && object.confidence >= self.min_confidence
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub action: WaypointAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm: Option<VisionConfirmation>,
}

impl Waypoint {
    pub fn new(action: WaypointAction) -> Self {
        Self {
            action,
            confirm: None,
        }
    }

    pub fn confirmed_by(mut self, label: impl Into<String>, min_confidence: f64) -> Self {
        self.confirm = Some(VisionConfirmation {
            label: label.into(),
            min_confidence,
        });
        self
    }
}

impl From<WaypointAction> for Waypoint {
    fn from(action: WaypointAction) -> Self {
        Waypoint::new(action)
    }
}
