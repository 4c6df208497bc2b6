use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::MissionError;

pub mod plan;
pub mod types;

pub use plan::CommandPlan;
pub use types::{VisionConfirmation, Waypoint, WaypointAction};

/// An ordered, validated list of waypoints.
///
/// Only constructible through [`Mission::new`] (or deserialisation, which
/// runs the same checks), so an executor never sees an invalid mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MissionDocument")]
pub struct Mission {
    name: String,
    waypoints: Vec<Waypoint>,
}

#[derive(Deserialize)]
struct MissionDocument {
    name: String,
    waypoints: Vec<Waypoint>,
}

impl TryFrom<MissionDocument> for Mission {
    type Error = MissionError;

    fn try_from(doc: MissionDocument) -> Result<Self, Self::Error> {
        Mission::new(doc.name, doc.waypoints)
    }
}

impl Mission {
    pub fn new(name: impl Into<String>, waypoints: Vec<Waypoint>) -> Result<Self, MissionError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(MissionError::EmptyName);
        }
        if waypoints.is_empty() {
            return Err(MissionError::NoWaypoints(name));
        }
        for (index, waypoint) in waypoints.iter().enumerate() {
            validate_waypoint(index, waypoint)?;
        }
        Ok(Self { name, waypoints })
    }

    /// Shorthand for missions made only of bare actions.
    pub fn from_actions(
        name: impl Into<String>,
        actions: impl IntoIterator<Item = WaypointAction>,
    ) -> Result<Self, MissionError> {
        Self::new(name, actions.into_iter().map(Waypoint::new).collect())
    }

    pub fn from_json(document: &str) -> Result<Self, MissionError> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read mission file {}", path.display()))?;
        Mission::from_json(&contents)
            .with_context(|| format!("invalid mission file {}", path.display()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

fn validate_waypoint(index: usize, waypoint: &Waypoint) -> Result<(), MissionError> {
    match waypoint.action {
        WaypointAction::MoveTo { speed, .. } if speed <= 0 => {
            return Err(MissionError::NonPositiveSpeed { index, speed });
        }
        WaypointAction::Hover { duration_seconds }
            if !duration_seconds.is_finite() || duration_seconds < 0.0 =>
        {
            return Err(MissionError::InvalidHoverDuration {
                index,
                duration: duration_seconds,
            });
        }
        _ => {}
    }
    if let Some(confirm) = &waypoint.confirm {
        if !(0.0..=1.0).contains(&confirm.min_confidence) {
            return Err(MissionError::InvalidConfidence {
                index,
                confidence: confirm.min_confidence,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_speed() {
        for speed in [0, -10] {
            let err = Mission::from_actions(
                "bad",
                vec![
                    WaypointAction::Takeoff,
                    WaypointAction::MoveTo {
                        x: 100,
                        y: 0,
                        z: 0,
                        speed,
                    },
                ],
            )
            .unwrap_err();
            assert_eq!(err, MissionError::NonPositiveSpeed { index: 1, speed });
        }
    }

    #[test]
    fn rejects_negative_or_nan_hover() {
        let err = Mission::from_actions(
            "bad",
            vec![WaypointAction::Hover {
                duration_seconds: -1.0,
            }],
        )
        .unwrap_err();
        assert!(matches!(err, MissionError::InvalidHoverDuration { index: 0, .. }));

        assert!(Mission::from_actions(
            "bad",
            vec![WaypointAction::Hover {
                duration_seconds: f64::NAN,
            }],
        )
        .is_err());

        assert!(Mission::from_actions(
            "zero",
            vec![WaypointAction::Hover {
                duration_seconds: 0.0,
            }],
        )
        .is_ok());
    }

    #[test]
    fn requires_name_and_waypoints() {
        assert_eq!(
            Mission::from_actions("  ", vec![WaypointAction::Land]),
            Err(MissionError::EmptyName)
        );
        assert_eq!(
            Mission::new("empty", vec![]),
            Err(MissionError::NoWaypoints("empty".into()))
        );
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let err = Mission::new(
            "look",
            vec![Waypoint::new(WaypointAction::CapturePhoto).confirmed_by("person", 1.5)],
        )
        .unwrap_err();
        assert!(matches!(err, MissionError::InvalidConfidence { index: 0, .. }));
    }

    #[test]
    fn loads_json_document() {
        let mission = Mission::from_json(
            r#"{
                "name": "Survey",
                "waypoints": [
                    {"action": {"type": "takeoff"}},
                    {"action": {"type": "hover", "durationSeconds": 2}},
                    {"action": {"type": "moveTo", "x": 100, "y": 0, "z": 50, "speed": 50}},
                    {"action": {"type": "capturePhoto"}, "confirm": {"label": "roof", "minConfidence": 0.8}},
                    {"action": {"type": "rotate", "degrees": -90}},
                    {"action": {"type": "land"}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(mission.name(), "Survey");
        assert_eq!(mission.len(), 6);
        assert_eq!(
            mission.waypoints()[2].action,
            WaypointAction::MoveTo {
                x: 100,
                y: 0,
                z: 50,
                speed: 50
            }
        );
        assert_eq!(
            mission.waypoints()[3].confirm.as_ref().map(|c| c.label.as_str()),
            Some("roof")
        );
    }

    #[test]
    fn json_goes_through_validation() {
        let err = Mission::from_json(
            r#"{"name": "x", "waypoints": [{"action": {"type": "moveTo", "x": 1, "y": 1, "z": 1, "speed": 0}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MissionError::Malformed(msg) if msg.contains("speed")));
    }

    #[test]
    fn loads_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"{"name": "short hop", "waypoints": [{"action": {"type": "takeoff"}}, {"action": {"type": "land"}}]}"#,
        )
        .unwrap();
        let mission = Mission::load(file.path()).unwrap();
        assert_eq!(mission.len(), 2);

        assert!(Mission::load("/definitely/not/here.json").is_err());
    }

    #[test]
    fn demo_survey_is_valid() {
        let mission = Mission::from_json(include_str!("../../demos/survey.json")).unwrap();
        assert_eq!(mission.name(), "Survey Mission");
        assert_eq!(mission.len(), 10);
        assert_eq!(mission.waypoints()[9].action, WaypointAction::Land);
    }
}
